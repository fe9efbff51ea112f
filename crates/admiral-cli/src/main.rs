use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "admiral", version, about = "Admiral policy engine CLI")]
struct Cli {
    /// Engine configuration file (YAML). Defaults apply when omitted.
    #[arg(long, global = true, env = "ADMIRAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "admiral_runtime=debug". RUST_LOG wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check policy documents for structural errors.
    Check {
        /// Policy files or directories of policy files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Run an admission request for one resource through a set of policies.
    Apply {
        /// Policy file or directory of policy files.
        #[arg(long, short = 'p')]
        policy: PathBuf,

        /// Resource document (YAML or JSON).
        #[arg(long, short = 'r')]
        resource: PathBuf,

        #[arg(long, value_enum, default_value_t = OperationArg::Create)]
        operation: OperationArg,

        /// Requesting identity (YAML or JSON: roles, clusterRoles, userInfo).
        #[arg(long)]
        user_info: Option<PathBuf>,

        /// Evaluate as a background scan instead of live admission.
        #[arg(long, default_value_t = false)]
        background: bool,

        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// Admit every resource in a directory as a create, then process the
    /// resulting generate requests.
    Generate {
        /// Policy file or directory of policy files.
        #[arg(long, short = 'p')]
        policy: PathBuf,

        /// Resource file or directory. Clone sources must be included.
        #[arg(long, short = 'r')]
        resources: PathBuf,

        /// Keep reconciling until interrupted.
        #[arg(long, default_value_t = false)]
        watch: bool,

        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for admiral_core::Operation {
    fn from(op: OperationArg) -> Self {
        match op {
            OperationArg::Create => Self::Create,
            OperationArg::Update => Self::Update,
            OperationArg::Delete => Self::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay machine readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load::config(cli.config.as_deref())?;
    commands::load::log_config(&config);

    match cli.cmd {
        Command::Check { paths } => commands::check::run(&paths)?,

        Command::Apply {
            policy,
            resource,
            operation,
            user_info,
            background,
            output,
        } => {
            let args = commands::apply::ApplyArgs {
                policy,
                resource,
                operation: operation.into(),
                user_info,
                background,
            };
            commands::apply::run(&config, &args, output).await?
        }

        Command::Generate {
            policy,
            resources,
            watch,
            output,
        } => commands::generate::run(&config, &policy, &resources, watch, output).await?,
    }

    Ok(())
}
