//! `admiral check` command implementation.

use admiral_core::Policy;
use anyhow::Result;
use std::path::{Path, PathBuf};

use super::load;

/// Outcome for one policy file.
#[derive(Debug)]
pub struct CheckFinding {
    pub file: PathBuf,
    pub policy: Option<String>,
    pub error: Option<String>,
}

impl CheckFinding {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Load and check every policy under `paths` without stopping at the
/// first failure.
pub fn check_paths(paths: &[PathBuf]) -> Result<Vec<CheckFinding>> {
    let mut findings = Vec::new();
    for path in paths {
        for file in load::document_paths(path)? {
            findings.push(check_file(&file));
        }
    }
    Ok(findings)
}

fn check_file(file: &Path) -> CheckFinding {
    let policy = match Policy::from_file(file) {
        Ok(policy) => policy,
        Err(e) => {
            return CheckFinding {
                file: file.to_path_buf(),
                policy: None,
                error: Some(e.to_string()),
            };
        }
    };
    CheckFinding {
        file: file.to_path_buf(),
        policy: Some(policy.name().to_string()),
        error: admiral_policy::check_policy(&policy).err().map(|e| e.to_string()),
    }
}

pub fn run(paths: &[PathBuf]) -> Result<()> {
    let findings = check_paths(paths)?;
    let failed = findings.iter().filter(|f| !f.is_ok()).count();

    for finding in &findings {
        let name = finding.policy.as_deref().unwrap_or("-");
        match &finding.error {
            None => println!("✔ {} ({})", name, finding.file.display()),
            Some(err) => println!("✘ {} ({}): {}", name, finding.file.display(), err),
        }
    }
    println!();
    println!("{} checked, {} failed", findings.len(), failed);

    if failed > 0 {
        anyhow::bail!("{} policy file(s) failed checks", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const VALID: &str = r#"
metadata: {name: require-labels}
spec:
  rules:
    - name: has-app
      match: {resources: {kinds: [Pod]}}
      validate:
        pattern: {metadata: {labels: {app: "?*"}}}
"#;

    const NO_ACTION: &str = r#"
metadata: {name: empty-rule}
spec:
  rules:
    - name: nothing
      match: {resources: {kinds: [Pod]}}
"#;

    #[test]
    fn test_check_reports_each_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a-valid.yaml"), VALID).unwrap();
        fs::write(dir.path().join("b-empty.yaml"), NO_ACTION).unwrap();
        fs::write(dir.path().join("c-broken.yaml"), "spec: [").unwrap();

        let findings = check_paths(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(findings.len(), 3);
        assert!(findings[0].is_ok());
        assert_eq!(findings[1].policy.as_deref(), Some("empty-rule"));
        assert!(findings[1].error.as_deref().unwrap().contains("nothing"));
        assert!(findings[2].policy.is_none());
        assert!(!findings[2].is_ok());

        assert!(run(&[dir.path().to_path_buf()]).is_err());
    }

    #[test]
    fn test_check_passes_valid_policy() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("policy.yaml");
        fs::write(&file, VALID).unwrap();
        assert!(run(&[file]).is_ok());
    }
}
