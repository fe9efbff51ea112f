//! Resource filters: resources the webhook never evaluates.
//!
//! Written as a list of `[Kind,Namespace,Name]` triples, each element
//! accepting `*`/`?` wildcards, e.g. `[Event,*,*],[*,kube-system,*]`.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::request::ResourceSpec;
use crate::wildcard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceFilter {
    /// Parse a comma separated list of bracketed triples. An empty string
    /// yields no filters.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, ConfigError> {
        let mut filters = Vec::new();
        let mut rest = input.trim();

        while !rest.is_empty() {
            let Some(open) = rest.strip_prefix('[') else {
                return Err(ConfigError::Config(format!(
                    "resource filter must start with '[': {}",
                    rest
                )));
            };
            let Some(close) = open.find(']') else {
                return Err(ConfigError::Config(format!(
                    "unterminated resource filter: [{}",
                    open
                )));
            };

            filters.push(Self::parse_triple(&open[..close])?);

            rest = open[close + 1..].trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next.trim_start();
            }
        }

        Ok(filters)
    }

    fn parse_triple(body: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let [kind, namespace, name] = parts.as_slice() else {
            return Err(ConfigError::Config(format!(
                "resource filter needs [kind,namespace,name], got [{}]",
                body
            )));
        };
        Ok(Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn matches(&self, resource: &ResourceSpec) -> bool {
        wildcard::matches(&self.kind, &resource.kind)
            && wildcard::matches(&self.namespace, &resource.namespace)
            && wildcard::matches(&self.name, &resource.name)
    }
}
