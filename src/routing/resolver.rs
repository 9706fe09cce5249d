//! Per-request choice between a serverless endpoint and a managed deployment.

use std::collections::HashMap;
use std::fmt;

use super::mapping::ModelMapping;

/// A model served from its own host with its own bearer key.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerlessDeployment {
    pub name: String,
    pub region: String,
    pub key: String,
}

impl ServerlessDeployment {
    pub fn host(&self, domain: &str) -> String {
        format!("{}.{}.{}", self.name, self.region, domain)
    }
}

impl fmt::Debug for ServerlessDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerlessDeployment")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("key", &if self.key.is_empty() { "" } else { "[REDACTED]" })
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum DeploymentTarget {
    Serverless { host: String, key: String },
    Managed { deployment: String },
}

impl DeploymentTarget {
    /// Name used in logs and diagnostics.
    pub fn label(&self) -> &str {
        match self {
            Self::Serverless { host, .. } => host,
            Self::Managed { deployment } => deployment,
        }
    }

    pub fn is_serverless(&self) -> bool {
        matches!(self, Self::Serverless { .. })
    }
}

impl fmt::Debug for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serverless { host, .. } => f
                .debug_struct("Serverless")
                .field("host", host)
                .finish_non_exhaustive(),
            Self::Managed { deployment } => f
                .debug_struct("Managed")
                .field("deployment", deployment)
                .finish(),
        }
    }
}

/// Borrowed view over the immutable configuration tables.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentResolver<'a> {
    pub mapping: &'a ModelMapping,
    pub serverless: &'a HashMap<String, ServerlessDeployment>,
    pub serverless_domain: &'a str,
}

impl DeploymentResolver<'_> {
    /// Serverless entries always win over the managed mapping table.
    pub fn resolve(&self, model: &str) -> DeploymentTarget {
        if let Some(info) = self.serverless.get(&model.to_lowercase()) {
            return DeploymentTarget::Serverless {
                host: info.host(self.serverless_domain),
                key: info.key.clone(),
            };
        }

        DeploymentTarget::Managed {
            deployment: self.mapping.resolve(model),
        }
    }
}
