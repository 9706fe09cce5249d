//! Request-side routing: which deployment, which credential, which URL.
//!
//! Everything here is pure and synchronous; the proxy pipeline calls these in
//! order before a request leaves the gateway.

pub mod auth;
pub mod mapping;
pub mod operation;
pub mod resolver;
pub mod rewrite;

pub use auth::{AuthSettings, CredentialSource, MissingCredentialPolicy};
pub use mapping::{MergeMode, ModelMapping};
pub use operation::OperationKind;
pub use resolver::{DeploymentResolver, DeploymentTarget, ServerlessDeployment};
pub use rewrite::{ApiVersions, Route};
