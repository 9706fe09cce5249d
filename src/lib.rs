pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod translate;

pub use config::{GatewayConfig, ProxyConfig, ProxyMode};
pub use error::{ProxyError, Result};
pub use proxy::{InboundRequest, ProxyPipeline};
pub use server::{build_router, AppState};
