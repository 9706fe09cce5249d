use azure_oai_proxy::config::config_search_paths;
use azure_oai_proxy::{build_router, AppState, GatewayConfig, ProxyConfig, ProxyMode, ProxyPipeline};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "azure-oai-proxy",
    about = "OpenAI-compatible gateway for Azure OpenAI deployments and serverless endpoints",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and environment)
    #[arg(short, long)]
    address: Option<String>,

    /// Proxy mode: azure or openai (overrides config and environment)
    #[arg(long)]
    mode: Option<ProxyMode>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "azure_oai_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env file"),
        Err(_) => info!("No .env file found"),
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok())?;

    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    let gateway = GatewayConfig::build(&config, |name| std::env::var(name).ok())?;

    info!("azure-oai-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode:        {:?}", gateway.mode);
    match gateway.mode {
        ProxyMode::Azure => {
            if let Some(endpoint) = &gateway.endpoint {
                info!("  Endpoint:    {}", endpoint);
            }
            info!("  API version: {}", gateway.versions.default);
            info!("  Responses:   {}", gateway.versions.responses);
            info!("  Models:      {} mapped", gateway.mapping.len());
            info!("  Serverless:  {} deployments", gateway.serverless.len());
            for (model, deployment) in gateway.mapping.iter() {
                tracing::debug!("Model mapping: {} -> {}", model, deployment);
            }
            for (model, info) in &gateway.serverless {
                tracing::debug!(model = %model, deployment = ?info, "Serverless deployment");
            }
        }
        ProxyMode::OpenAi => info!("  Endpoint:    {}", gateway.openai_endpoint),
    }

    let pipeline = ProxyPipeline::new(Arc::new(gateway))?;
    let state = Arc::new(AppState { pipeline });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.address).await?;

    info!("Listening on http://{}", config.address);

    axum::serve(listener, app).await?;

    Ok(())
}
