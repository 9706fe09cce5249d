//! Model discovery for `GET /v1/models`.
//!
//! Lists the models deployed on the managed backend and appends one entry
//! per configured serverless deployment.

use crate::config::GatewayConfig;
use crate::error::{ProxyError, Result};
use crate::routing::auth::API_KEY;
use crate::routing::rewrite::DEPLOYMENT_ROOT;
use crate::routing::DeploymentTarget;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// A model as the backend's `/openai/models` endpoint describes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub lifecycle_status: String,
    #[serde(default)]
    pub status: String,
    /// Fields the gateway does not interpret (deprecation dates, fine-tune info).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub fine_tune: bool,
    #[serde(default)]
    pub inference: bool,
    #[serde(default)]
    pub completion: bool,
    #[serde(default)]
    pub chat_completion: bool,
    #[serde(default)]
    pub embeddings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub data: Vec<Model>,
}

/// Fetch the models deployed on the managed backend.
///
/// Credentials are taken from the caller's headers the same way a managed
/// request would be authenticated.
///
/// # Errors
/// Returns `ProxyError::Upstream` if the request fails or the backend answers non-2xx.
pub async fn fetch_deployed_models(
    config: &GatewayConfig,
    client: &reqwest::Client,
    inbound: &HeaderMap,
) -> Result<Vec<Model>> {
    let mut url = config.azure_endpoint()?.clone();
    url.set_path(&format!("/{DEPLOYMENT_ROOT}/models"));
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", &config.versions.models);

    let mut headers = HeaderMap::new();
    for name in [AUTHORIZATION, API_KEY] {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    config.auth.inject(
        &mut headers,
        &DeploymentTarget::Managed {
            deployment: "models".to_string(),
        },
    )?;

    tracing::debug!(url = %url, "Fetching deployed models");

    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to fetch deployed models: {e}")))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::upstream(format!(
            "Backend returned status {status} when fetching models: {body}"
        )));
    }

    let parsed: ModelList = response
        .json()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to parse models response: {e}")))?;

    Ok(parsed.data)
}

/// One entry per serverless deployment, sorted by model name.
#[must_use]
pub fn serverless_models(config: &GatewayConfig) -> Vec<Model> {
    let mut names: Vec<&String> = config.serverless.keys().collect();
    names.sort();

    names
        .into_iter()
        .map(|name| Model {
            id: name.clone(),
            object: "model".to_string(),
            capabilities: Capabilities {
                inference: true,
                completion: true,
                chat_completion: true,
                ..Capabilities::default()
            },
            lifecycle_status: "active".to_string(),
            status: "ready".to_string(),
            ..Model::default()
        })
        .collect()
}

/// Deployed models followed by the serverless ones.
pub async fn list_models(
    config: &GatewayConfig,
    client: &reqwest::Client,
    inbound: &HeaderMap,
) -> Result<ModelList> {
    let mut data = fetch_deployed_models(config, client, inbound).await?;
    data.extend(serverless_models(config));
    Ok(ModelList {
        object: "list".to_string(),
        data,
    })
}
