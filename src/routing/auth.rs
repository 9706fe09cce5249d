//! Credential selection and header rewriting for the two Azure auth schemes.
//!
//! Managed deployments take an `api-key` header; serverless deployments take
//! `Authorization: Bearer`. The outbound request never carries both.

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::resolver::DeploymentTarget;
use crate::error::{ProxyError, Result};

pub const API_KEY: HeaderName = HeaderName::from_static("api-key");

/// What to do when a managed request has no credential from any source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingCredentialPolicy {
    /// Forward without an auth header and let the backend decide.
    #[default]
    PassThrough,
    /// Fail the request with 401 before it leaves the gateway.
    Reject,
}

/// Where the credential placed on the outbound request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Serverless,
    InboundApiKey,
    InboundBearer,
    StaticToken,
    FallbackKey,
    None,
}

#[derive(Clone, Default)]
pub struct AuthSettings {
    /// Process-wide token (`AZURE_OPENAI_TOKEN`).
    pub static_token: Option<String>,
    /// Key read once at startup from the configured environment variable.
    pub fallback_key: Option<String>,
    pub missing: MissingCredentialPolicy,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("static_token", &self.static_token.as_ref().map(|_| "[REDACTED]"))
            .field("fallback_key", &self.fallback_key.as_ref().map(|_| "[REDACTED]"))
            .field("missing", &self.missing)
            .finish()
    }
}

impl AuthSettings {
    /// Rewrite `headers` into the scheme `target` requires.
    pub fn inject(&self, headers: &mut HeaderMap, target: &DeploymentTarget) -> Result<CredentialSource> {
        match target {
            DeploymentTarget::Serverless { host, key } => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
                headers.remove(API_KEY);
                tracing::debug!(host = %host, "Using serverless deployment authentication");
                Ok(CredentialSource::Serverless)
            }
            DeploymentTarget::Managed { deployment } => {
                let (token, source) = self.managed_credential(headers);

                match token {
                    Some(token) => {
                        headers.insert(API_KEY, header_value(&token)?);
                        headers.remove(AUTHORIZATION);
                        tracing::debug!(deployment = %deployment, ?source, "Using api-key authentication");
                        Ok(source)
                    }
                    None => {
                        headers.remove(API_KEY);
                        headers.remove(AUTHORIZATION);
                        match self.missing {
                            MissingCredentialPolicy::PassThrough => {
                                tracing::warn!(deployment = %deployment, "No authentication token found, forwarding without credentials");
                                Ok(CredentialSource::None)
                            }
                            MissingCredentialPolicy::Reject => {
                                Err(ProxyError::missing_credential(deployment.clone()))
                            }
                        }
                    }
                }
            }
        }
    }

    fn managed_credential(&self, headers: &HeaderMap) -> (Option<String>, CredentialSource) {
        let inbound_key = header_str(headers, &API_KEY).map(|k| k.trim().to_string());
        if let Some(key) = inbound_key.filter(|k| !k.is_empty()) {
            return (Some(key), CredentialSource::InboundApiKey);
        }

        let bearer = header_str(headers, &AUTHORIZATION).map(|v| strip_bearer(v).to_string());
        if let Some(token) = bearer.filter(|t| !t.is_empty()) {
            return (Some(token), CredentialSource::InboundBearer);
        }

        if let Some(token) = self.static_token.as_ref().filter(|t| !t.is_empty()) {
            return (Some(token.clone()), CredentialSource::StaticToken);
        }

        if let Some(key) = self.fallback_key.as_ref().filter(|k| !k.is_empty()) {
            return (Some(key.clone()), CredentialSource::FallbackKey);
        }

        (None, CredentialSource::None)
    }
}

/// Bearer normalization for the plain OpenAI upstream: a bare key gets the
/// `Bearer ` prefix and any Azure `api-key` header is dropped.
pub fn normalize_openai_auth(headers: &mut HeaderMap) -> Result<()> {
    if let Some(auth) = header_str(headers, &AUTHORIZATION).map(str::to_string) {
        if !auth.is_empty() && !auth.starts_with("Bearer ") {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {auth}"))?);
        }
    }
    headers.remove(API_KEY);
    Ok(())
}

/// Header list safe to log: credential values replaced.
pub fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == AUTHORIZATION || name == API_KEY {
                "[REDACTED]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.get(..6) {
        Some(scheme)
            if scheme.eq_ignore_ascii_case("bearer")
                && value[6..].chars().next().map_or(true, char::is_whitespace) =>
        {
            value[6..].trim()
        }
        _ => value,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| ProxyError::invalid_request("credential contains characters not allowed in a header"))?;
    value.set_sensitive(true);
    Ok(value)
}
