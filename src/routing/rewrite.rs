//! Outbound URL construction for serverless and managed targets.

use reqwest::Url;

use super::operation::{deployment_from_path, BackendScope, OperationKind};
use super::resolver::DeploymentTarget;
use crate::error::{ProxyError, Result};

/// Path segment every managed backend path starts with.
pub const DEPLOYMENT_ROOT: &str = "openai";

/// Backend API versions, chosen per operation family.
#[derive(Debug, Clone)]
pub struct ApiVersions {
    pub default: String,
    pub responses: String,
    pub models: String,
}

impl ApiVersions {
    pub fn for_operation(&self, operation: OperationKind) -> &str {
        match operation {
            OperationKind::Responses => &self.responses,
            OperationKind::Models => &self.models,
            _ => &self.default,
        }
    }
}

/// The inbound request as far as URL rewriting is concerned.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    pub operation: OperationKind,
    pub path: &'a str,
    pub query: Option<&'a str>,
}

/// Build the upstream URL for `route` against `target`.
pub fn rewrite(
    endpoint: &Url,
    target: &DeploymentTarget,
    route: Route<'_>,
    versions: &ApiVersions,
) -> Result<Url> {
    match target {
        DeploymentTarget::Serverless { host, .. } => {
            let raw = match route.query {
                Some(q) if !q.is_empty() => format!("https://{host}{}?{q}", route.path),
                _ => format!("https://{host}{}", route.path),
            };
            Url::parse(&raw).map_err(|e| {
                ProxyError::invalid_request(format!("Cannot build serverless URL {raw}: {e}"))
            })
        }
        DeploymentTarget::Managed { deployment } => {
            let mut url = endpoint.clone();
            url.set_path(&managed_path(deployment, route)?);
            url.set_query(None);

            {
                let mut query = url.query_pairs_mut();
                if let Some(q) = route.query {
                    for (key, value) in form_pairs(q) {
                        if key != "api-version" {
                            query.append_pair(&key, &value);
                        }
                    }
                }
                query.append_pair("api-version", versions.for_operation(route.operation));
            }

            Ok(url)
        }
    }
}

fn managed_path(deployment: &str, route: Route<'_>) -> Result<String> {
    match route.operation.backend_scope() {
        Some(BackendScope::Root(root)) => Ok(format!(
            "/{DEPLOYMENT_ROOT}/{root}{}",
            route.operation.remainder(route.path)
        )),
        Some(BackendScope::Deployment(suffix)) => {
            Ok(format!("/{DEPLOYMENT_ROOT}/deployments/{}/{suffix}", segment(deployment)?))
        }
        None => {
            let rest = match deployment_from_path(route.path) {
                Some(name) => route
                    .path
                    .split_once(&format!("/deployments/{name}/"))
                    .map_or("", |(_, rest)| rest),
                None => route
                    .path
                    .strip_prefix("/v1/")
                    .unwrap_or(route.path)
                    .trim_start_matches('/'),
            };
            Ok(format!("/{DEPLOYMENT_ROOT}/deployments/{}/{rest}", segment(deployment)?))
        }
    }
}

fn segment(deployment: &str) -> Result<&str> {
    if deployment.is_empty() {
        return Err(ProxyError::invalid_request(
            "No model given in the request path or body",
        ));
    }
    Ok(deployment)
}

fn form_pairs(query: &str) -> Vec<(String, String)> {
    Url::parse(&format!("http://q.invalid/?{query}"))
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://myres.openai.azure.com").unwrap()
    }

    fn versions() -> ApiVersions {
        ApiVersions {
            default: "2024-06-01".to_string(),
            responses: "preview".to_string(),
            models: "2024-10-21".to_string(),
        }
    }

    fn managed(d: &str) -> DeploymentTarget {
        DeploymentTarget::Managed {
            deployment: d.to_string(),
        }
    }

    fn route<'a>(path: &'a str, query: Option<&'static str>) -> Route<'a> {
        Route {
            operation: OperationKind::from_path(path),
            path,
            query,
        }
    }

    #[test]
    fn test_managed_chat() {
        let url = rewrite(
            &endpoint(),
            &managed("gpt4o-prod"),
            route("/v1/chat/completions", None),
            &versions(),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://myres.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_operation_table() {
        let cases = [
            ("/v1/completions", "/openai/deployments/d/completions"),
            ("/v1/embeddings", "/openai/deployments/d/embeddings"),
            ("/v1/images/generations", "/openai/deployments/d/images/generations"),
            ("/v1/audio/speech", "/openai/deployments/d/audio/speech"),
            ("/v1/audio/transcriptions", "/openai/deployments/d/audio/transcriptions"),
            ("/v1/audio/translations", "/openai/deployments/d/audio/translations"),
            ("/v1/audio/voices", "/openai/audio/voices"),
            ("/v1/fine_tunes/ft-1/events", "/openai/fine-tunes/ft-1/events"),
            ("/deployments/abc", "/openai/deployments/abc"),
            ("/v1/models/gpt-4o/capabilities", "/openai/models/gpt-4o/capabilities"),
            (
                "/openai/deployments/my-dep/extensions/chat/completions",
                "/openai/deployments/d/extensions/chat/completions",
            ),
        ];
        for (inbound, expected) in cases {
            let url = rewrite(&endpoint(), &managed("d"), route(inbound, None), &versions()).unwrap();
            assert_eq!(url.path(), expected, "for {inbound}");
        }
    }

    #[test]
    fn test_files_have_no_deployment_segment() {
        let url = rewrite(
            &endpoint(),
            &managed("gpt4o-prod"),
            route("/v1/files/file-1/content", None),
            &versions(),
        )
        .unwrap();
        assert_eq!(url.path(), "/openai/files/file-1/content");
        assert!(!url.path().contains("gpt4o-prod"));
    }

    #[test]
    fn test_responses_family_uses_own_version() {
        let url = rewrite(
            &endpoint(),
            &managed("o3-pro"),
            route("/v1/responses/resp_1/cancel", None),
            &versions(),
        )
        .unwrap();
        assert_eq!(url.path(), "/openai/v1/responses/resp_1/cancel");
        assert_eq!(url.query(), Some("api-version=preview"));
    }

    #[test]
    fn test_caller_query_kept_and_version_replaced() {
        let url = rewrite(
            &endpoint(),
            &managed("d"),
            route("/v1/files", Some("purpose=fine-tune&api-version=1999-01-01")),
            &versions(),
        )
        .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("purpose".to_string(), "fine-tune".to_string()),
                ("api-version".to_string(), "2024-06-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_serverless_keeps_path_and_query() {
        let target = DeploymentTarget::Serverless {
            host: "mistral-xyz.westus.models.ai.azure.com".to_string(),
            key: "k".to_string(),
        };
        let url = rewrite(
            &endpoint(),
            &target,
            route("/v1/chat/completions", Some("trace=1")),
            &versions(),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mistral-xyz.westus.models.ai.azure.com/v1/chat/completions?trace=1"
        );
    }

    #[test]
    fn test_deployment_scoped_without_model_is_rejected() {
        let err = rewrite(
            &endpoint(),
            &managed(""),
            route("/v1/embeddings", None),
            &versions(),
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest { .. }));
    }

    #[test]
    fn test_voice_listing_needs_no_model() {
        let url = rewrite(
            &endpoint(),
            &managed(""),
            route("/v1/audio/voices", None),
            &versions(),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://myres.openai.azure.com/openai/audio/voices?api-version=2024-06-01"
        );
    }
}
