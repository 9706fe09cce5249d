use crate::error::{ProxyError, Result};
use crate::routing::{
    ApiVersions, AuthSettings, DeploymentResolver, MergeMode, MissingCredentialPolicy,
    ModelMapping, ServerlessDeployment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub mode: ProxyMode,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub models: ModelMapperConfig,
    /// Serverless deployments keyed by the model name callers use.
    #[serde(default)]
    pub serverless: HashMap<String, ServerlessConfig>,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Azure,
    #[serde(rename = "openai")]
    OpenAi,
}

impl FromStr for ProxyMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            other => Err(ProxyError::config(format!(
                "Unknown proxy mode '{other}'. Expected 'azure' or 'openai'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_responses_api_version")]
    pub responses_api_version: String,
    #[serde(default = "default_models_api_version")]
    pub models_api_version: String,
    /// Static token used when the caller sends no credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub missing_credential: MissingCredentialPolicy,
    #[serde(default = "default_serverless_domain")]
    pub serverless_domain: String,
    /// Chat requests for models starting with one of these are sent to the Responses API.
    #[serde(default = "default_reasoning_prefixes")]
    pub reasoning_model_prefixes: Vec<String>,
    #[serde(default = "default_true")]
    pub synthesize_done_on_eof: bool,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: default_api_version(),
            responses_api_version: default_responses_api_version(),
            models_api_version: default_models_api_version(),
            token: None,
            api_key_env: default_api_key_env(),
            missing_credential: MissingCredentialPolicy::default(),
            serverless_domain: default_serverless_domain(),
            reasoning_model_prefixes: default_reasoning_prefixes(),
            synthesize_done_on_eof: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMapperConfig {
    #[serde(default)]
    pub mode: MergeMode,
    #[serde(default)]
    pub map: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerlessConfig {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Variable holding the key. Defaults to `AZURE_OPENAI_KEY_<MODEL>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            mode: ProxyMode::default(),
            request_timeout_secs: default_request_timeout(),
            azure: AzureConfig::default(),
            models: ModelMapperConfig::default(),
            serverless: HashMap::new(),
            openai: OpenAiConfig::default(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:11437".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_api_version() -> String {
    "2024-06-01".to_string()
}

fn default_responses_api_version() -> String {
    "preview".to_string()
}

fn default_models_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_api_key_env() -> String {
    "AZURE_OPENAI_API_KEY".to_string()
}

fn default_serverless_domain() -> String {
    "models.ai.azure.com".to_string()
}

fn default_reasoning_prefixes() -> Vec<String> {
    vec![
        "o1-pro".to_string(),
        "o3-pro".to_string(),
        "codex-mini".to_string(),
        "computer-use-preview".to_string(),
    ]
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_true() -> bool {
    true
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir. Defaults when none exists.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults and environment");
        Ok(Self::default())
    }

    /// Overlay the `AZURE_OPENAI_*` environment variables. `lookup` stands in
    /// for the process environment so tests can supply their own.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("AZURE_OPENAI_PROXY_ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("AZURE_OPENAI_PROXY_MODE") {
            self.mode = v.parse()?;
        }
        if let Some(v) = var("AZURE_OPENAI_ENDPOINT") {
            self.azure.endpoint = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_APIVERSION") {
            self.azure.api_version = v;
        }
        if let Some(v) = var("AZURE_OPENAI_RESPONSES_APIVERSION") {
            self.azure.responses_api_version = v;
        }
        if let Some(v) = var("AZURE_OPENAI_MODELS_APIVERSION") {
            self.azure.models_api_version = v;
        }
        if let Some(v) = var("AZURE_OPENAI_TOKEN") {
            tracing::info!("Loading azure api token from env");
            self.azure.token = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_MODEL_MAPPER_MODE") {
            self.models.mode = if v.trim().eq_ignore_ascii_case("override") {
                MergeMode::Override
            } else {
                MergeMode::FillMissing
            };
        }
        if let Some(v) = var("AZURE_OPENAI_MODEL_MAPPER") {
            for (model, deployment) in parse_pairs(&v) {
                self.models.map.insert(model.to_string(), deployment.to_string());
            }
        }
        if let Some(v) = var("AZURE_AI_STUDIO_DEPLOYMENTS") {
            for (model, location) in parse_pairs(&v) {
                let Some((name, region)) = location.split_once(':') else {
                    tracing::warn!(entry = model, "Ignoring serverless deployment without name:region");
                    continue;
                };
                self.serverless.insert(
                    model.to_string(),
                    ServerlessConfig {
                        name: name.trim().to_string(),
                        region: region.trim().to_string(),
                        key: None,
                        key_env: None,
                    },
                );
            }
        }
        if let Some(v) = var("OPENAI_API_ENDPOINT") {
            self.openai.endpoint = v;
        }

        Ok(())
    }
}

/// `a=b,c=d` pairs; malformed entries are skipped.
fn parse_pairs(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.split(',').filter_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        let (k, v) = (k.trim(), v.trim());
        (!k.is_empty() && !v.is_empty()).then_some((k, v))
    })
}

/// Immutable runtime snapshot shared by every request.
#[derive(Debug)]
pub struct GatewayConfig {
    pub mode: ProxyMode,
    pub endpoint: Option<Url>,
    pub openai_endpoint: Url,
    pub versions: ApiVersions,
    pub mapping: ModelMapping,
    pub serverless: HashMap<String, ServerlessDeployment>,
    pub serverless_domain: String,
    pub auth: AuthSettings,
    pub reasoning_prefixes: Vec<String>,
    pub synthesize_done_on_eof: bool,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Validate `config` and freeze it. Keys named by environment variables are
    /// read through `lookup` once, here.
    pub fn build<F>(config: &ProxyConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match config.azure.endpoint.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_endpoint(raw, "Azure OpenAI endpoint")?),
            _ if config.mode == ProxyMode::Azure => {
                return Err(ProxyError::config(
                    "AZURE_OPENAI_ENDPOINT is not set. Set it or add [azure] endpoint to the config file",
                ));
            }
            _ => None,
        };
        let openai_endpoint = parse_endpoint(&config.openai.endpoint, "OpenAI endpoint")?;

        let mapping = ModelMapping::with_overrides(&config.models.map, config.models.mode);

        let serverless = config
            .serverless
            .iter()
            .map(|(model, s)| {
                let key_env = s
                    .key_env
                    .clone()
                    .unwrap_or_else(|| format!("AZURE_OPENAI_KEY_{}", model.to_uppercase()));
                let key = s.key.clone().or_else(|| lookup(&key_env)).unwrap_or_default();
                if key.is_empty() {
                    tracing::warn!(model = %model, key_env = %key_env, "Serverless deployment has no key");
                }
                (
                    model.to_lowercase(),
                    ServerlessDeployment {
                        name: s.name.clone(),
                        region: s.region.clone(),
                        key,
                    },
                )
            })
            .collect();

        let auth = AuthSettings {
            static_token: config.azure.token.clone().filter(|t| !t.is_empty()),
            fallback_key: lookup(&config.azure.api_key_env).filter(|k| !k.is_empty()),
            missing: config.azure.missing_credential,
        };

        Ok(Self {
            mode: config.mode,
            endpoint,
            openai_endpoint,
            versions: ApiVersions {
                default: config.azure.api_version.clone(),
                responses: config.azure.responses_api_version.clone(),
                models: config.azure.models_api_version.clone(),
            },
            mapping,
            serverless,
            serverless_domain: config.azure.serverless_domain.clone(),
            auth,
            reasoning_prefixes: config.azure.reasoning_model_prefixes.clone(),
            synthesize_done_on_eof: config.azure.synthesize_done_on_eof,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn resolver(&self) -> DeploymentResolver<'_> {
        DeploymentResolver {
            mapping: &self.mapping,
            serverless: &self.serverless,
            serverless_domain: &self.serverless_domain,
        }
    }

    /// Managed endpoint, present whenever the gateway runs in azure mode.
    pub fn azure_endpoint(&self) -> Result<&Url> {
        self.endpoint
            .as_ref()
            .ok_or_else(|| ProxyError::config("No Azure OpenAI endpoint configured"))
    }
}

fn parse_endpoint(raw: &str, what: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProxyError::config(format!("Invalid {what} '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProxyError::config(format!(
            "Invalid {what} '{raw}': expected an http(s) URL with a host"
        )));
    }
    Ok(url)
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("azure-oai-proxy.toml"));

    // XDG config dir
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("azure-oai-proxy").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("azure-oai-proxy").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home) = home_dir() {
        paths.push(home.join(".azure-oai-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::DeploymentTarget;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn with_endpoint() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.azure.endpoint = Some("https://example.openai.azure.com".to_string());
        config
    }

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
address = "127.0.0.1:9000"

[azure]
endpoint = "https://example.openai.azure.com"
api_version = "2024-08-01-preview"
missing_credential = "reject"

[models]
mode = "override"

[models.map]
"gpt-4" = "gpt4-prod"

[serverless.mistral-large]
name = "mistral-large-abc"
region = "eastus2"
key_env = "MISTRAL_KEY"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.address, "127.0.0.1:9000");
        assert_eq!(config.mode, ProxyMode::Azure);
        assert_eq!(config.azure.api_version, "2024-08-01-preview");
        assert_eq!(config.azure.responses_api_version, "preview");
        assert_eq!(config.azure.missing_credential, MissingCredentialPolicy::Reject);
        assert_eq!(config.models.mode, MergeMode::Override);
        assert_eq!(config.models.map.get("gpt-4"), Some(&"gpt4-prod".to_string()));
        assert_eq!(config.serverless["mistral-large"].region, "eastus2");
        assert!(config.azure.synthesize_done_on_eof);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.address, "0.0.0.0:11437");
        assert_eq!(config.azure.api_version, "2024-06-01");
        assert_eq!(config.openai.endpoint, "https://api.openai.com");
        assert_eq!(config.azure.reasoning_model_prefixes.len(), 4);
    }

    #[test]
    fn test_env_overlay() {
        let mut config = ProxyConfig::default();
        config
            .apply_env(env(&[
                ("AZURE_OPENAI_PROXY_ADDRESS", "127.0.0.1:8080"),
                ("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com/"),
                ("AZURE_OPENAI_APIVERSION", "2024-10-21"),
                ("AZURE_OPENAI_TOKEN", "static"),
                ("AZURE_OPENAI_MODEL_MAPPER", "gpt-4o=my-4o, bad-entry ,o3-pro=o3pro"),
                ("AZURE_OPENAI_MODEL_MAPPER_MODE", "Override"),
                ("AZURE_AI_STUDIO_DEPLOYMENTS", "Llama-3=llama-abc:eastus,broken=x"),
            ]))
            .unwrap();

        assert_eq!(config.address, "127.0.0.1:8080");
        assert_eq!(config.azure.endpoint.as_deref(), Some("https://res.openai.azure.com/"));
        assert_eq!(config.azure.api_version, "2024-10-21");
        assert_eq!(config.azure.token.as_deref(), Some("static"));
        assert_eq!(config.models.mode, MergeMode::Override);
        assert_eq!(config.models.map.len(), 2);
        assert_eq!(config.models.map["o3-pro"], "o3pro");
        assert_eq!(config.serverless.len(), 1);
        assert_eq!(config.serverless["Llama-3"].name, "llama-abc");
    }

    #[test]
    fn test_invalid_mode_is_an_error() {
        let mut config = ProxyConfig::default();
        let err = config
            .apply_env(env(&[("AZURE_OPENAI_PROXY_MODE", "gcp")]))
            .unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));

        config
            .apply_env(env(&[("AZURE_OPENAI_PROXY_MODE", "OpenAI")]))
            .unwrap();
        assert_eq!(config.mode, ProxyMode::OpenAi);
    }

    #[test]
    fn test_build_snapshot() {
        let mut config = with_endpoint();
        config.serverless.insert(
            "Llama-3".to_string(),
            ServerlessConfig {
                name: "llama-abc".to_string(),
                region: "eastus".to_string(),
                key: None,
                key_env: None,
            },
        );

        let gateway = GatewayConfig::build(
            &config,
            env(&[
                ("AZURE_OPENAI_KEY_LLAMA-3", "sk-serverless"),
                ("AZURE_OPENAI_API_KEY", "sk-fallback"),
            ]),
        )
        .unwrap();

        assert_eq!(gateway.auth.fallback_key.as_deref(), Some("sk-fallback"));
        assert_eq!(gateway.serverless["llama-3"].key, "sk-serverless");
        assert_eq!(gateway.versions.default, "2024-06-01");
        assert_eq!(gateway.request_timeout, Duration::from_secs(300));

        match gateway.resolver().resolve("LLAMA-3") {
            DeploymentTarget::Serverless { host, key } => {
                assert_eq!(host, "llama-abc.eastus.models.ai.azure.com");
                assert_eq!(key, "sk-serverless");
            }
            other => panic!("expected serverless target, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_endpoint_is_fatal() {
        let mut config = ProxyConfig::default();
        config.azure.endpoint = Some("not a url".to_string());
        assert!(matches!(
            GatewayConfig::build(&config, env(&[])),
            Err(ProxyError::Config { .. })
        ));

        config.azure.endpoint = Some("ftp://example.com".to_string());
        assert!(GatewayConfig::build(&config, env(&[])).is_err());
    }

    #[test]
    fn test_endpoint_required_only_in_azure_mode() {
        let mut config = ProxyConfig::default();
        assert!(GatewayConfig::build(&config, env(&[])).is_err());

        config.mode = ProxyMode::OpenAi;
        let gateway = GatewayConfig::build(&config, env(&[])).unwrap();
        assert!(gateway.endpoint.is_none());
        assert!(gateway.azure_endpoint().is_err());
        assert_eq!(gateway.openai_endpoint.as_str(), "https://api.openai.com/");
    }
}
