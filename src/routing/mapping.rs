//! Canonical model name → Azure deployment name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mappings every gateway starts with; operators extend or override them.
const BUILTIN_MODEL_MAP: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "gpt-35-turbo"),
    ("gpt-3.5-turbo-0125", "gpt-35-turbo-0125"),
    ("gpt-3.5-turbo-0613", "gpt-35-turbo-0613"),
    ("gpt-3.5-turbo-1106", "gpt-35-turbo-1106"),
    ("gpt-3.5-turbo-16k-0613", "gpt-35-turbo-16k-0613"),
    ("gpt-3.5-turbo-instruct-0914", "gpt-35-turbo-instruct-0914"),
    ("gpt-4", "gpt-4-0613"),
    ("gpt-4-32k", "gpt-4-32k"),
    ("gpt-4-32k-0613", "gpt-4-32k-0613"),
    ("gpt-4o", "gpt-4o"),
    ("gpt-4o-mini", "gpt-4o-mini"),
    ("gpt-4o-2024-05-13", "gpt-4o-2024-05-13"),
    ("gpt-4-turbo", "gpt-4-turbo"),
    ("gpt-4-vision-preview", "gpt-4-vision-preview"),
    ("gpt-4-turbo-2024-04-09", "gpt-4-turbo-2024-04-09"),
    ("gpt-4-1106-preview", "gpt-4-1106-preview"),
    ("text-embedding-ada-002", "text-embedding-ada-002"),
    ("dall-e-2", "dall-e-2"),
    ("dall-e-3", "dall-e-3"),
    ("babbage-002", "babbage-002"),
    ("davinci-002", "davinci-002"),
    ("whisper-1", "whisper"),
    ("tts-1", "tts"),
    ("tts-1-hd", "tts-hd"),
    ("text-embedding-3-small", "text-embedding-3-small-1"),
    ("text-embedding-3-large", "text-embedding-3-large-1"),
];

/// How externally supplied mappings merge with the built-in table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Only add models the built-in table does not know.
    #[default]
    FillMissing,
    /// Replace built-in entries with the supplied ones.
    Override,
}

/// Immutable, case-insensitive model → deployment table.
#[derive(Debug, Clone, Default)]
pub struct ModelMapping {
    entries: HashMap<String, String>,
}

impl ModelMapping {
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN_MODEL_MAP.iter().map(|(k, v)| (*k, *v)))
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();
        Self { entries }
    }

    /// Built-in table merged with `overrides` according to `mode`.
    pub fn with_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
        mode: MergeMode,
    ) -> Self {
        let mut mapping = Self::builtin();
        for (model, deployment) in overrides {
            let key = model.to_lowercase();
            match (mode, mapping.entries.contains_key(&key)) {
                (MergeMode::FillMissing, true) => {
                    tracing::debug!(model = %model, "Skipping existing model mapping");
                }
                _ => {
                    tracing::debug!(model = %model, deployment = %deployment, ?mode, "Model mapping");
                    mapping.entries.insert(key, deployment.clone());
                }
            }
        }
        mapping
    }

    pub fn get(&self, model: &str) -> Option<&str> {
        self.entries.get(&model.to_lowercase()).map(String::as_str)
    }

    /// Deployment for `model`, falling back to a sanitized copy of the name.
    pub fn resolve(&self, model: &str) -> String {
        match self.get(model) {
            Some(deployment) => deployment.to_string(),
            None => {
                let fallback = sanitize_deployment_name(model);
                tracing::debug!(model = %model, deployment = %fallback, "No model mapping, using sanitized name");
                fallback
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Drop characters a deployment name cannot contain (`.` and `:`), plus anything
/// that would split or escape the path segment it is placed in.
pub fn sanitize_deployment_name(model: &str) -> String {
    model
        .chars()
        .filter(|c| !matches!(c, '.' | ':' | '/' | '\\' | '?' | '#') && !c.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mapping = ModelMapping::builtin();
        assert_eq!(mapping.resolve("GPT-4O"), mapping.resolve("gpt-4o"));
        assert_eq!(mapping.resolve("Whisper-1"), "whisper");
        assert_eq!(mapping.resolve("gpt-3.5-turbo"), "gpt-35-turbo");
    }

    #[test]
    fn test_fallback_strips_illegal_characters() {
        let mapping = ModelMapping::builtin();
        assert_eq!(mapping.resolve("custom:model.v2"), "custommodelv2");
        assert_eq!(mapping.resolve("llama-3.1-70b"), "llama-31-70b");
        assert_eq!(mapping.resolve("evil/../path"), "evilpath");
    }

    #[test]
    fn test_fallback_keeps_case() {
        let mapping = ModelMapping::builtin();
        assert_eq!(mapping.resolve("My-Deployment"), "My-Deployment");
    }

    #[test]
    fn test_fill_missing_keeps_builtin() {
        let overrides: HashMap<String, String> = [
            ("gpt-4".to_string(), "my-gpt4".to_string()),
            ("phi-4".to_string(), "phi4-prod".to_string()),
        ]
        .into_iter()
        .collect();

        let mapping = ModelMapping::with_overrides(&overrides, MergeMode::FillMissing);
        assert_eq!(mapping.resolve("gpt-4"), "gpt-4-0613");
        assert_eq!(mapping.resolve("PHI-4"), "phi4-prod");
    }

    #[test]
    fn test_override_replaces_builtin() {
        let overrides: HashMap<String, String> =
            [("GPT-4".to_string(), "my-gpt4".to_string())].into_iter().collect();

        let mapping = ModelMapping::with_overrides(&overrides, MergeMode::Override);
        assert_eq!(mapping.resolve("gpt-4"), "my-gpt4");
        assert_eq!(mapping.len(), ModelMapping::builtin().len());
    }
}
