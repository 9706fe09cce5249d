//! Operation kinds recognized on the inbound surface.
//!
//! The kind is resolved once per request from the inbound path and carried
//! through every later stage, so nothing downstream re-matches path prefixes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ChatCompletions,
    Completions,
    Embeddings,
    ImageGenerations,
    AudioSpeech,
    AudioTranscriptions,
    AudioTranslations,
    AudioVoices,
    FineTunes,
    Files,
    Deployments,
    Models,
    Responses,
    Other,
}

/// Where an operation lives on the managed backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendScope {
    /// `/openai/deployments/{deployment}/{suffix}`
    Deployment(&'static str),
    /// `/openai/{root}{rest}`, not tied to a deployment
    Root(&'static str),
}

/// Inbound prefix (after `/v1`) and backend scope for every recognized kind.
const OPERATIONS: &[(OperationKind, &str, BackendScope)] = &[
    (
        OperationKind::ChatCompletions,
        "/chat/completions",
        BackendScope::Deployment("chat/completions"),
    ),
    (
        OperationKind::Completions,
        "/completions",
        BackendScope::Deployment("completions"),
    ),
    (
        OperationKind::Embeddings,
        "/embeddings",
        BackendScope::Deployment("embeddings"),
    ),
    (
        OperationKind::ImageGenerations,
        "/images/generations",
        BackendScope::Deployment("images/generations"),
    ),
    (
        OperationKind::AudioSpeech,
        "/audio/speech",
        BackendScope::Deployment("audio/speech"),
    ),
    (
        OperationKind::AudioTranscriptions,
        "/audio/transcriptions",
        BackendScope::Deployment("audio/transcriptions"),
    ),
    (
        OperationKind::AudioTranslations,
        "/audio/translations",
        BackendScope::Deployment("audio/translations"),
    ),
    // Voice listing names no model, so it is not tied to a deployment.
    (
        OperationKind::AudioVoices,
        "/audio/voices",
        BackendScope::Root("audio/voices"),
    ),
    (
        OperationKind::FineTunes,
        "/fine_tunes",
        BackendScope::Root("fine-tunes"),
    ),
    (OperationKind::Files, "/files", BackendScope::Root("files")),
    (
        OperationKind::Deployments,
        "/deployments",
        BackendScope::Root("deployments"),
    ),
    (OperationKind::Models, "/models", BackendScope::Root("models")),
    (
        OperationKind::Responses,
        "/responses",
        BackendScope::Root("v1/responses"),
    ),
];

impl OperationKind {
    /// Classify an inbound path.
    ///
    /// Accepts both the OpenAI shape (`/v1/chat/completions`) and the Azure
    /// shape (`/openai/deployments/{d}/chat/completions`).
    pub fn from_path(path: &str) -> Self {
        let rest = operation_path(path);
        OPERATIONS
            .iter()
            .find(|(_, prefix, _)| matches_prefix(rest, prefix))
            .map_or(Self::Other, |(kind, _, _)| *kind)
    }

    pub fn backend_scope(self) -> Option<BackendScope> {
        OPERATIONS
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|(_, _, scope)| *scope)
    }

    /// Whether the managed backend addresses this operation through a deployment segment.
    pub fn is_deployment_scoped(self) -> bool {
        !matches!(self.backend_scope(), Some(BackendScope::Root(_)))
    }

    /// The part of `path` after this operation's own prefix, e.g. `/file-1/content`
    /// for `/v1/files/file-1/content`. Empty when the path does not belong to this kind.
    pub fn remainder(self, path: &str) -> &str {
        let rest = operation_path(path);
        OPERATIONS
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .and_then(|(_, prefix, _)| {
                matches_prefix(rest, prefix).then(|| &rest[prefix.len()..])
            })
            .unwrap_or("")
    }

    /// Canonical inbound path for this kind, used when a request is re-targeted
    /// at a different operation than the one the caller named.
    pub fn canonical_path(self) -> &'static str {
        match self {
            Self::ChatCompletions => "/v1/chat/completions",
            Self::Completions => "/v1/completions",
            Self::Embeddings => "/v1/embeddings",
            Self::ImageGenerations => "/v1/images/generations",
            Self::AudioSpeech => "/v1/audio/speech",
            Self::AudioTranscriptions => "/v1/audio/transcriptions",
            Self::AudioTranslations => "/v1/audio/translations",
            Self::AudioVoices => "/v1/audio/voices",
            Self::FineTunes => "/v1/fine_tunes",
            Self::Files => "/v1/files",
            Self::Deployments => "/deployments",
            Self::Models => "/v1/models",
            Self::Responses => "/v1/responses",
            Self::Other => "/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat_completions",
            Self::Completions => "completions",
            Self::Embeddings => "embeddings",
            Self::ImageGenerations => "image_generations",
            Self::AudioSpeech => "audio_speech",
            Self::AudioTranscriptions => "audio_transcriptions",
            Self::AudioTranslations => "audio_translations",
            Self::AudioVoices => "audio_voices",
            Self::FineTunes => "fine_tunes",
            Self::Files => "files",
            Self::Deployments => "deployments",
            Self::Models => "models",
            Self::Responses => "responses",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment name from an Azure-shaped path: `/openai/deployments/{name}/<operation>`.
///
/// A bare `/deployments/{id}` (the deployment listing route) carries no operation
/// after the id and is not treated as a deployment reference.
pub fn deployment_from_path(path: &str) -> Option<&str> {
    let mut parts = path.split('/').skip_while(|p| *p != "deployments").skip(1);
    let name = parts.next().filter(|n| !n.is_empty())?;
    parts.next().filter(|op| !op.is_empty())?;
    Some(name)
}

/// Strip the API prefix so only the operation part of the path remains.
fn operation_path(path: &str) -> &str {
    if let Some(name) = deployment_from_path(path) {
        if let Some(idx) = path.find(&format!("/deployments/{name}/")) {
            return &path[idx + "/deployments/".len() + name.len()..];
        }
    }
    if let Some(rest) = path.strip_prefix("/openai") {
        return rest.strip_prefix("/v1").unwrap_or(rest);
    }
    path.strip_prefix("/v1").unwrap_or(path)
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
