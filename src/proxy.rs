//! One request/response lifecycle through the gateway.
//!
//! [`ProxyPipeline::handle`] is the only entry point the HTTP layer uses. It
//! classifies the inbound path, resolves the deployment, rewrites credentials
//! and URL, optionally reshapes the body for the Responses API, and streams the
//! upstream answer back.

use crate::config::{GatewayConfig, ProxyMode};
use crate::error::{ProxyError, Result};
use crate::routing::auth::{normalize_openai_auth, redacted_headers};
use crate::routing::operation::deployment_from_path;
use crate::routing::rewrite::rewrite;
use crate::routing::{DeploymentTarget, OperationKind, Route};
use crate::translate::chat_types::ChatCompletionRequest;
use crate::translate::request::{chat_to_responses, is_reasoning_model};
use crate::translate::response::{responses_to_chat, TranslatedResponse};
use crate::translate::responses_types::ResponsesResponse;
use crate::translate::streaming::{SseFrame, StreamTranscoder};

use axum::body::Body;
use axum::http::header::{
    ACCEPT_ENCODING, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST,
    TRANSFER_ENCODING, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const PROXY_USER_AGENT: &str = concat!("azure-oai-proxy/", env!("CARGO_PKG_VERSION"));

/// Frames buffered between the transcoding task and the caller.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Request fields that some backends reject; their presence is logged.
const DIAGNOSTIC_PARAMS: &[&str] = &[
    "completion_config",
    "presence_penalty",
    "frequency_penalty",
    "best_of",
];

/// The parts of an inbound HTTP request the pipeline needs.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Per-request facts fixed before anything is forwarded.
#[derive(Debug, Clone)]
pub struct TranslationContext {
    pub request_id: String,
    pub operation: OperationKind,
    pub upstream_operation: OperationKind,
    pub model: String,
    pub stream: bool,
}

impl TranslationContext {
    /// Whether the body crosses between the Chat Completions and Responses conventions.
    pub fn translates(&self) -> bool {
        self.operation != self.upstream_operation
    }
}

#[derive(Debug, Clone)]
pub struct ProxyPipeline {
    config: Arc<GatewayConfig>,
    client: reqwest::Client,
}

impl ProxyPipeline {
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn handle(&self, req: InboundRequest) -> Result<Response> {
        match self.config.mode {
            ProxyMode::Azure => self.handle_azure(req).await,
            ProxyMode::OpenAi => self.handle_openai(req).await,
        }
    }

    async fn handle_azure(&self, req: InboundRequest) -> Result<Response> {
        let operation = OperationKind::from_path(&req.path);
        let body_json = parse_json_body(&req.headers, &req.body);

        let mut model = deployment_from_path(&req.path)
            .map(str::to_string)
            .or_else(|| {
                body_json
                    .as_ref()
                    .and_then(|v| v.get("model"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            });
        if model.is_none() {
            model = multipart_field(&req.headers, &req.body, "model").await;
        }
        let model = model.unwrap_or_default();

        let stream = body_json
            .as_ref()
            .and_then(|v| v.get("stream"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let target = self.config.resolver().resolve(&model);

        let mut ctx = TranslationContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
            upstream_operation: operation,
            model,
            stream,
        };

        if let Some(json) = &body_json {
            log_diagnostic_params(&ctx, json);
        }

        let mut headers = req.headers;
        strip_hop_by_hop(&mut headers);
        let source = self.config.auth.inject(&mut headers, &target)?;

        let mut body = req.body;
        let mut path = req.path.as_str();

        if let DeploymentTarget::Managed { deployment } = &target {
            if operation == OperationKind::ChatCompletions
                && is_reasoning_model(&ctx.model, &self.config.reasoning_prefixes)
            {
                let chat: ChatCompletionRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
                    tracing::warn!(request_id = %ctx.request_id, error = %e, "Malformed chat request, translating defaults");
                    ChatCompletionRequest::default()
                });
                let mut responses_req = chat_to_responses(&chat);
                responses_req.model = deployment.clone();

                body = Bytes::from(serde_json::to_vec(&responses_req)?);
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                // The reply is parsed here, so it must arrive uncompressed.
                headers.remove(ACCEPT_ENCODING);
                ctx.upstream_operation = OperationKind::Responses;
                path = OperationKind::Responses.canonical_path();
                tracing::info!(
                    request_id = %ctx.request_id,
                    model = %ctx.model,
                    "Translating chat completion to the Responses API"
                );
            }
        }

        let endpoint = self.config.azure_endpoint()?;
        let url = rewrite(
            endpoint,
            &target,
            Route {
                operation: ctx.upstream_operation,
                path,
                query: req.query.as_deref(),
            },
            &self.config.versions,
        )?;

        tracing::info!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            operation = %ctx.operation,
            deployment = %target.label(),
            ?source,
            "Proxying {} {} -> {}",
            req.method,
            req.path,
            url
        );
        tracing::debug!(request_id = %ctx.request_id, headers = ?redacted_headers(&headers), "Outbound headers");

        let response = self
            .client
            .request(req.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(request_id = %ctx.request_id, error = %e, "Upstream request failed");
                ProxyError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return error_passthrough(&ctx.request_id, response).await;
        }

        if !ctx.translates() {
            return Ok(stream_through(response));
        }

        if ctx.stream && is_event_stream(response.headers()) {
            return Ok(self.transcode(response, &ctx));
        }

        translate_body(response, &ctx).await
    }

    /// Forward verbatim to the plain OpenAI endpoint.
    async fn handle_openai(&self, req: InboundRequest) -> Result<Response> {
        let mut url = self.config.openai_endpoint.clone();
        url.set_path(&req.path);
        url.set_query(req.query.as_deref());

        let mut headers = req.headers;
        strip_hop_by_hop(&mut headers);
        normalize_openai_auth(&mut headers)?;
        headers.insert(USER_AGENT, HeaderValue::from_static(PROXY_USER_AGENT));

        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(request_id = %request_id, "Proxying request [OpenAI] {} {} -> {}", req.method, req.path, url);

        let response = self
            .client
            .request(req.method, url)
            .headers(headers)
            .body(req.body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(request_id = %request_id, error = %e, "OpenAI request failed");
                ProxyError::from(e)
            })?;

        if !response.status().is_success() {
            return error_passthrough(&request_id, response).await;
        }
        Ok(stream_through(response))
    }

    /// Spawn the transcoding task and hand its receiving end to the caller.
    fn transcode(&self, response: reqwest::Response, ctx: &TranslationContext) -> Response {
        let status = response.status();
        let mut headers = response_headers(response.headers());
        let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(STREAM_CHANNEL_CAPACITY);

        let model = ctx.model.clone();
        let request_id = ctx.request_id.clone();
        let synthesize_done = self.config.synthesize_done_on_eof;

        tokio::spawn(pump_transcoded(
            response.bytes_stream(),
            StreamTranscoder::new(&model),
            tx,
            synthesize_done,
            request_id,
        ));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        set_sse_headers(&mut headers);

        let mut out = Response::new(Body::from_stream(ReceiverStream::new(rx)));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        out
    }
}

type FrameSender = mpsc::Sender<std::result::Result<Bytes, std::io::Error>>;

/// Feed upstream SSE events through `transcoder` into `tx` until the stream
/// ends, a terminal event is seen, or the caller goes away. Returning drops
/// `upstream`, which closes the upstream connection.
async fn pump_transcoded<S, E>(
    upstream: S,
    mut transcoder: StreamTranscoder,
    tx: FrameSender,
    synthesize_done: bool,
    request_id: String,
) where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let events = upstream.eventsource();
    tokio::pin!(events);

    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                tracing::info!(request_id = %request_id, "Caller disconnected, closing upstream stream");
                return;
            }
            next = events.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "Upstream stream error");
                break;
            }
            None => break,
        };

        for frame in transcoder.process_event(&event.event, &event.data) {
            if !send_frame(&tx, &frame).await {
                tracing::info!(request_id = %request_id, "Caller disconnected, closing upstream stream");
                return;
            }
        }

        if transcoder.is_done() {
            break;
        }
    }

    for frame in transcoder.finish(synthesize_done) {
        if !send_frame(&tx, &frame).await {
            return;
        }
    }

    tracing::info!(request_id = %request_id, frames = transcoder.emitted(), "Stream completed");
}

/// Returns false once the caller has gone away.
async fn send_frame(tx: &FrameSender, frame: &SseFrame) -> bool {
    match frame.to_bytes() {
        Ok(bytes) => tx.send(Ok(bytes)).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode stream chunk, skipping");
            true
        }
    }
}

async fn translate_body(response: reqwest::Response, ctx: &TranslationContext) -> Result<Response> {
    let status = response.status();
    let headers = response_headers(response.headers());
    let bytes = response.bytes().await?;

    let parsed: ResponsesResponse = match serde_json::from_slice(&bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Unparseable Responses API body, passing through");
            return Ok(build_response(status, headers, Body::from(bytes)));
        }
    };

    match responses_to_chat(&parsed, &ctx.model) {
        TranslatedResponse::Chat(chat) => {
            tracing::info!(
                request_id = %ctx.request_id,
                prompt_tokens = chat.usage.prompt_tokens,
                completion_tokens = chat.usage.completion_tokens,
                "Completed"
            );
            Ok((status, Json(chat)).into_response())
        }
        TranslatedResponse::UpstreamError => {
            tracing::warn!(request_id = %ctx.request_id, "Responses API body carries an error, passing through");
            Ok(build_response(status, headers, Body::from(bytes)))
        }
    }
}

/// Read, log and forward a non-2xx answer byte-for-byte.
async fn error_passthrough(request_id: &str, response: reqwest::Response) -> Result<Response> {
    let status = response.status();
    let headers = response_headers(response.headers());
    let bytes = response.bytes().await?;

    tracing::warn!(
        request_id = %request_id,
        status = status.as_u16(),
        body = %String::from_utf8_lossy(&bytes),
        "Upstream returned an error"
    );

    Ok(build_response(status, headers, Body::from(bytes)))
}

fn stream_through(response: reqwest::Response) -> Response {
    let status = response.status();
    let mut headers = response_headers(response.headers());
    if is_event_stream(&headers) {
        set_sse_headers(&mut headers);
    }
    build_response(status, headers, Body::from_stream(response.bytes_stream()))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut out = Response::new(body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    headers
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [HOST, CONTENT_LENGTH, CONNECTION, TRANSFER_ENCODING] {
        headers.remove(name);
    }
}

fn set_sse_headers(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// JSON body as a loose value; `None` for multipart, empty or malformed bodies.
fn parse_json_body(headers: &HeaderMap, body: &[u8]) -> Option<serde_json::Value> {
    if body.is_empty() || content_type(headers).starts_with("multipart/") {
        return None;
    }
    serde_json::from_slice(body).ok()
}

fn log_diagnostic_params(ctx: &TranslationContext, json: &serde_json::Value) {
    let present: Vec<&str> = DIAGNOSTIC_PARAMS
        .iter()
        .copied()
        .filter(|p| json.get(*p).is_some())
        .collect();
    if !present.is_empty() {
        tracing::debug!(request_id = %ctx.request_id, model = %ctx.model, params = ?present, "Request carries optional parameters");
    }
}

/// Value of a plain text field in a `multipart/form-data` body. File parts
/// are skipped; the raw body is left untouched for forwarding.
async fn multipart_field(headers: &HeaderMap, body: &Bytes, name: &str) -> Option<String> {
    let ct = content_type(headers);
    if !ct.starts_with("multipart/form-data") {
        return None;
    }
    let boundary = multer::parse_boundary(ct).ok()?;
    let body = body.clone();
    let mut form = multer::Multipart::new(
        futures::stream::once(async move { Ok::<_, Infallible>(body) }),
        boundary,
    );

    loop {
        match form.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some(name) && field.file_name().is_none() {
                    return field.text().await.ok().map(|v| v.trim().to_string());
                }
            }
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable multipart body");
                return None;
            }
        }
    }
}
