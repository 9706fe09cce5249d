//! Body and stream translation between the Chat Completions and Responses APIs.
//!
//! Reasoning-family models are only served through the Responses API, so
//! chat callers targeting them get their request reshaped on the way out and
//! the response (or SSE stream) reshaped on the way back. All translation
//! functions here are pure (no I/O).

pub mod chat_types;
pub mod request;
pub mod response;
pub mod responses_types;
pub mod streaming;
