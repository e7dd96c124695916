//! HTTP routes of the hosting contract.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::inference::{InferenceError, Pipeline, Predictor};

/// Default request body cap: 6 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Shared state handed to every handler.
pub struct AppState<P: ?Sized> {
    pipeline: Pipeline<P>,
}

impl<P: ?Sized> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<P: Predictor + ?Sized> AppState<P> {
    pub fn new(pipeline: Pipeline<P>) -> Self {
        Self { pipeline }
    }
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for a failed invocation.
pub fn status_for(err: &InferenceError) -> StatusCode {
    match err {
        InferenceError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        InferenceError::UnsupportedAcceptType(_) => StatusCode::NOT_ACCEPTABLE,
        InferenceError::InvalidPayload(_) | InferenceError::Prediction(_) => {
            StatusCode::BAD_REQUEST
        }
        InferenceError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Build the router serving `GET /ping` and `POST /invocations`.
pub fn create_router<P>(state: AppState<P>, max_body_bytes: usize) -> Router
where
    P: Predictor + ?Sized + 'static,
{
    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations::<P>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// The server only listens once the model is loaded, so answering at all
/// means ready.
async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn invocations<P>(
    State(state): State<AppState<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    P: Predictor + ?Sized + 'static,
{
    let content_type = header_value(&headers, header::CONTENT_TYPE).unwrap_or_default();
    let accept = header_value(&headers, header::ACCEPT);

    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline.invoke(&body, &content_type, accept.as_deref())
    })
    .await;

    match outcome {
        Ok(Ok(encoded)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoded.content_type)],
            encoded.body,
        )
            .into_response(),
        Ok(Err(err)) => error_response(status_for(&err), err.to_string()),
        Err(join_err) => {
            tracing::error!(error = %join_err, "inference task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error during inference".to_string(),
            )
        }
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}
