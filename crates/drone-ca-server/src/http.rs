//! HTTP surface: one form endpoint that returns a certificate line.

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use drone_ca::{IssuanceRequest, Issuer};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed form: {0}")]
    Form(#[from] FormRejection),
    #[error("missing form field {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Issue(#[from] drone_ca::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Bodies stay empty. Details are in the logs.
        let status = match &self {
            ApiError::Form(_) | ApiError::MissingField(_) => StatusCode::BAD_REQUEST,
            ApiError::Issue(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Issue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

/// Raw form pairs in submission order. A repeated field keeps its first value.
type FormFields = Vec<(String, String)>;

fn field(fields: &FormFields, name: &'static str) -> Result<String, ApiError> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
        .ok_or(ApiError::MissingField(name))
}

fn issuance_request(fields: &FormFields) -> Result<IssuanceRequest, ApiError> {
    Ok(IssuanceRequest {
        build: field(fields, "build")?,
        repo: field(fields, "repo")?,
        pubkey: field(fields, "pubkey")?,
    })
}

pub fn router(issuer: Issuer) -> Router {
    Router::new()
        .route("/", get(issue_certificate).post(issue_certificate))
        .route("/healthz", get(health))
        .with_state(issuer)
}

async fn issue_certificate(
    State(issuer): State<Issuer>,
    form: Result<Form<FormFields>, FormRejection>,
) -> Result<String, ApiError> {
    let request = form
        .map_err(ApiError::from)
        .and_then(|Form(fields)| issuance_request(&fields))
        .inspect_err(|err| warn!(error = %err, "rejected certificate request form"))?;
    debug!("certificate request received");

    let issued = issuer.issue(&request)?;
    Ok(issued.encoded)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
