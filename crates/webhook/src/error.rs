use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("request body is not valid JSON")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("no active sender's app_secret matches the request signature")]
    SignatureMismatch,
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}
