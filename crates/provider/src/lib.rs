pub mod client;
pub mod error;

pub use client::{MediaUploadResult, ProfileInfo, RemoteTemplate, WhatsAppClient};
pub use error::{classify, ClientError, ProviderApiError};
