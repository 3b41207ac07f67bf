use std::collections::HashMap;
use std::time::Duration;

use outreach_core::domain::SendOutcome;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{classify, ClientError, ProviderApiError};

/// Typed wrapper over the WhatsApp Cloud API: bearer auth, JSON POST to
/// `{api_base}/{phone_id}/messages`. Single-attempt per call — retry/backoff
/// lives in the queue processor, which needs the persisted
/// `retry_count`/`next_retry_at` state that a client-internal retry loop
/// would hide.
pub struct WhatsAppClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Clone)]
pub struct MediaUploadResult {
    pub media_id: String,
}

#[derive(Debug, Clone)]
pub struct ProfileInfo {
    pub verified_name: String,
    pub quality_rating: String,
    pub tier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTemplate {
    pub name: String,
    pub language: String,
    pub category: String,
    pub status: String,
    pub components: serde_json::Value,
}

#[derive(Deserialize)]
struct SendResponseBody {
    messages: Vec<SendResponseMessage>,
}

#[derive(Deserialize)]
struct SendResponseMessage {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
}

impl WhatsAppClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder never fails with only a timeout set");
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.api_base, phone_number_id)
    }

    #[instrument(skip(self, access_credential, variables, components))]
    pub async fn send_template(
        &self,
        access_credential: &str,
        phone_number_id: &str,
        recipient_phone: &str,
        template_name: &str,
        language: &str,
        variables: &HashMap<String, String>,
        components: &serde_json::Value,
    ) -> SendOutcome {
        let parameters: Vec<serde_json::Value> = {
            let mut keys: Vec<&String> = variables.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|k| json!({ "type": "text", "text": variables[k] }))
                .collect()
        };

        let mut template_components = components.clone();
        if !parameters.is_empty() {
            if let serde_json::Value::Array(ref mut arr) = template_components {
                arr.push(json!({ "type": "body", "parameters": parameters }));
            } else {
                template_components = json!([{ "type": "body", "parameters": parameters }]);
            }
        }

        let body = json!({
            "messaging_product": "whatsapp",
            "to": recipient_phone,
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": language },
                "components": template_components,
            },
        });

        match self.dispatch(access_credential, phone_number_id, body).await {
            Ok(wamid) => SendOutcome::Ok { wamid },
            Err(e) => classify(&e),
        }
    }

    #[instrument(skip(self, access_credential))]
    pub async fn send_text(
        &self,
        access_credential: &str,
        phone_number_id: &str,
        recipient_phone: &str,
        text: &str,
    ) -> SendOutcome {
        let body = json!({
            "messaging_product": "whatsapp",
            "to": recipient_phone,
            "type": "text",
            "text": { "body": text },
        });

        match self.dispatch(access_credential, phone_number_id, body).await {
            Ok(wamid) => SendOutcome::Ok { wamid },
            Err(e) => classify(&e),
        }
    }

    async fn dispatch(
        &self,
        access_credential: &str,
        phone_number_id: &str,
        body: serde_json::Value,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.messages_url(phone_number_id))
            .bearer_auth(access_credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else {
                    ClientError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            let envelope: ErrorEnvelope = serde_json::from_str(&text).map_err(|_| {
                ClientError::MalformedResponse(format!("status {}: {}", status, text))
            })?;
            return Err(ClientError::Api(ProviderApiError {
                http_status: status.as_u16(),
                code: envelope.error.code,
                subcode: envelope.error.error_subcode,
                message: envelope.error.message,
            }));
        }

        let parsed: SendResponseBody = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| ClientError::MalformedResponse("empty messages[] in response".into()))
    }

    #[instrument(skip(self, access_credential, bytes))]
    pub async fn upload_media(
        &self,
        access_credential: &str,
        phone_number_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        filename: &str,
    ) -> Result<MediaUploadResult, ClientError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .part("file", part);

        let url = format!("{}/{}/media", self.api_base, phone_number_id);
        let response = self
            .http
            .post(url)
            .bearer_auth(access_credential)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        #[derive(Deserialize)]
        struct MediaResponse {
            id: String,
        }

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ClientError::MalformedResponse(format!(
                "media upload failed with status {}: {}",
                status, text
            )));
        }
        let parsed: MediaResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        Ok(MediaUploadResult { media_id: parsed.id })
    }

    #[instrument(skip(self, access_credential))]
    pub async fn fetch_templates(
        &self,
        access_credential: &str,
        business_account_id: &str,
    ) -> Result<Vec<RemoteTemplate>, ClientError> {
        #[derive(Deserialize)]
        struct TemplatesResponse {
            data: Vec<RemoteTemplate>,
        }

        let url = format!("{}/{}/message_templates", self.api_base, business_account_id);
        let response = self
            .http
            .get(url)
            .bearer_auth(access_credential)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let parsed: TemplatesResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        Ok(parsed.data)
    }

    /// `testConnection` (§6): used by the `outreach-cli sender verify`
    /// subcommand, not by any workflow in the Campaign Send Engine core.
    #[instrument(skip(self, access_credential))]
    pub async fn test_connection(
        &self,
        access_credential: &str,
        phone_number_id: &str,
    ) -> Result<ProfileInfo, ClientError> {
        #[derive(Deserialize)]
        struct ProfileResponse {
            verified_name: String,
            #[serde(default)]
            quality_rating: Option<String>,
            #[serde(default)]
            messaging_limit_tier: Option<String>,
        }

        let url = format!(
            "{}/{}?fields=verified_name,quality_rating,messaging_limit_tier",
            self.api_base, phone_number_id
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(access_credential)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let parsed: ProfileResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        Ok(ProfileInfo {
            verified_name: parsed.verified_name,
            quality_rating: parsed.quality_rating.unwrap_or_default(),
            tier: parsed.messaging_limit_tier.unwrap_or_default(),
        })
    }
}
