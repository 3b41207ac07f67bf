use serde::Deserialize;

/// Top-level shape of a WhatsApp Cloud API webhook delivery (§6 "Webhook
/// contract"). Mirrors the `entry[].changes[].value` nesting
/// `server::gateway::whatsapp_webhook` walks with nested `.get(...)` calls,
/// expressed as typed structs instead since this crate owns the whole shape
/// rather than skimming one field off a generic `Value`.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<InboundText>,
}

#[derive(Debug, Deserialize)]
pub struct InboundText {
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_status_and_a_message_in_one_payload() {
        let raw = r#"{
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{"id": "wamid.1", "status": "delivered", "recipient_id": "919876543210"}],
                        "messages": [{"from": "919876543210", "id": "wamid.2", "type": "text", "text": {"body": "STOP"}}]
                    }
                }]
            }]
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).unwrap();
        let value = &envelope.entry[0].changes[0].value;
        assert_eq!(value.statuses[0].status, "delivered");
        assert_eq!(value.messages[0].text.as_ref().unwrap().body, "STOP");
    }

    #[test]
    fn tolerates_missing_arrays() {
        let envelope: WebhookEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.entry.is_empty());
    }
}
