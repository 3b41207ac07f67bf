use thiserror::Error;

/// Raw error payload as returned by the WhatsApp Cloud API's `error` object.
#[derive(Debug, Clone)]
pub struct ProviderApiError {
    pub http_status: u16,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to provider failed: {0}")]
    Transport(String),
    #[error("request to provider timed out")]
    Timeout,
    #[error("provider returned an error: {0:?}")]
    Api(ProviderApiError),
    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
}

/// Error-code-family classification (§6 "Outbound provider contract").
/// `132000`-class codes and HTTP 401/403 are campaign-fatal; `131048` is
/// the spam-rate signal; the rest of the documented rate-limit codes map
/// to `rate_limited`; recipient-shaped errors are permanent; everything
/// else transport-y is transient.
pub fn classify(err: &ClientError) -> outreach_core::domain::SendOutcome {
    use outreach_core::domain::SendOutcome;

    match err {
        ClientError::Timeout => SendOutcome::TransientFail {
            code: None,
            message: "request timed out".to_string(),
        },
        ClientError::Transport(msg) => SendOutcome::TransientFail {
            code: None,
            message: msg.clone(),
        },
        ClientError::MalformedResponse(msg) => SendOutcome::TransientFail {
            code: None,
            message: msg.clone(),
        },
        ClientError::Api(api) => classify_api_error(api),
    }
}

fn classify_api_error(api: &ProviderApiError) -> outreach_core::domain::SendOutcome {
    use outreach_core::domain::SendOutcome;

    let code_str = api.code.map(|c| c.to_string());

    if api.http_status == 401 || api.http_status == 403 || api.code == Some(132000) {
        return SendOutcome::CampaignFatal {
            message: api.message.clone(),
        };
    }

    if api.code == Some(131048) {
        return SendOutcome::SpamRateLimited;
    }

    // General rate-limit family: standard throughput/quota codes.
    if matches!(api.code, Some(4) | Some(80007) | Some(130429)) {
        return SendOutcome::RateLimited;
    }

    // User-level: invalid recipient, opted-out, re-engagement window expired.
    if matches!(api.code, Some(131026) | Some(131047) | Some(131051) | Some(133010)) {
        return SendOutcome::PermanentFail {
            code: code_str,
            message: api.message.clone(),
        };
    }

    if api.http_status >= 500 {
        return SendOutcome::TransientFail {
            code: code_str,
            message: api.message.clone(),
        };
    }

    // Unrecognized 4xx from the provider: treat as permanent rather than
    // spinning retries against a request that will never succeed.
    SendOutcome::PermanentFail {
        code: code_str,
        message: api.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_core::domain::SendOutcome;

    fn api_err(http_status: u16, code: Option<i64>) -> ProviderApiError {
        ProviderApiError {
            http_status,
            code,
            subcode: None,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn spam_code_maps_to_spam_rate_limited() {
        let outcome = classify(&ClientError::Api(api_err(400, Some(131048))));
        assert_eq!(outcome, SendOutcome::SpamRateLimited);
    }

    #[test]
    fn auth_failure_is_campaign_fatal() {
        let outcome = classify(&ClientError::Api(api_err(401, None)));
        assert!(matches!(outcome, SendOutcome::CampaignFatal { .. }));
    }

    #[test]
    fn server_error_is_transient() {
        let outcome = classify(&ClientError::Api(api_err(503, None)));
        assert!(matches!(outcome, SendOutcome::TransientFail { .. }));
    }

    #[test]
    fn timeout_is_transient() {
        assert!(matches!(classify(&ClientError::Timeout), SendOutcome::TransientFail { .. }));
    }
}
