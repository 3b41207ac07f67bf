use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the `X-Hub-Signature-256: sha256=<hex>` header WhatsApp sends on
/// every webhook delivery, against one candidate `app_secret`.
pub fn verify(header_value: &str, body: &[u8], app_secret: &str) -> bool {
    let Some(sig_hex) = header_value.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let expected_hex = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    expected_hex == sig_hex.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_correctly_signed_body() {
        let secret = "shh";
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();
        let header = format!("sha256={digest}");
        assert!(verify(&header, body, secret));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let secret = "shh";
        let header = "sha256=0000000000000000000000000000000000000000000000000000000000000000";
        assert!(!verify(header, b"tampered", secret));
    }

    #[test]
    fn rejects_a_header_missing_the_prefix() {
        assert!(!verify("abcdef", b"body", "secret"));
    }
}
