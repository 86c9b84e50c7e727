//! Inbound Meta webhook envelope, subscription handshake and signatures.

use hmac::{Hmac, Mac};
use pulsecrm_types::conversation::Channel;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Generic shape shared by WhatsApp, Instagram and Messenger webhooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Option<Vec<serde_json::Value>>,
}

/// Sender and text pulled out of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub sender: String,
    pub content: String,
}

impl InboundEnvelope {
    pub fn from_value(payload: &serde_json::Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_default()
    }

    pub fn channel(&self) -> Channel {
        match self.object.as_deref() {
            Some("whatsapp_business_account") => Channel::Whatsapp,
            Some("instagram") => Channel::Instagram,
            Some("page") => Channel::Messenger,
            _ => Channel::Unknown,
        }
    }

    /// Platform-specific parsing is not performed: the sender is reported as
    /// `unknown` with empty content, and the raw payload is kept for
    /// downstream normalisers.
    pub fn extract_message(&self) -> ExtractedMessage {
        ExtractedMessage {
            sender: "unknown".to_string(),
            content: String::new(),
        }
    }
}

pub fn detect_channel(payload: &serde_json::Value) -> Channel {
    InboundEnvelope::from_value(payload).channel()
}

/// Answer Meta's `hub.mode=subscribe` handshake.
///
/// Returns the challenge to echo back when the token matches.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if mode != Some("subscribe") {
        return None;
    }
    let token = token?;
    if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        return None;
    }
    Some(challenge.unwrap_or_default().to_string())
}

/// Check `X-Hub-Signature-256` (`sha256=<hex>`) against the raw body.
///
/// An empty app secret disables verification.
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: Option<&str>) -> bool {
    if app_secret.is_empty() {
        return true;
    }
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn channel_detection() {
        assert_eq!(
            detect_channel(&json!({"object": "whatsapp_business_account", "entry": []})),
            Channel::Whatsapp
        );
        assert_eq!(detect_channel(&json!({"object": "instagram"})), Channel::Instagram);
        assert_eq!(detect_channel(&json!({"object": "page"})), Channel::Messenger);
        assert_eq!(detect_channel(&json!({"object": "telegram"})), Channel::Unknown);
        assert_eq!(detect_channel(&json!([1, 2, 3])), Channel::Unknown);
    }

    #[test]
    fn generic_extraction() {
        let env = InboundEnvelope::from_value(&json!({"object": "page", "entry": [{"id": "1"}]}));
        let msg = env.extract_message();
        assert_eq!(msg.sender, "unknown");
        assert!(msg.content.is_empty());
    }

    #[test]
    fn subscription_handshake() {
        let ok = verify_subscription(Some("subscribe"), Some("tok"), Some("12345"), Some("tok"));
        assert_eq!(ok.as_deref(), Some("12345"));
        assert!(verify_subscription(Some("subscribe"), Some("bad"), Some("1"), Some("tok")).is_none());
        assert!(verify_subscription(Some("unsubscribe"), Some("tok"), Some("1"), Some("tok")).is_none());
        assert!(verify_subscription(Some("subscribe"), Some(""), Some("1"), None).is_none());
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"object":"page"}"#;
        let header = sign("app-secret", body);
        assert!(verify_signature("app-secret", body, Some(&header)));
        assert!(!verify_signature("other", body, Some(&header)));
        assert!(!verify_signature("app-secret", body, None));
        assert!(!verify_signature("app-secret", body, Some("sha256=zz")));
        assert!(verify_signature("", body, None));
    }
}
