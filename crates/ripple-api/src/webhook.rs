use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use ripple_db::StoreError;

use crate::{ApiError, AppState, with_db};

type HmacSha256 = Hmac<Sha256>;

/// Identity-provider event, delivered signed. Only user lifecycle events
/// are acted on; everything else is acknowledged and dropped.
#[derive(Debug, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: IdentityEventData,
}

#[derive(Debug, Deserialize)]
pub struct IdentityEventData {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// The one unauthenticated write path: the identity provider pushes user
/// lifecycle events here, authenticated by an HMAC signature over the raw
/// body instead of a bearer token.
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let id = header_str(&headers, "svix-id").ok_or_else(ApiError::unauthorized)?;
    let timestamp = header_str(&headers, "svix-timestamp").ok_or_else(ApiError::unauthorized)?;
    let signature = header_str(&headers, "svix-signature").ok_or_else(ApiError::unauthorized)?;

    if !verify_signature(&state.webhook_secret, id, timestamp, &body, signature) {
        warn!("identity webhook signature verification failed");
        return Err(ApiError::unauthorized());
    }

    let event: IdentityEvent = serde_json::from_slice(&body)
        .map_err(|_| StoreError::Validation("malformed webhook payload".to_string()))?;

    match event.kind.as_str() {
        "user.created" | "user.updated" => {
            let data = event.data;
            let username = data
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::Validation("webhook event missing email".to_string())
                })?;

            let fullname = {
                let joined = format!(
                    "{} {}",
                    data.first_name.unwrap_or_default(),
                    data.last_name.unwrap_or_default()
                );
                let joined = joined.trim().to_string();
                (!joined.is_empty()).then_some(joined)
            };
            let image = data.image_url.unwrap_or_default();

            let user = with_db(state, move |db| {
                db.upsert_user_from_identity(&data.id, &username, fullname.as_deref(), &image, None)
            })
            .await?;

            info!("identity webhook provisioned {} ({})", user.username, user.id);
        }
        other => {
            info!("ignoring identity webhook event '{}'", other);
        }
    }

    Ok(StatusCode::OK)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Checks `signature_header` against HMAC-SHA256 over `{id}.{timestamp}.{payload}`.
/// The header may carry several space-separated versioned signatures from
/// key rotation; any valid v1 entry passes.
fn verify_signature(
    secret: &str,
    id: &str,
    timestamp: &str,
    payload: &[u8],
    signature_header: &str,
) -> bool {
    let key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let Ok(key) = B64.decode(key) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(&key) else {
        return false;
    };

    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    signature_header.split_whitespace().any(|candidate| {
        candidate
            .strip_prefix("v1,")
            .and_then(|sig| B64.decode(sig).ok())
            .is_some_and(|sig| mac.clone().verify_slice(&sig).is_ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, id: &str, timestamp: &str, payload: &[u8]) -> String {
        let key = B64.decode(secret.strip_prefix("whsec_").unwrap()).unwrap();
        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(format!("{id}.{timestamp}.").as_bytes());
        mac.update(payload);
        format!("v1,{}", B64.encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let secret = format!("whsec_{}", B64.encode(b"super-secret-key"));
        let payload = br#"{"type":"user.created"}"#;
        let header = sign(&secret, "msg_1", "1700000000", payload);

        assert!(verify_signature(&secret, "msg_1", "1700000000", payload, &header));
    }

    #[test]
    fn tampered_payload_fails() {
        let secret = format!("whsec_{}", B64.encode(b"super-secret-key"));
        let header = sign(&secret, "msg_1", "1700000000", br#"{"type":"user.created"}"#);

        assert!(!verify_signature(
            &secret,
            "msg_1",
            "1700000000",
            br#"{"type":"user.deleted"}"#,
            &header
        ));
    }

    #[test]
    fn later_rotation_entry_still_passes() {
        let secret = format!("whsec_{}", B64.encode(b"super-secret-key"));
        let payload = br#"{}"#;
        let good = sign(&secret, "msg_1", "1700000000", payload);
        let header = format!("v1,bm90LXRoZS1zaWduYXR1cmU= {good}");

        assert!(verify_signature(&secret, "msg_1", "1700000000", payload, &header));
    }
}
