use hmac::{Hmac, Mac};
use jit_core::{AppError, AppResult};
use sha2::Sha256;

/// Request timestamp header set by the chat platform.
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
/// Request signature header set by the chat platform.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Accepted clock skew between the platform and this service.
pub const MAX_SKEW_SECONDS: i64 = 300;

const VERSION: &str = "v0";

/// Verifies `v0=<hex(HMAC-SHA256(secret, "v0:" + timestamp + ":" + body))>`.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_unix: i64,
) -> AppResult<()> {
    let sent_at = timestamp
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized("malformed request timestamp".to_owned()))?;
    if now_unix.abs_diff(sent_at) > MAX_SKEW_SECONDS.unsigned_abs() {
        return Err(AppError::Unauthorized(
            "request timestamp outside the accepted window".to_owned(),
        ));
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|encoded| hex::decode(encoded).ok())
        .ok_or_else(|| AppError::Unauthorized("malformed request signature".to_owned()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|error| AppError::Internal(format!("invalid signing secret: {error}")))?;
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.trim().as_bytes());
    mac.update(b":");
    mac.update(body);

    mac.verify_slice(&provided)
        .map_err(|_| AppError::Unauthorized("request signature mismatch".to_owned()))
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
    mac.update(format!("{VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}
