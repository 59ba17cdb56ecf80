//! Cookie parsing and signed-cookie verification.
//!
//! Signed cookies use the explicit form `s:<value>.<signature>` where the
//! signature is the URL-safe base64 of `SHA-256(secret "." value)`.
//! Verification uses a constant-time comparison; a mismatch raises
//! `INVALID_COOKIE_SIGNATURE`. Unsigned cookies pass through untouched.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use weave_core::error::Failure;

const SIGNED_PREFIX: &str = "s:";

/// Parse a `Cookie` header into name/value pairs.
pub(crate) fn parse_cookie_header(header: Option<&str>) -> HashMap<String, String> {
    let Some(header) = header else {
        return HashMap::new();
    };
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Sign a cookie value with the given secret.
#[must_use]
pub fn sign_value(secret: &str, value: &str) -> String {
    format!("{SIGNED_PREFIX}{value}.{}", signature(secret, value))
}

/// Verify one raw cookie value. Returns the embedded value for a valid
/// signed cookie, the input unchanged for an unsigned cookie, and `None`
/// for a bad signature.
#[must_use]
pub fn verify_value(secret: &str, raw: &str) -> Option<String> {
    let Some(signed) = raw.strip_prefix(SIGNED_PREFIX) else {
        return Some(raw.to_string());
    };
    let (value, sig) = signed.rsplit_once('.')?;
    let expected = signature(secret, value);
    if constant_time_eq(sig.as_bytes(), expected.as_bytes()) {
        Some(value.to_string())
    } else {
        None
    }
}

/// Verify every cookie in the map, replacing signed values with their
/// embedded payloads.
pub(crate) fn verify_cookies(
    cookies: &HashMap<String, String>,
    secret: &str,
) -> Result<HashMap<String, String>, Failure> {
    let mut verified = HashMap::with_capacity(cookies.len());
    for (name, raw) in cookies {
        match verify_value(secret, raw) {
            Some(value) => {
                verified.insert(name.clone(), value);
            }
            None => return Err(Failure::invalid_cookie_signature(name)),
        }
    }
    Ok(verified)
}

fn signature(secret: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(value.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn header_parsing_splits_pairs() {
        let cookies = parse_cookie_header(Some("session=abc; theme=dark"));
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
        assert!(parse_cookie_header(None).is_empty());
    }

    #[test]
    fn signed_round_trip() {
        let signed = sign_value("secret", "user-1");
        assert!(signed.starts_with("s:user-1."));
        assert_eq!(verify_value("secret", &signed).as_deref(), Some("user-1"));
    }

    #[test]
    fn tampered_value_fails_verification() {
        let signed = sign_value("secret", "user-1").replace("user-1", "user-2");
        assert_eq!(verify_value("secret", &signed), None);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signed = sign_value("secret", "user-1");
        assert_eq!(verify_value("other", &signed), None);
    }

    #[test]
    fn unsigned_values_pass_through() {
        assert_eq!(verify_value("secret", "plain").as_deref(), Some("plain"));
    }

    #[test]
    fn map_verification_names_the_bad_cookie() {
        let mut cookies = HashMap::new();
        cookies.insert("session".to_string(), "s:user-1.bogus".to_string());
        let failure = verify_cookies(&cookies, "secret").unwrap_err();
        assert_eq!(failure.code, weave_core::ErrorCode::InvalidCookieSignature);
        assert!(failure.message.contains("session"));
    }
}
