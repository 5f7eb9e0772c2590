use crate::{CoreError, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;

/// Tokens are considered expired this long before their `exp` claim
pub const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Compact three-segment bearer token with its decoded expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Parse a compact token, extracting `exp` from the claim segment.
    ///
    /// Fails unless the token has exactly three dot-separated segments and
    /// the middle one decodes to a JSON object with an integer `exp`.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(CoreError::MalformedToken(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        }

        let claims_bytes = URL_SAFE_LENIENT
            .decode(segments[1])
            .or_else(|_| STANDARD_LENIENT.decode(segments[1]))
            .map_err(|e| CoreError::MalformedToken(format!("claim segment: {}", e)))?;

        let claims: Claims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| CoreError::MalformedToken(format!("claim set: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| CoreError::MalformedToken(format!("exp out of range: {}", claims.exp)))?;

        Ok(AccessToken { raw, expires_at })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid iff `now < expires_at - EXPIRY_BUFFER_SECS`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECS)
    }

    /// Validity check on a raw string; anything unparseable counts as expired
    pub fn raw_is_valid_at(raw: &str, now: DateTime<Utc>) -> bool {
        AccessToken::parse(raw)
            .map(|token| token.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Leading characters of the token, safe to put in logs
    pub fn preview(&self) -> &str {
        let end = self
            .raw
            .char_indices()
            .nth(20)
            .map(|(i, _)| i)
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("raw", &format_args!("{}...", self.preview()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn make_raw_token(exp: i64) -> String {
    let header = URL_SAFE_LENIENT.encode(br#"{"alg":"ES256","typ":"JWT"}"#);
    let claims = URL_SAFE_LENIENT.encode(format!(r#"{{"sub":"w","exp":{}}}"#, exp));
    format!("{}.{}.c2lnbmF0dXJl", header, claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extracts_expiry() {
        let raw = make_raw_token(1_900_000_000);
        let token = AccessToken::parse(raw.clone()).unwrap();
        assert_eq!(token.as_str(), raw);
        assert_eq!(token.expires_at().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();

        let fresh = AccessToken::parse(make_raw_token(now.timestamp() + 600)).unwrap();
        assert!(fresh.is_valid_at(now));

        // Inside the 300 second buffer
        let nearly = AccessToken::parse(make_raw_token(now.timestamp() + 60)).unwrap();
        assert!(!nearly.is_valid_at(now));

        let past = AccessToken::parse(make_raw_token(now.timestamp() - 10)).unwrap();
        assert!(!past.is_valid_at(now));
    }

    #[test]
    fn test_two_segments_rejected() {
        let now = Utc::now();
        let raw = make_raw_token(now.timestamp() + 3600);
        let truncated: String = raw.rsplitn(2, '.').nth(1).unwrap().to_string();

        assert!(AccessToken::parse(truncated.clone()).is_err());
        assert!(!AccessToken::raw_is_valid_at(&truncated, now));
    }

    #[test]
    fn test_undecodable_claims_rejected() {
        assert!(AccessToken::parse("aaa.!!!.ccc").is_err());
        assert!(AccessToken::parse("aaa.bm90LWpzb24.ccc").is_err());
        assert!(!AccessToken::raw_is_valid_at("aaa.!!!.ccc", Utc::now()));
    }

    #[test]
    fn test_padded_standard_claims_accepted() {
        let claims = base64::engine::general_purpose::STANDARD.encode(br#"{"exp":1900000000}"#);
        let token = AccessToken::parse(format!("h.{}.s", claims)).unwrap();
        assert_eq!(token.expires_at().timestamp(), 1_900_000_000);
    }

    proptest::proptest! {
        #[test]
        fn prop_validity_matches_buffer(offset in -10_000i64..10_000) {
            let now = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
            let token = AccessToken::parse(make_raw_token(now.timestamp() + offset)).unwrap();
            proptest::prop_assert_eq!(token.is_valid_at(now), offset > EXPIRY_BUFFER_SECS);
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::parse(make_raw_token(1_900_000_000)).unwrap();
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains(token.as_str()));
    }
}
