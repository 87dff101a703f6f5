//! Basic HTTP credential verification for the provider's callbacks.
//! Runs before dispatch; on failure the state machines are never
//! invoked and the caller gets the INVALID_ACCESS_DATA envelope.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::MerchantError;

/// The login/key pair issued by the provider for this merchant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub key: String,
}

pub fn verify(headers: &HeaderMap, credentials: &Credentials) -> Result<(), MerchantError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(MerchantError::InvalidAccessData)?;

    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(MerchantError::InvalidAccessData)?;

    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(MerchantError::InvalidAccessData)?;

    let (login, key) = decoded
        .split_once(':')
        .ok_or(MerchantError::InvalidAccessData)?;

    if login == credentials.login && key == credentials.key {
        Ok(())
    } else {
        Err(MerchantError::InvalidAccessData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            login: "Paycom".to_string(),
            key: "secret-key".to_string(),
        }
    }

    fn basic_header(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(raw));
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn accepts_matching_credentials() {
        let headers = basic_header("Paycom:secret-key");
        assert!(verify(&headers, &credentials()).is_ok());
    }

    #[test]
    fn rejects_wrong_key() {
        let headers = basic_header("Paycom:wrong");
        assert_eq!(
            verify(&headers, &credentials()).unwrap_err(),
            MerchantError::InvalidAccessData
        );
    }

    #[test]
    fn rejects_missing_header() {
        assert_eq!(
            verify(&HeaderMap::new(), &credentials()).unwrap_err(),
            MerchantError::InvalidAccessData
        );
    }

    #[test]
    fn rejects_non_basic_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer token".parse().unwrap());
        assert_eq!(
            verify(&headers, &credentials()).unwrap_err(),
            MerchantError::InvalidAccessData
        );
    }
}
