use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL_SAFE},
    Engine,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid base64 secret: {0}")]
    InvalidSecret(#[from] base64::DecodeError),

    #[error("HMAC computation failed: {0}")]
    HmacError(String),
}

/// L2 API credentials for the CLOB REST API.
#[derive(Debug, Clone)]
pub struct ClobAuth {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ClobAuth {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// HMAC-SHA256 over `{timestamp}{method}{path}{body}`, keyed by the
    /// base64-decoded secret. Secrets are issued URL-safe but older keys
    /// use standard base64, so both alphabets are accepted.
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<String, AuthError> {
        let secret_bytes = BASE64_URL_SAFE
            .decode(&self.api_secret)
            .or_else(|_| BASE64.decode(&self.api_secret))?;

        let message = format!("{timestamp}{method}{path}{body}");

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| AuthError::HmacError(e.to_string()))?;
        mac.update(message.as_bytes());

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_produces_base64_output() {
        let secret = BASE64.encode(b"test-secret-key-1234");
        let auth = ClobAuth::new("key".into(), secret, "pass".into());

        let sig = auth.sign("1700000000", "GET", "/balance-allowance", "").unwrap();

        assert!(BASE64.decode(&sig).is_ok());
        // 32 HMAC bytes encode to 44 base64 chars
        assert_eq!(sig.len(), 44);
    }

    #[test]
    fn signature_depends_on_path() {
        let secret = BASE64.encode(b"test-secret-key-1234");
        let auth = ClobAuth::new("key".into(), secret, "pass".into());

        let a = auth.sign("1700000000", "GET", "/book", "").unwrap();
        let b = auth.sign("1700000000", "GET", "/balance-allowance", "").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_non_base64_secret() {
        let auth = ClobAuth::new("key".into(), "not!base64?".into(), "pass".into());
        assert!(auth.sign("1", "GET", "/", "").is_err());
    }
}
