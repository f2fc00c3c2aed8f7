use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::digest::Key;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::DropError;

type HmacSha256 = Hmac<Sha256>;

/// how long an unlock token stays valid (seconds)
pub const UNLOCK_TTL_SECS: i64 = 24 * 60 * 60;

/// password hashing and share unlock tokens
pub trait Authenticator: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, DropError>;

    fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// signed token proving the holder unlocked `share_id`
    fn issue_unlock_token(&self, share_id: &str) -> String;

    fn validate_unlock_token(&self, share_id: &str, token: &str) -> bool;
}

/// argon2id password hashes + hmac-sha256 signed unlock tokens
pub struct PasswordAuth {
    // keyed once, cloned per signature
    mac: HmacSha256,
}

impl PasswordAuth {
    /// use the configured secret, or a random one (tokens then die with the process)
    pub fn new(secret: Option<&str>) -> Self {
        let configured = secret.filter(|s| !s.is_empty()).and_then(|s| {
            match HmacSha256::new_from_slice(s.as_bytes()) {
                Ok(mac) => Some(mac),
                Err(e) => {
                    tracing::warn!("Unusable COOKIE_SECRET, falling back to a random key: {}", e);
                    None
                }
            }
        });

        let mac = configured.unwrap_or_else(|| {
            let mut key = Key::<HmacSha256>::default();
            rand::thread_rng().fill_bytes(key.as_mut_slice());
            <HmacSha256 as Mac>::new(&key)
        });
        Self { mac }
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    fn sign(&self, value: &str) -> String {
        let mut mac = self.mac();
        mac.update(value.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn token_at(&self, share_id: &str, issued_at: i64) -> String {
        let value = format!("{}:{}", share_id, issued_at);
        let signature = self.sign(&value);
        format!("{}.{}", value, signature)
    }

    fn validate_at(&self, share_id: &str, token: &str, now: i64) -> bool {
        let Some((value, signature)) = token.rsplit_once('.') else {
            return false;
        };
        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(value.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        let Some((id, issued_at)) = value.split_once(':') else {
            return false;
        };
        let Ok(issued_at) = issued_at.parse::<i64>() else {
            return false;
        };

        id == share_id && now.saturating_sub(issued_at) <= UNLOCK_TTL_SECS && issued_at <= now.saturating_add(60)
    }

    /// build a token with an explicit issue time (unix seconds)
    pub fn issue_unlock_token_at(&self, share_id: &str, issued_at: i64) -> String {
        self.token_at(share_id, issued_at)
    }
}

impl Authenticator for PasswordAuth {
    fn hash_password(&self, password: &str) -> Result<String, DropError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| DropError::PasswordHash(e.to_string()))?;

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DropError::PasswordHash(e.to_string()))
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn issue_unlock_token(&self, share_id: &str) -> String {
        self.token_at(share_id, chrono::Utc::now().timestamp())
    }

    fn validate_unlock_token(&self, share_id: &str, token: &str) -> bool {
        self.validate_at(share_id, token, chrono::Utc::now().timestamp())
    }
}
