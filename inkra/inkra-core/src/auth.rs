//! Single-admin login: argon2 password hashes and HS256 bearer tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocError, Result};
use crate::store::DocumentStore;

pub const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Claims>;
}

pub struct Hs256Verifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256Verifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `subject` valid for [`TOKEN_TTL_SECS`].
    pub fn issue(&self, subject: &str) -> Result<String> {
        let iat = now_secs();
        self.issue_with(subject, iat, iat + TOKEN_TTL_SECS)
    }

    fn issue_with(&self, subject: &str, iat: u64, exp: u64) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DocError::storage("Could not issue token", e))
    }
}

#[async_trait]
impl TokenVerifier for Hs256Verifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .ok()
            .map(|d| d.claims)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DocError::storage("Could not hash password", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Check credentials against the settings row and issue a token.
pub fn login(
    store: &DocumentStore,
    tokens: &Hs256Verifier,
    email: &str,
    password: &str,
) -> Result<String> {
    let invalid = || DocError::Auth("Invalid credentials".into());
    let hash = store.password_hash(email)?.ok_or_else(invalid)?;
    if !verify_password(password, &hash) {
        return Err(invalid());
    }
    info!("Admin {} logged in", email);
    tokens.issue(email)
}

/// Provision the admin account if none exists yet. Returns whether it did.
pub fn ensure_admin(store: &DocumentStore, email: &str, password: &str) -> Result<bool> {
    if email.is_empty() || password.is_empty() {
        return Err(DocError::validation("Admin email and password are required"));
    }
    if store.is_initialized()? {
        return Ok(false);
    }
    let hash = hash_password(password)?;
    let created = store.init_credentials(email, &hash)?;
    if created {
        info!("Initialized admin account {}", email);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_verifies() {
        let tokens = Hs256Verifier::new("secret");
        let token = tokens.issue("admin@example.com").unwrap();
        let claims = tokens.verify(&token).await.unwrap();
        assert_eq!(claims.sub, "admin@example.com");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[tokio::test]
    async fn wrong_secret_and_expired_tokens_fail() {
        let tokens = Hs256Verifier::new("secret");
        let other = Hs256Verifier::new("other");
        let token = tokens.issue("a").unwrap();
        assert!(other.verify(&token).await.is_none());

        let now = now_secs();
        let expired = tokens.issue_with("a", now - 7200, now - 3600).unwrap();
        assert!(tokens.verify(&expired).await.is_none());
        assert!(tokens.verify("garbage").await.is_none());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn login_flow() {
        let store = DocumentStore::open_in_memory().unwrap();
        let tokens = Hs256Verifier::new("secret");
        assert!(matches!(
            login(&store, &tokens, "admin@example.com", "pw"),
            Err(DocError::Auth(_))
        ));

        assert!(ensure_admin(&store, "admin@example.com", "pw").unwrap());
        assert!(!ensure_admin(&store, "other@example.com", "pw2").unwrap());

        assert!(login(&store, &tokens, "admin@example.com", "pw").is_ok());
        assert!(matches!(
            login(&store, &tokens, "admin@example.com", "wrong"),
            Err(DocError::Auth(_))
        ));
        assert!(matches!(
            login(&store, &tokens, "other@example.com", "pw2"),
            Err(DocError::Auth(_))
        ));
    }
}
