// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing and session-token issuance.
//!
//! Passwords are hashed with Argon2id (salted PHC strings). Session tokens
//! are HS256 JWTs carrying the user ID in `sub` and the token kind in `typ`.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Bad signature, malformed token, wrong kind, or expired.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Which of the two session tokens a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Token kind
    pub typ: TokenKind,
}

/// Access + refresh token pair returned on login.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: String,
    pub kind: TokenKind,
}

/// Credential service. Pure computation, no I/O.
#[derive(Clone)]
pub struct CredentialService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialService {
    pub fn new(signing_key: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            access_ttl,
            refresh_ttl,
        }
    }

    // ─── Passwords ───────────────────────────────────────────────

    /// Hash a password with a fresh random salt.
    pub fn hash_password(&self, plaintext: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Check a password against a stored hash. Unparseable hashes never match.
    pub fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            tracing::warn!("Stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    // ─── Tokens ──────────────────────────────────────────────────

    pub fn issue_access_token(&self, user_id: &str) -> Result<String, CredentialError> {
        self.issue(user_id, TokenKind::Access, self.access_ttl)
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, CredentialError> {
        self.issue(user_id, TokenKind::Refresh, self.refresh_ttl)
    }

    pub fn issue_tokens(&self, user_id: &str) -> Result<TokenPair, CredentialError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id)?,
            refresh_token: self.issue_refresh_token(user_id)?,
        })
    }

    fn issue(&self, user_id: &str, kind: TokenKind, ttl: Duration) -> Result<String, CredentialError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CredentialError::Signing(e.to_string()))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as usize,
            typ: kind,
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, CredentialError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    /// Verify signature and expiry; any failure is `InvalidToken`.
    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| CredentialError::InvalidToken)?;

        if data.claims.sub.is_empty() {
            return Err(CredentialError::InvalidToken);
        }

        Ok(VerifiedToken {
            user_id: data.claims.sub,
            kind: data.claims.typ,
        })
    }
}
