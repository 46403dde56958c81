//! Handshake token verification.
//!
//! Session issuance lives elsewhere; this server only consumes an opaque
//! bearer credential and turns it into an [`Identity`]. The production
//! verifier checks the HMAC-signed session JWT minted by the auth service;
//! tests swap in [`StaticVerifier`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use surge_core::Identity;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential in the handshake.
    #[error("Authentication required")]
    MissingCredential,

    /// The credential did not verify.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The verifier itself failed.
    #[error("Token verifier unavailable")]
    VerifierUnavailable,
}

/// Opaque credential → identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the verifier is down.
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Extract the bearer credential from the handshake: the `token` query
/// parameter (auth payload) is preferred, an `Authorization: Bearer` header
/// is the fallback.
#[must_use]
pub fn bearer_token(params: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = params.get("token") {
        if !token.is_empty() {
            return Some(token.clone());
        }
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Claims carried by the session JWT.
#[derive(Debug, Deserialize)]
struct SessionClaims {
    /// Subject, the user id.
    sub: String,
    /// The user's wallet address.
    wallet: String,
    /// Expiration (unix timestamp). Enforced by validation.
    #[allow(dead_code)]
    exp: i64,
}

/// Verifies HMAC-signed session JWTs.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(Identity {
            user_id: data.claims.sub,
            wallet_address: data.claims.wallet,
        })
    }
}

/// A fixed token table, for tests and local development.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        wallet: &'a str,
        exp: i64,
    }

    fn mint(secret: &str, sub: &str, wallet: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &TestClaims { sub, wallet, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_bearer_token_prefers_query_param() {
        let mut params = HashMap::new();
        params.insert("token".to_string(), "from-query".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());

        assert_eq!(
            bearer_token(&params, &headers),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn test_bearer_token_header_fallback() {
        let params = HashMap::new();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());

        assert_eq!(
            bearer_token(&params, &headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn test_bearer_token_absent() {
        assert_eq!(bearer_token(&HashMap::new(), &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_jwt_verifier_accepts_valid_token() {
        let verifier = JwtVerifier::new("secret");
        let future_exp = chrono_like_now() + 3600;
        let token = mint("secret", "u1", "0xABC", future_exp);

        let identity = verifier.verify(&token).await.unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.wallet_address, "0xABC");
    }

    #[tokio::test]
    async fn test_jwt_verifier_rejects_bad_signature() {
        let verifier = JwtVerifier::new("secret");
        let token = mint("other-secret", "u1", "0xABC", chrono_like_now() + 3600);

        assert!(matches!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_jwt_verifier_rejects_expired_token() {
        let verifier = JwtVerifier::new("secret");
        let token = mint("secret", "u1", "0xABC", chrono_like_now() - 3600);

        assert!(matches!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticVerifier::new().with_token(
            "tok",
            Identity {
                user_id: "u1".to_string(),
                wallet_address: "0xABC".to_string(),
            },
        );

        assert!(verifier.verify("tok").await.is_ok());
        assert!(verifier.verify("nope").await.is_err());
    }

    fn chrono_like_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}
