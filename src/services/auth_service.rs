//! Bearer-token identity gate for the private file routes.
//!
//! Tokens are HS256 JWTs. Access is invite-only: tokens are minted from the
//! command line with `--issue-token` and handed to invited users.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TOKEN_ISSUER: &str = "photo-share";

/// Lifetime of an invite token.
pub const INVITE_TOKEN_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid or expired authorization token")]
    InvalidToken,
    #[error("token generation failed")]
    TokenGenerationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller of a private route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

/// Verifies (and, for invites, issues) bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token for `subject` valid for `lifetime`.
    pub fn issue(&self, subject: &str, lifetime: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenGenerationFailed)
    }

    /// Validate the raw value of an `Authorization` header.
    ///
    /// Accepts both `Bearer <token>` and the bare token.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Principal, AuthError> {
        let raw = header.map(str::trim).filter(|v| !v.is_empty());
        let Some(raw) = raw else {
            return Err(AuthError::MissingToken);
        };
        let token = match raw.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            // scheme with no token
            None if raw.eq_ignore_ascii_case("bearer") => "",
            _ => raw,
        };
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(Principal {
            subject: data.claims.sub,
        })
    }
}
