//! Session token claims
//!
//! The platform issues JWTs. Only the `iat` and `exp` claims matter to the
//! session layer and the signature is never verified client-side.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Validity window of a token, in seconds since the UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Issued-at
    pub iat: i64,
    /// Expiry
    pub exp: i64,
}

impl TokenClaims {
    /// Instant halfway through the validity window, in seconds
    ///
    /// Rounds down and never overflows, whatever the claims hold.
    pub fn half_life(&self) -> i64 {
        let midpoint = (i128::from(self.iat) + i128::from(self.exp)).div_euclid(2);
        // lies between iat and exp
        i64::try_from(midpoint).unwrap_or(self.iat)
    }
}

/// The token could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenFormatError {
    /// Not three dot-separated segments
    #[error("token is not a three-part JWT")]
    Malformed,

    /// Payload segment is not base64url
    #[error("failed to decode token payload: {0}")]
    Encoding(String),

    /// Payload lacks numeric `iat`/`exp`
    #[error("failed to parse token claims: {0}")]
    Claims(String),

    /// `exp` precedes `iat`
    #[error("token expires ({exp}) before it was issued ({iat})")]
    InvertedWindow { iat: i64, exp: i64 },
}

/// Extracts validity claims from an opaque bearer token
pub trait TokenDecoder: Send + Sync {
    /// Read the validity window of `token`
    fn decode(&self, token: &str) -> Result<TokenClaims, TokenFormatError>;
}

/// Reads claims from the unverified payload segment of a JWT
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtClaimsDecoder;

impl TokenDecoder for JwtClaimsDecoder {
    fn decode(&self, token: &str) -> Result<TokenClaims, TokenFormatError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenFormatError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|err| TokenFormatError::Encoding(err.to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|err| TokenFormatError::Claims(err.to_string()))?;

        if claims.exp < claims.iat {
            return Err(TokenFormatError::InvertedWindow { iat: claims.iat, exp: claims.exp });
        }
        Ok(claims)
    }
}

/// A token together with its decoded validity window
///
/// The two are only ever replaced together.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    token: String,
    claims: TokenClaims,
}

impl IssuedToken {
    /// Pair a token with its already decoded claims
    pub fn new(token: impl Into<String>, claims: TokenClaims) -> Self {
        Self { token: token.into(), claims }
    }

    /// Raw bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decoded validity window
    pub fn claims(&self) -> TokenClaims {
        self.claims
    }

    /// Issue time in seconds
    pub fn issued_at(&self) -> i64 {
        self.claims.iat
    }

    /// Expiry in seconds
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("issued_at", &self.claims.iat)
            .field("expires_at", &self.claims.exp)
            .finish()
    }
}
