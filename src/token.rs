//! Manage json web tokens.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::user::Role;

pub const EXPIRATION_TIME: i64 = 60 * 60 * 24; // 24 hours.

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: i64,
    /// Identifies the time at which the JWT was issued.
    pub iat: i64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Account email at issuance.
    pub email: String,
    /// Roles at issuance. Never refreshed until expiry.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Claims {
    /// Numeric user ID.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with HMAC SHA-256.
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
        }
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(
        &self,
        user_id: i64,
        email: &str,
        roles: &[Role],
    ) -> jsonwebtoken::errors::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            aud: self.audience.clone(),
            exp: now + EXPIRATION_TIME,
            iat: now,
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            email: email.to_owned(),
            roles: roles.to_vec(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}
