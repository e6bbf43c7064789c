//! Account registration and sign-in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{NewProfile, NewUser, Role, UserRepository, normalize_email};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::token::{EXPIRATION_TIME, TokenManager};

const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email."))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must contain 8 to 128 characters."))]
    pub password: String,
    pub role: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Registered {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::InvalidInput(format!("{field} is required")))
}

/// Identity operations.
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    pwd: PasswordManager,
    token: TokenManager,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        pwd: PasswordManager,
        token: TokenManager,
    ) -> Self {
        Self { repo, pwd, token }
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repo
    }

    /// Create an organizer or participant account.
    pub async fn register(&self, req: RegisterRequest) -> Result<Registered> {
        let role: Role = req.role.trim().to_lowercase().parse()?;
        let profile = match role {
            Role::Organizer => NewProfile::Organizer {
                name: required(req.name, "name")?,
            },
            Role::Participant => NewProfile::Participant {
                first_name: required(req.first_name, "firstName")?,
                last_name: required(req.last_name, "lastName")?,
            },
            Role::Admin => {
                return Err(ServerError::InvalidInput(
                    "role must be organizer or participant".into(),
                ));
            },
        };

        let email = normalize_email(&req.email);
        if self.repo.find_by_email(&email).await?.is_some() {
            return Err(ServerError::Conflict("email is already registered".into()));
        }

        let password_hash = self.pwd.hash_password(&req.password)?;
        let id = self
            .repo
            .create(&NewUser {
                email: email.clone(),
                password_hash,
                profile,
            })
            .await?;

        tracing::info!(user_id = id, %role, "account created");

        Ok(Registered { id, email, role })
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown, blocked and wrong-password attempts are indistinguishable.
    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        let email = normalize_email(&req.email);
        let Some(user) = self.repo.find_by_email(&email).await? else {
            return Err(ServerError::Unauthorized);
        };

        if user.is_blocked || !self.pwd.verify_password(&req.password, &user.password_hash) {
            tracing::debug!(user_id = user.id, "login refused");
            return Err(ServerError::Unauthorized);
        }

        let token = self.token.create(user.id, &user.email, &user.roles)?;

        Ok(Session {
            token,
            token_type: TOKEN_TYPE.to_owned(),
            expires_in: EXPIRATION_TIME,
        })
    }

    /// Give the admin role to an existing account.
    pub async fn grant_admin(&self, email: &str) -> Result<i64> {
        let email = normalize_email(email);
        let user = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(ServerError::NotFound)?;

        self.repo.add_role(user.id, Role::Admin).await?;
        tracing::info!(user_id = user.id, "admin role granted");

        Ok(user.id)
    }
}
