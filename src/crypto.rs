//! Password hashing.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Argon2id password manager.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    ///
    /// Output is a PHC string embedding a fresh random salt and parameters.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// Parameters are read from the PHC itself; malformed values fail closed.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 64,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let pwd = cheap();
        let hash = pwd.hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("correct horse", &hash));
        assert!(!pwd.verify_password("battery staple", &hash));
    }

    #[test]
    fn test_salt_is_random() {
        let pwd = cheap();
        let first = pwd.hash_password("same").unwrap();
        let second = pwd.hash_password("same").unwrap();

        assert_ne!(first, second);
        assert!(pwd.verify_password("same", &second));
    }

    #[test]
    fn test_malformed_hash_fails_closed() {
        let pwd = cheap();

        assert!(!pwd.verify_password("anything", ""));
        assert!(!pwd.verify_password("anything", "not-a-phc-string"));
        assert!(!pwd.verify_password("anything", "$argon2id$v=19$broken"));
    }
}
