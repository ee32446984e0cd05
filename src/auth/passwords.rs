use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// One-way password hashing with a fresh random salt per call.
///
/// Hashing failures are fatal to the calling operation; verification of a
/// malformed or mismatched hash is an ordinary `false`.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(Self { argon2 })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// Constant-time verification against an encoded hash. A hash that does
    /// not parse verifies as `false` rather than erroring.
    pub fn verify_password(&self, password: &str, encoded: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(encoded) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_passwords() {
        let service = PasswordService::new().expect("password service");
        let hash = service
            .hash_password("super-secret")
            .expect("hash generation");
        assert!(service.verify_password("super-secret", &hash));
        assert!(!service.verify_password("wrong-password", &hash));
    }

    #[test]
    fn salts_make_hashes_unique() {
        let service = PasswordService::new().expect("password service");
        let first = service.hash_password("same-input").expect("first hash");
        let second = service.hash_password("same-input").expect("second hash");
        assert_ne!(first, second);
        assert!(service.verify_password("same-input", &first));
        assert!(service.verify_password("same-input", &second));
    }

    #[test]
    fn malformed_hash_verifies_false() {
        let service = PasswordService::new().expect("password service");
        assert!(!service.verify_password("anything", "not-a-phc-string"));
        assert!(!service.verify_password("anything", ""));
    }
}
