//! Authentication module: configuration, credential handling, token minting,
//! Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod passwords;
pub mod responses;
pub mod routes;
pub mod tokens;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, GateRejection, RequireAdmin};
pub use passwords::PasswordService;
pub use responses::Role;
pub use tokens::{TokenPurpose, TokenService};

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub token_service: Arc<TokenService>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        token_service: TokenService,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            token_service: Arc::new(token_service),
        }
    }
}
