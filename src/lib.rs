#[macro_use]
extern crate rocket;

pub mod auth;
pub mod catchers;
pub mod error;
pub mod rate_limit;
pub mod request_logger;
pub mod routes;
pub mod store;

use std::sync::{Arc, Once};

use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};

use crate::auth::{AuthConfig, AuthState, PasswordService, Role, TokenService};
use crate::rate_limit::{RateLimitConfig, RateLimitHeaders, RateLimitState};
use crate::request_logger::RequestLogger;
use crate::store::{MemoryUserStore, NewUser, SharedUserStore};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// All API routes, mounted under `/api/v1`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Session routes
        auth::routes::register,
        auth::routes::login,
        auth::routes::refresh,
        auth::routes::logout,
        auth::routes::me,
        // User administration routes
        routes::users::list_users,
        routes::users::update_user_role,
        routes::users::set_user_active,
        routes::users::delete_user,
    ]
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(cors)
        .attach(RateLimitHeaders)
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("invalid auth configuration: {}", err);
                    return Err(rocket);
                }
            };
            let password_service = match PasswordService::new() {
                Ok(service) => service,
                Err(err) => {
                    log::error!("failed to initialize password hashing: {}", err);
                    return Err(rocket);
                }
            };
            let token_service = match TokenService::from_config(&config) {
                Ok(service) => service,
                Err(err) => {
                    log::error!("failed to initialize token service: {}", err);
                    return Err(rocket);
                }
            };
            Ok(rocket.manage(AuthState::new(config, password_service, token_service)))
        }))
        .attach(AdHoc::on_ignite("User Store", |rocket| async move {
            let store: SharedUserStore = Arc::new(MemoryUserStore::new());
            rocket.manage(store)
        }))
        .attach(AdHoc::on_ignite("Rate Limit State", |rocket| async move {
            rocket.manage(RateLimitState::new(RateLimitConfig::from_env()))
        }))
        // Create the first super admin account if configured and absent
        .attach(AdHoc::try_on_ignite(
            "Seed Admin Account",
            |rocket| async move {
                let email = std::env::var("CESIZEN_ADMIN_EMAIL").ok();
                let password = std::env::var("CESIZEN_ADMIN_PASSWORD").ok();
                let (Some(email), Some(password)) = (email, password) else {
                    return Ok(rocket);
                };

                let auth = rocket.state::<AuthState>().cloned();
                let store = rocket.state::<SharedUserStore>().cloned();
                let (Some(auth), Some(store)) = (auth, store) else {
                    log::error!("auth state or user store not available for admin seeding");
                    return Err(rocket);
                };

                match store.find_by_email(&email).await {
                    Ok(Some(_)) => Ok(rocket),
                    Ok(None) => {
                        let password_hash = match auth.password_service.hash_password(&password) {
                            Ok(hash) => hash,
                            Err(err) => {
                                log::error!("failed to hash admin password: {}", err);
                                return Err(rocket);
                            }
                        };
                        match store
                            .insert(NewUser {
                                first_name: "Admin".into(),
                                last_name: "Account".into(),
                                email,
                                password_hash,
                                role: Role::SuperAdmin,
                            })
                            .await
                        {
                            Ok(record) => {
                                log::info!("seeded admin account {}", record.id);
                                Ok(rocket)
                            }
                            Err(err) => {
                                log::error!("failed to seed admin account: {}", err);
                                Err(rocket)
                            }
                        }
                    }
                    Err(err) => {
                        log::error!("admin seeding lookup failed: {}", err);
                        Err(rocket)
                    }
                }
            },
        ))
        // Periodically drop rate limiter entries that no longer matter
        .attach(AdHoc::on_liftoff("Rate Limit Sweeper", |rocket| {
            Box::pin(async move {
                if let Some(state) = rocket.state::<RateLimitState>() {
                    let limiter = state.limiter.clone();
                    let max_window = state.config.max_window();
                    tokio::spawn(async move {
                        let mut ticker =
                            tokio::time::interval(std::time::Duration::from_secs(60));
                        loop {
                            ticker.tick().await;
                            limiter.sweep(max_window);
                        }
                    });
                } else {
                    log::error!("failed to start rate limit sweeper: state not found");
                }
            })
        }))
        .register("/", catchers::all())
        .mount("/api/v1", api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("CESIZen API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket};

    use crate::auth::{AuthConfig, AuthState, PasswordService, TokenService};
    use crate::rate_limit::{RateLimitConfig, RateLimitHeaders, RateLimitState};
    use crate::store::{MemoryUserStore, SharedUserStore};

    /// Auth configuration with a fixed secret and the default TTLs.
    pub fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-suite-secret".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604800,
            access_cookie_name: "access_token".into(),
            cookie_domain: None,
            cookie_secure: false,
        }
    }

    /// Rate limiting switched off, for tests that exercise other behavior.
    pub fn rate_limit_disabled() -> RateLimitConfig {
        RateLimitConfig {
            api_limit: 1000,
            api_window_secs: 3600,
            auth_limit: 10,
            auth_window_secs: 900,
            block_secs: 600,
            disabled: true,
        }
    }

    /// Builder for constructing Rocket instances tailored for integration
    /// tests. State is managed directly rather than read from the
    /// environment, so tests do not interfere with each other.
    pub struct TestRocketBuilder {
        figment: Figment,
        auth_config: AuthConfig,
        rate_limit_config: RateLimitConfig,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging
        /// disabled, rate limiting disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                auth_config: auth_config(),
                rate_limit_config: rate_limit_disabled(),
            }
        }

        pub fn with_auth_config(mut self, config: AuthConfig) -> Self {
            self.auth_config = config;
            self
        }

        pub fn with_rate_limit_config(mut self, config: RateLimitConfig) -> Self {
            self.rate_limit_config = config;
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let password_service = PasswordService::new().expect("password service");
            let token_service =
                TokenService::from_config(&self.auth_config).expect("token service");
            let auth_state = AuthState::new(self.auth_config, password_service, token_service);
            let store: SharedUserStore = Arc::new(MemoryUserStore::new());

            rocket::custom(self.figment)
                .attach(RateLimitHeaders)
                .manage(auth_state)
                .manage(store)
                .manage(RateLimitState::new(self.rate_limit_config))
                .register("/", crate::catchers::all())
                .mount("/api/v1", crate::api_routes())
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
