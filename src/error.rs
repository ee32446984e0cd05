use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::util::add_schema_response;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

/// Wire shape of every error response: `{"error": ..., "message": ...}`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::Auth(err) => {
                let status = err.status();
                let error_type = match status.code {
                    401 => "AuthenticationError",
                    403 => "AuthorizationError",
                    _ => {
                        log::error!("auth error: {}", err);
                        "InternalError"
                    }
                };
                (status, error_type, err.to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::Conflict(msg) => {
                log::debug!("conflict: {}", msg);
                (Status::Conflict, "Conflict", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
        };

        let body = ErrorBody::new(error_type, message);
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string()
        });

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        let schema = generator.json_schema::<ErrorBody>();
        for status in [400, 401, 403, 404, 409, 500] {
            add_schema_response(&mut responses, status, "application/json", schema.clone())?;
        }
        Ok(responses)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::Conflict("email already registered".into()),
            StoreError::Backend(msg) => ApiError::InternalError(msg),
        }
    }
}

/// JSON responder that answers with `201 Created` instead of `200 OK`.
pub struct CreatedJson<T>(pub T);

impl<'r, T: Serialize> Responder<'r, 'static> for CreatedJson<T> {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let json = serde_json::to_string(&self.0).map_err(|err| {
            log::error!("failed to serialize response: {}", err);
            Status::InternalServerError
        })?;

        Response::build()
            .status(Status::Created)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl<T: Serialize + JsonSchema + Send> OpenApiResponderInner for CreatedJson<T> {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        let schema = generator.json_schema::<T>();
        add_schema_response(&mut responses, 201, "application/json", schema)?;
        Ok(responses)
    }
}
