//! JSON error catchers. Every error that bubbles past a handler comes
//! out as the same `{"error", "message"}` shape the handlers produce.

use rocket::serde::json::Json;
use rocket::{Catcher, Request};

use crate::auth::GateRejection;
use crate::error::ErrorBody;
use crate::rate_limit::guards::RateLimitDecision;

#[catch(400)]
fn bad_request() -> Json<ErrorBody> {
    Json(ErrorBody::new("BadRequest", "malformed request"))
}

#[catch(401)]
fn unauthorized(request: &Request<'_>) -> Json<ErrorBody> {
    let rejection = request.local_cache(|| GateRejection(None));
    let message = rejection
        .0
        .clone()
        .unwrap_or_else(|| "authentication required".to_string());
    Json(ErrorBody::new("AuthenticationError", message))
}

#[catch(403)]
fn forbidden(request: &Request<'_>) -> Json<ErrorBody> {
    let rejection = request.local_cache(|| GateRejection(None));
    let message = rejection
        .0
        .clone()
        .unwrap_or_else(|| "insufficient privileges".to_string());
    Json(ErrorBody::new("AuthorizationError", message))
}

#[catch(404)]
fn not_found(request: &Request<'_>) -> Json<ErrorBody> {
    Json(ErrorBody::new(
        "NotFound",
        format!("no route for {}", request.uri().path()),
    ))
}

#[catch(422)]
fn unprocessable_entity() -> Json<ErrorBody> {
    Json(ErrorBody::new(
        "BadRequest",
        "request body could not be parsed",
    ))
}

#[catch(429)]
fn too_many_requests(request: &Request<'_>) -> Json<ErrorBody> {
    let decision = request.local_cache(RateLimitDecision::default);
    let message = match &decision.info {
        Some(info) => format!(
            "rate limit exceeded: max {} requests per {} seconds",
            info.limit, info.window_secs
        ),
        None => "rate limit exceeded".to_string(),
    };
    Json(ErrorBody::new("RateLimitExceeded", message))
}

#[catch(500)]
fn internal_error() -> Json<ErrorBody> {
    Json(ErrorBody::new("InternalError", "internal server error"))
}

pub fn all() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable_entity,
        too_many_requests,
        internal_error
    ]
}
