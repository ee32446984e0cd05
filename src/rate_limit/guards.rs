use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::Response;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::rate_limit::{RateLimitInfo, RateLimitState};

/// What the limiter decided for this request. Stored in request-local
/// state so the header fairing and the 429 catcher can see it.
#[derive(Debug, Default)]
pub struct RateLimitDecision {
    pub info: Option<RateLimitInfo>,
    pub retry_after: Option<i64>,
}

/// Client identity for limiting purposes. Proxied deployments present the
/// real client in `X-Forwarded-For`; otherwise the socket address is used.
fn client_key(request: &Request<'_>) -> String {
    if let Some(forwarded) = request.headers().get_one("X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .client_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn enforce(request: &Request<'_>, auth_scope: bool) -> bool {
    let Some(state) = request.rocket().state::<RateLimitState>() else {
        log::warn!("rate limit state not managed, letting request through");
        return true;
    };

    if state.config.disabled {
        return true;
    }

    // Credential endpoints get their own counter per path, so hammering
    // the login form does not eat into the general API budget.
    let (key, quota) = if auth_scope {
        let key = format!("{}:{}", client_key(request), request.uri().path());
        (key, state.config.auth_quota())
    } else {
        (client_key(request), state.config.api_quota())
    };

    let allowed = state.limiter.is_allowed(&key, quota);
    let info = state.limiter.info(&key, quota);
    let retry_after = info.retry_after;
    request.local_cache(|| RateLimitDecision {
        info: Some(info),
        retry_after,
    });

    if !allowed {
        log::warn!("rate limit exceeded for {}", key);
    }
    allowed
}

/// Per-IP quota for general API traffic.
pub struct ApiRateLimit;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiRateLimit {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if enforce(request, false) {
            Outcome::Success(ApiRateLimit)
        } else {
            Outcome::Error((Status::TooManyRequests, ()))
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for ApiRateLimit {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Per-IP-and-path quota for credential endpoints.
pub struct AuthRateLimit;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthRateLimit {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if enforce(request, true) {
            Outcome::Success(AuthRateLimit)
        } else {
            Outcome::Error((Status::TooManyRequests, ()))
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthRateLimit {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Response fairing that surfaces the limiter's view of the window as
/// `X-RateLimit-*` headers, plus `Retry-After` while a block is active.
pub struct RateLimitHeaders;

#[rocket::async_trait]
impl Fairing for RateLimitHeaders {
    fn info(&self) -> Info {
        Info {
            name: "Rate Limit Headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let decision = request.local_cache(RateLimitDecision::default);
        let Some(info) = &decision.info else {
            return;
        };

        response.set_header(Header::new("X-RateLimit-Limit", info.limit.to_string()));
        response.set_header(Header::new(
            "X-RateLimit-Remaining",
            info.remaining.to_string(),
        ));
        response.set_header(Header::new("X-RateLimit-Reset", info.reset_at.to_string()));
        if let Some(retry_after) = decision.retry_after {
            response.set_header(Header::new("Retry-After", retry_after.to_string()));
        }
    }
}
