use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing
pub struct RequestLogger;

struct RequestStart(Instant);

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(|| RequestStart(Instant::now()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started = request.local_cache(|| RequestStart(Instant::now()));
        let elapsed = started.0.elapsed();

        log::info!(
            "{} {} -> {} ({:.2}ms)",
            request.method(),
            request.uri(),
            response.status().code,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}
