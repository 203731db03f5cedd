use std::time::Instant;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use tracing::info;

/// 记录每个请求的方法、路径、状态码和耗时
pub struct RequestTrace;

struct RequestStart(Instant);

#[rocket::async_trait]
impl Fairing for RequestTrace {
    fn info(&self) -> Info {
        Info {
            name: "Request Trace",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        req.local_cache(|| RequestStart(Instant::now()));
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let started = req.local_cache(|| RequestStart(Instant::now()));
        info!(
            method = %req.method(),
            path = %req.uri().path(),
            status = res.status().code,
            elapsed_ms = started.0.elapsed().as_millis() as u64,
            "request handled"
        );
    }
}
