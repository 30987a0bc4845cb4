//! Middleware reporting how long each request took to handle.

use std::time::Instant;
use tide::{Middleware, Next, Request};

/// The header carrying the handling time of a request, in seconds.
pub const PROCESS_TIME_HEADER: &str = "X-Process-Time";

/// Adds an [`X-Process-Time`](PROCESS_TIME_HEADER) header to every response.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTime;

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> Middleware<State> for ProcessTime {
    async fn handle(&self, req: Request<State>, next: Next<'_, State>) -> tide::Result {
        let start = Instant::now();
        let method = req.method();
        let path = req.url().path().to_string();
        let mut res = next.run(req).await;
        let elapsed = start.elapsed().as_secs_f64();
        tracing::debug!(%method, %path, status = %res.status(), "process time {elapsed}");
        res.insert_header(PROCESS_TIME_HEADER, elapsed.to_string());
        Ok(res)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tide::http::{Method, Request as HttpRequest, Response as HttpResponse, Url};

    #[async_std::test]
    async fn test_process_time_header() {
        let mut app = tide::new();
        app.with(ProcessTime);
        app.at("/").get(|_| async { Ok("hello") });

        let req = HttpRequest::new(Method::Get, Url::parse("http://localhost/").unwrap());
        let res: HttpResponse = app.respond(req).await.unwrap();
        let elapsed = res
            .header(PROCESS_TIME_HEADER)
            .unwrap()
            .as_str()
            .parse::<f64>()
            .unwrap();
        assert!(elapsed >= 0.);
    }

    #[async_std::test]
    async fn test_process_time_on_error() {
        let mut app = tide::new();
        app.with(ProcessTime);

        let req = HttpRequest::new(Method::Get, Url::parse("http://localhost/missing").unwrap());
        let res: HttpResponse = app.respond(req).await.unwrap();
        assert_eq!(res.status(), tide::StatusCode::NotFound);
        assert!(res.header(PROCESS_TIME_HEADER).is_some());
    }
}
