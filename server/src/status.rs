//! The operational status of the forecast service.

use crate::{app::query_error, State};
use nowcasting_model::{query, schema::StatusLevel};
use tide::{Body, Request, Route};

/// Add routes under `/v0/solar/GB`.
pub fn routes(mut route: Route<'_, State>) {
    route.at("/status").get(get_status);
}

async fn get_status(req: Request<State>) -> tide::Result<Body> {
    tracing::info!("get status");
    let status = query::status(req.state().db())
        .await
        .map_err(query_error)?;
    if status.status != StatusLevel::Ok {
        tracing::warn!(status = %status.status, "{}", status.message);
    }
    Body::from_json(&status)
}
