//! Details of the GSP systems.

use crate::{app::query_error, State};
use nowcasting_model::query;
use serde::Deserialize;
use tide::{Body, Request, Route};

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
struct SystemParams {
    gsp_id: Option<i32>,
}

/// Add routes under `/v0/system/GB`.
pub fn routes(mut route: Route<'_, State>) {
    route.at("/gsp").get(get_gsp_systems);
    route.at("/gsp/").get(get_gsp_systems);
}

/// All regional GSPs, or the one named by the `gsp_id` parameter.
async fn get_gsp_systems(req: Request<State>) -> tide::Result<Body> {
    let params: SystemParams = req.query()?;
    tracing::info!(gsp_id = ?params.gsp_id, "get GSP systems");

    let locations = query::gsp_systems(req.state().db(), params.gsp_id)
        .await
        .map_err(query_error)?;
    Body::from_json(&locations)
}
