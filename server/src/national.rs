//! National forecasts and PV_Live truth values for Great Britain.

use crate::{
    app::query_error,
    gsp::{forecast_body, ForecastParams, TruthParams},
    State,
};
use nowcasting_model::{query, schema::NATIONAL_GSP_ID};
use tide::{Body, Request, Route};

/// Add routes under `/v0/solar/GB/national`.
pub fn routes(mut route: Route<'_, State>) {
    route.at("/forecast").get(get_national_forecast);
    route.at("/pvlive").get(get_national_pvlive);
}

/// The national forecast, with the same options as the forecast for a single GSP.
async fn get_national_forecast(req: Request<State>) -> tide::Result<Body> {
    let params: ForecastParams = req.query()?;
    forecast_body(req.state(), NATIONAL_GSP_ID, params).await
}

/// National PV_Live values.
async fn get_national_pvlive(req: Request<State>) -> tide::Result<Body> {
    let params: TruthParams = req.query()?;
    tracing::info!(regime = ?params.regime, "get national PV_Live values");

    let state = req.state();
    let truths = query::national_truths(state.db(), state.start(), params.regime)
        .await
        .map_err(query_error)?;
    Body::from_json(&truths)
}
