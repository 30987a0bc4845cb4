//! Forecasts and PV_Live truth values for individual grid supply points.

use crate::{
    app::{int_param, query_error},
    State,
};
use nowcasting_model::{query, schema::Regime};
use serde::Deserialize;
use tide::{Body, Request, Route};

/// Query parameters for forecast routes.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForecastParams {
    /// Include yesterday's forecasts as well as today's.
    pub historic: bool,
    /// Return only the forecast values, without location or model details.
    pub only_forecast_values: bool,
    /// Return the latest values forecast at least this many minutes before their target time.
    pub forecast_horizon_minutes: Option<u32>,
}

/// Query parameters for PV_Live routes.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TruthParams {
    /// Only include values from this regime.
    ///
    /// If not given, the most accurate value available at each time is included.
    pub regime: Option<Regime>,
}

/// Add routes under `/v0/solar/GB/gsp`.
pub fn routes(mut route: Route<'_, State>) {
    route.at("/forecast/all").get(get_all_available_forecasts);
    route.at("/forecast/all/").get(get_all_available_forecasts);
    route.at("/forecast/:gsp_id").get(get_forecasts_for_a_specific_gsp);
    route.at("/pvlive/all").get(get_truths_for_all_gsps);
    route.at("/pvlive/all/").get(get_truths_for_all_gsps);
    route.at("/pvlive/:gsp_id").get(get_truths_for_a_specific_gsp);
}

/// The latest forecasts for all GSPs, normalized by installed capacity.
async fn get_all_available_forecasts(req: Request<State>) -> tide::Result<Body> {
    let params: ForecastParams = req.query()?;
    tracing::info!(historic = params.historic, "get forecasts for all GSPs");

    let state = req.state();
    let mut forecasts = query::all_forecasts(state.db(), state.start(), params.historic)
        .await
        .map_err(query_error)?;
    forecasts.normalize();
    Body::from_json(&forecasts)
}

async fn get_forecasts_for_a_specific_gsp(req: Request<State>) -> tide::Result<Body> {
    let gsp_id = int_param(&req, "gsp_id")?;
    let params: ForecastParams = req.query()?;
    forecast_body(req.state(), gsp_id, params).await
}

/// Respond with the forecast for one GSP.
///
/// With `only_forecast_values`, this is a list of the latest values (optionally at a forecast
/// horizon); otherwise it is the full forecast, normalized by installed capacity. `historic` only
/// applies to the full forecast.
pub async fn forecast_body(
    state: &State,
    gsp_id: i32,
    params: ForecastParams,
) -> tide::Result<Body> {
    tracing::info!(gsp_id, ?params, "get forecast");

    if params.only_forecast_values {
        let values = query::latest_forecast_values(
            state.db(),
            gsp_id,
            state.start(),
            params.forecast_horizon_minutes,
        )
        .await
        .map_err(query_error)?;
        tracing::debug!("got {} forecast values", values.len());
        Body::from_json(&values)
    } else {
        let mut forecast =
            query::forecast_for_gsp(state.db(), gsp_id, state.start(), params.historic)
                .await
                .map_err(query_error)?;
        forecast.normalize();
        Body::from_json(&forecast)
    }
}

/// PV_Live values for all GSPs.
async fn get_truths_for_all_gsps(req: Request<State>) -> tide::Result<Body> {
    let params: TruthParams = req.query()?;
    tracing::info!(regime = ?params.regime, "get PV_Live values for all GSPs");

    let state = req.state();
    let locations = query::truths_for_all_gsps(state.db(), state.start(), params.regime)
        .await
        .map_err(query_error)?;
    Body::from_json(&locations)
}

/// PV_Live values for a single GSP.
async fn get_truths_for_a_specific_gsp(req: Request<State>) -> tide::Result<Body> {
    let gsp_id = int_param(&req, "gsp_id")?;
    let params: TruthParams = req.query()?;
    tracing::info!(gsp_id, regime = ?params.regime, "get PV_Live values");

    let state = req.state();
    let truths = query::truths_for_gsp(state.db(), gsp_id, state.start(), params.regime)
        .await
        .map_err(query_error)?;
    Body::from_json(&truths)
}
