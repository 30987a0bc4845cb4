//! Assembly of the HTTP application.

use crate::{docs, gsp, national, process_time::ProcessTime, status, system};
use anyhow::Error;
use chrono::{DateTime, Utc};
use nowcasting_model::{
    db::Connection,
    query::{self, Clock, History},
};
use serde_json::json;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tide::{
    http::{headers::HeaderValue, mime},
    security::{CorsMiddleware, Origin},
    Body, Request, Response, StatusCode,
};

pub const TITLE: &str = "Nowcasting API";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DOCUMENTATION: &str = "https://api.nowcasting.io/docs";

pub const DESCRIPTION: &str = "\
As part of Open Climate Fix's [open source project](https://github.com/openclimatefix), the
Nowcasting API is still under development.

#### General Overview

__Nowcasting__ essentially means __forecasting for the next few hours__.
OCF has built a predictive model that nowcasts solar energy generation for
the UK's National Grid ESO (electricity system operator). National Grid runs more than
300 [GSPs](https://data.nationalgrideso.com/system/gis-boundaries-for-gb-grid-supply-points)
(grid supply points), which are regionally located throughout the country.
OCF's Nowcasting App synthesizes real-time PV data, numeric weather predictions (nwp),
satellite imagery (looking at cloud cover), as well as GSP data to
forecast how much solar energy will be generated for a given GSP.

Here are key aspects of the solar forecasts:
- Forecasts are produced in 30-minute time steps, projecting GSP yields out to
eight hours ahead.
- The geographic extent is all of Great Britain (GB).
- Forecasts are produced at the GB National and regional level (using GSPs).

GSPs are referenced in the following ways: gspId (ex. 122); gspName (ex. FIDF_1);
gspGroup; regionName (ex. Fiddlers Ferry). The API provides information on when input data
was last updated as well as the installed photovoltaic (PV) megawatt capacity
(installedCapacityMw) of each individual GSP.

You'll find more detailed information for each route in the documentation below.
";

/// Shared state of the application.
#[derive(Clone)]
pub struct State {
    db: Arc<dyn Connection>,
    history: History,
    clock: Clock,
    favicon: PathBuf,
}

impl State {
    pub fn new(
        db: impl Connection + 'static,
        history: History,
        clock: Clock,
        favicon: PathBuf,
    ) -> Self {
        Self {
            db: Arc::new(db),
            history,
            clock,
            favicon,
        }
    }

    /// The database connection.
    pub fn db(&self) -> &dyn Connection {
        self.db.as_ref()
    }

    /// The earliest time to include in results for a request handled now.
    pub fn start(&self) -> DateTime<Utc> {
        self.history.start(self.clock.now())
    }
}

/// Build the application, with all routes and middleware.
pub fn app(state: State, origins: &[String]) -> Result<tide::Server<State>, Error> {
    let mut app = tide::with_state(state);

    app.with(ProcessTime);
    app.with(
        CorsMiddleware::new()
            .allow_methods("*".parse::<HeaderValue>().map_err(Error::msg)?)
            .allow_origin(Origin::from(origins.to_vec()))
            .allow_credentials(true),
    );

    app.at("/").get(get_api_information);
    app.at("/favicon.ico").get(get_favicon);
    app.at("/newdocs").get(docs::redoc_html);
    app.at("/openapi.json").get(docs::openapi);

    national::routes(app.at("/v0/solar/GB/national"));
    gsp::routes(app.at("/v0/solar/GB/gsp"));
    status::routes(app.at("/v0/solar/GB"));
    system::routes(app.at("/v0/system/GB"));

    Ok(app)
}

/// Convert a query error into an HTTP error with an appropriate status.
pub fn query_error(err: query::Error) -> tide::Error {
    let status = match &err {
        query::Error::NotFound { .. } => StatusCode::NotFound,
        query::Error::Db { .. } => {
            tracing::error!("database error: {err}");
            StatusCode::InternalServerError
        }
    };
    tide::Error::new(status, err)
}

/// Get an integer parameter from the request path.
pub fn int_param(req: &Request<State>, name: &str) -> tide::Result<i32> {
    let param = req.param(name)?;
    param.parse().map_err(|err| {
        tide::Error::from_str(
            StatusCode::UnprocessableEntity,
            format!("invalid {name} {param}: {err}"),
        )
    })
}

/// Basic information about the Nowcasting API.
async fn get_api_information(_req: Request<State>) -> tide::Result<Body> {
    tracing::info!("route / has been called");
    Body::from_json(&json!({
        "title": TITLE,
        "version": VERSION,
        "description": DESCRIPTION,
        "documentation": DOCUMENTATION,
    }))
}

async fn get_favicon(req: Request<State>) -> tide::Result<Response> {
    match Body::from_file(&req.state().favicon).await {
        Ok(body) => Ok(Response::builder(StatusCode::Ok)
            .body(body)
            .content_type(mime::ICO)
            .build()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(tide::Error::from_str(
            StatusCode::NotFound,
            "no favicon configured",
        )),
        Err(err) => Err(err.into()),
    }
}
