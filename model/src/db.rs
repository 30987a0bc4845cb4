//! The database behind the Nowcasting API.
//!
//! The [`Connection`] trait describes the storage operations the API needs. It is implemented for
//! PostgreSQL in [`postgres`] and, for testing, by a simple in-memory database in [`mock`].

use crate::schema::{Forecast, GspYield, Location, Regime, Status};
use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Args;
use derive_more::From;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt::Display;
use std::fs::File;
use std::path::Path;
use surf::Url;

pub mod mock;
pub mod postgres;

/// Errors returned by the database.
#[derive(Debug, Snafu, From)]
pub enum Error {
    #[from]
    #[snafu(display("SQL error: {}", source))]
    Sql { source: async_postgres::Error },
    #[snafu(display("unable to connect to database: {}", source))]
    Connect { source: std::io::Error },
    #[snafu(display("{}", message))]
    Custom { message: String },
}

impl Error {
    /// Wrap a custom message into an error.
    pub fn custom(msg: impl Display) -> Self {
        Self::Custom {
            message: msg.to_string(),
        }
    }

    /// An error indicating that no location exists with the given GSP ID.
    pub fn no_such_location(gsp_id: i32) -> Self {
        Self::custom(format!("no location with GSP ID {gsp_id}"))
    }
}

/// Database connection options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// URL for connecting to the Postgres database.
    #[clap(
        long,
        env = "NOWCASTING_DB_URL",
        default_value = "http://localhost:5432"
    )]
    pub db_url: Url,

    /// User as which to connect to the database.
    #[clap(long, env = "NOWCASTING_DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Password for connecting to the Postgres database.
    #[clap(long, env = "NOWCASTING_DB_PASSWORD", default_value = "password")]
    pub db_password: String,

    /// Name of the database holding forecasts.
    #[clap(long, env = "NOWCASTING_DB_NAME", default_value = "postgres")]
    pub db_name: String,
}

impl Options {
    /// Connect to the database.
    pub async fn connect(&self) -> Result<postgres::Connection, anyhow::Error> {
        let mut config = postgres::Config::default();
        let host = self
            .db_url
            .host()
            .ok_or_else(|| anyhow::Error::msg(format!("URL {} has no hostname", self.db_url)))?
            .to_string();
        config
            .user(&self.db_user)
            .password(&self.db_password)
            .dbname(&self.db_name)
            .host(&host);
        if let Some(port) = self.db_url.port() {
            config.port(port);
        }
        tracing::info!("connecting to database at {host}");
        Ok(postgres::Connection::new(config).await?)
    }
}

/// A connection to the forecast database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create the tables and indices used by the API, if they don't exist already.
    async fn create_tables(&self) -> Result<(), Error>;

    /// Get locations, ordered by GSP ID.
    ///
    /// If `gsp_ids` is provided, only locations with one of those GSP IDs are returned.
    async fn locations(&self, gsp_ids: Option<&[i32]>) -> Result<Vec<Location>, Error>;

    /// Get forecasts for the locations with the given GSP IDs (or all locations).
    ///
    /// Each forecast only includes values targeting a time at or after `target_from`, ordered by
    /// target time. Forecasts are returned in no particular order.
    async fn forecasts(
        &self,
        gsp_ids: Option<&[i32]>,
        target_from: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, Error>;

    /// Get truth values at or after `from` for the given GSPs, tagged with the GSP ID they belong
    /// to.
    ///
    /// If `regime` is provided, only values from that regime are returned. Values are ordered by
    /// time.
    async fn gsp_yields(
        &self,
        gsp_ids: &[i32],
        from: DateTime<Utc>,
        regime: Option<Regime>,
    ) -> Result<Vec<(i32, GspYield)>, Error>;

    /// The most recently inserted status, if there is one.
    async fn latest_status(&self) -> Result<Option<Status>, Error>;

    /// Add a new location.
    ///
    /// # Errors
    ///
    /// This method will fail if a location with the same GSP ID already exists.
    async fn insert_location(&self, location: &Location) -> Result<(), Error>;

    /// Add a forecast and all of its values.
    ///
    /// The location of the forecast is identified by its GSP ID, and must already exist.
    async fn insert_forecast(&self, forecast: &Forecast) -> Result<(), Error>;

    /// Add truth values for an existing location.
    async fn insert_gsp_yields(&self, gsp_id: i32, yields: &[GspYield]) -> Result<(), Error>;

    /// Record a new status, which becomes the latest status.
    async fn insert_status(&self, status: &Status) -> Result<(), Error>;
}

/// Perform one-time setup of the database.
pub async fn setup<C: Connection + ?Sized>(conn: &C) -> Result<(), Error> {
    conn.create_tables().await
}

/// Truth values for a single GSP, as stored in a [`Dataset`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GspYields {
    pub gsp_id: i32,
    pub yields: Vec<GspYield>,
}

/// A bulk collection of data which can be [loaded](load) into the database.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub forecasts: Vec<Forecast>,
    #[serde(default)]
    pub gsp_yields: Vec<GspYields>,
    /// Statuses, oldest first.
    #[serde(default)]
    pub statuses: Vec<Status>,
}

impl Dataset {
    /// Read a dataset from a JSON file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("dataset {} is malformed", path.display()))
    }
}

/// Insert the contents of `dataset` into the database.
pub async fn load<C: Connection + ?Sized>(conn: &C, dataset: &Dataset) -> Result<(), Error> {
    tracing::info!(
        locations = dataset.locations.len(),
        forecasts = dataset.forecasts.len(),
        gsps_with_yields = dataset.gsp_yields.len(),
        statuses = dataset.statuses.len(),
        "loading dataset"
    );

    // Locations have to go in first, since everything else refers to them.
    for location in &dataset.locations {
        conn.insert_location(location).await?;
    }

    // Forecasts and truth values are independent of each other, so insert them in parallel.
    try_join_all(
        dataset
            .forecasts
            .iter()
            .map(|forecast| conn.insert_forecast(forecast)),
    )
    .await?;
    try_join_all(
        dataset
            .gsp_yields
            .iter()
            .map(|yields| conn.insert_gsp_yields(yields.gsp_id, &yields.yields)),
    )
    .await?;

    // Statuses are ordered, so insert them in series.
    for status in &dataset.statuses {
        conn.insert_status(status).await?;
    }

    Ok(())
}
