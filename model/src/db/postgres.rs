//! Instantiation of the abstract [`db`](super) interface for PostgreSQL.
//!
//! This instantiation is built on [`async-postgres`].

use super::Error;
use crate::schema::{
    Forecast, ForecastValue, GspYield, InputDataLastUpdated, Location, MlModel, Regime, Status,
};
use async_std::task::spawn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio_postgres::types::ToSql;

pub use async_postgres::{Config, Row};

/// Statements creating the schema used by the API.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS location (
        id serial PRIMARY KEY,
        label text NOT NULL,
        gsp_id int4 UNIQUE,
        gsp_name text,
        gsp_group text,
        region_name text,
        installed_capacity_mw float8
    );
    CREATE TABLE IF NOT EXISTS forecast (
        id serial PRIMARY KEY,
        location_id int4 NOT NULL REFERENCES location (id),
        model_name text NOT NULL,
        model_version text NOT NULL,
        forecast_creation_time timestamptz NOT NULL,
        historic bool NOT NULL DEFAULT false,
        input_gsp timestamptz NOT NULL,
        input_nwp timestamptz NOT NULL,
        input_pv timestamptz NOT NULL,
        input_satellite timestamptz NOT NULL
    );
    CREATE INDEX IF NOT EXISTS forecast_location_created
        ON forecast (location_id, forecast_creation_time);
    CREATE TABLE IF NOT EXISTS forecast_value (
        forecast_id int4 NOT NULL REFERENCES forecast (id),
        target_time timestamptz NOT NULL,
        expected_power_generation_megawatts float8 NOT NULL,
        PRIMARY KEY (forecast_id, target_time)
    );
    CREATE TABLE IF NOT EXISTS gsp_yield (
        location_id int4 NOT NULL REFERENCES location (id),
        datetime_utc timestamptz NOT NULL,
        solar_generation_kw float8 NOT NULL,
        regime text NOT NULL,
        PRIMARY KEY (location_id, datetime_utc, regime)
    );
    CREATE TABLE IF NOT EXISTS status (
        id serial PRIMARY KEY,
        status text NOT NULL,
        message text NOT NULL,
        created_utc timestamptz NOT NULL DEFAULT now()
    );
";

const LOCATION_COLUMNS: &str =
    "l.label, l.gsp_id, l.gsp_name, l.gsp_group, l.region_name, l.installed_capacity_mw";

/// A connection to a PostgreSQL database.
pub struct Connection(tokio_postgres::Client);

impl Connection {
    /// Establish a new connection with the given [`Config`].
    pub async fn new(config: Config) -> Result<Self, Error> {
        let (client, conn) = async_postgres::connect(config)
            .await
            .map_err(|source| Error::Connect { source })?;
        spawn(conn);
        Ok(Self(client))
    }

    async fn query(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        tracing::debug!(?params, "{}", statement);
        Ok(self.0.query(statement, params).await?)
    }

    async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, Error> {
        tracing::debug!(?params, "{}", statement);
        Ok(self.0.execute(statement, params).await?)
    }

    /// Look up the primary key of the location with the given GSP ID.
    async fn location_id(&self, gsp_id: i32) -> Result<i32, Error> {
        let rows = self
            .query("SELECT id FROM location WHERE gsp_id = $1", &[&gsp_id])
            .await?;
        match rows.first() {
            Some(row) => Ok(row.try_get("id")?),
            None => Err(Error::no_such_location(gsp_id)),
        }
    }
}

#[async_trait]
impl super::Connection for Connection {
    async fn create_tables(&self) -> Result<(), Error> {
        tracing::info!("creating tables");
        Ok(self.0.batch_execute(SCHEMA).await?)
    }

    async fn locations(&self, gsp_ids: Option<&[i32]>) -> Result<Vec<Location>, Error> {
        let gsp_ids = gsp_ids.map(<[i32]>::to_vec);
        let rows = self
            .query(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM location l
                        WHERE $1::int4[] IS NULL OR l.gsp_id = ANY($1)
                        ORDER BY l.gsp_id"
                ),
                &[&gsp_ids],
            )
            .await?;
        rows.iter().map(location_from_row).collect()
    }

    async fn forecasts(
        &self,
        gsp_ids: Option<&[i32]>,
        target_from: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, Error> {
        let gsp_ids = gsp_ids.map(<[i32]>::to_vec);
        let rows = self
            .query(
                &format!(
                    "SELECT f.id, f.model_name, f.model_version, f.forecast_creation_time,
                            f.historic, f.input_gsp, f.input_nwp, f.input_pv, f.input_satellite,
                            {LOCATION_COLUMNS}
                        FROM forecast f JOIN location l ON l.id = f.location_id
                        WHERE $1::int4[] IS NULL OR l.gsp_id = ANY($1)"
                ),
                &[&gsp_ids],
            )
            .await?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<_, i32>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut values: HashMap<i32, Vec<ForecastValue>> = HashMap::new();
        for row in self
            .query(
                "SELECT forecast_id, target_time, expected_power_generation_megawatts
                    FROM forecast_value
                    WHERE forecast_id = ANY($1) AND target_time >= $2
                    ORDER BY target_time",
                &[&ids, &target_from],
            )
            .await?
        {
            values
                .entry(row.try_get("forecast_id")?)
                .or_default()
                .push(ForecastValue::new(
                    row.try_get("target_time")?,
                    row.try_get("expected_power_generation_megawatts")?,
                ));
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                Ok::<_, Error>(Forecast {
                    location: location_from_row(row)?,
                    model: MlModel {
                        name: row.try_get("model_name")?,
                        version: row.try_get("model_version")?,
                    },
                    forecast_creation_time: row.try_get("forecast_creation_time")?,
                    historic: row.try_get("historic")?,
                    forecast_values: values.remove(&id).unwrap_or_default(),
                    input_data_last_updated: InputDataLastUpdated {
                        gsp: row.try_get("input_gsp")?,
                        nwp: row.try_get("input_nwp")?,
                        pv: row.try_get("input_pv")?,
                        satellite: row.try_get("input_satellite")?,
                    },
                })
            })
            .collect()
    }

    async fn gsp_yields(
        &self,
        gsp_ids: &[i32],
        from: DateTime<Utc>,
        regime: Option<Regime>,
    ) -> Result<Vec<(i32, GspYield)>, Error> {
        let gsp_ids = gsp_ids.to_vec();
        let regime = regime.map(|regime| regime.to_string());
        let rows = self
            .query(
                "SELECT l.gsp_id, y.datetime_utc, y.solar_generation_kw, y.regime
                    FROM gsp_yield y JOIN location l ON l.id = y.location_id
                    WHERE l.gsp_id = ANY($1)
                      AND y.datetime_utc >= $2
                      AND ($3::text IS NULL OR y.regime = $3)
                    ORDER BY y.datetime_utc",
                &[&gsp_ids, &from, &regime],
            )
            .await?;
        rows.iter()
            .map(|row| {
                let regime: String = row.try_get("regime")?;
                Ok::<_, Error>((
                    row.try_get("gsp_id")?,
                    GspYield {
                        datetime_utc: row.try_get("datetime_utc")?,
                        solar_generation_kw: row.try_get("solar_generation_kw")?,
                        regime: regime.parse().map_err(|err| {
                            Error::custom(format!("invalid regime {regime} in database: {err}"))
                        })?,
                    },
                ))
            })
            .collect()
    }

    async fn latest_status(&self) -> Result<Option<Status>, Error> {
        let rows = self
            .query(
                "SELECT status, message FROM status ORDER BY created_utc DESC, id DESC LIMIT 1",
                &[],
            )
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(Status {
            status: status.parse().map_err(|err| {
                Error::custom(format!("invalid status {status} in database: {err}"))
            })?,
            message: row.try_get("message")?,
        }))
    }

    async fn insert_location(&self, location: &Location) -> Result<(), Error> {
        self.execute(
            "INSERT INTO location
                (label, gsp_id, gsp_name, gsp_group, region_name, installed_capacity_mw)
                VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &location.label,
                &location.gsp_id,
                &location.gsp_name,
                &location.gsp_group,
                &location.region_name,
                &location.installed_capacity_mw,
            ],
        )
        .await?;
        Ok(())
    }

    async fn insert_forecast(&self, forecast: &Forecast) -> Result<(), Error> {
        let gsp_id = forecast.gsp_id().ok_or_else(|| {
            Error::custom(format!(
                "forecast location {} has no GSP ID",
                forecast.location.label
            ))
        })?;
        let location_id = self.location_id(gsp_id).await?;
        let input = &forecast.input_data_last_updated;
        let rows = self
            .query(
                "INSERT INTO forecast
                    (location_id, model_name, model_version, forecast_creation_time, historic,
                     input_gsp, input_nwp, input_pv, input_satellite)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING id",
                &[
                    &location_id,
                    &forecast.model.name,
                    &forecast.model.version,
                    &forecast.forecast_creation_time,
                    &forecast.historic,
                    &input.gsp,
                    &input.nwp,
                    &input.pv,
                    &input.satellite,
                ],
            )
            .await?;
        let forecast_id: i32 = rows
            .first()
            .ok_or_else(|| Error::custom("INSERT INTO forecast returned no ID"))?
            .try_get("id")?;

        for value in &forecast.forecast_values {
            self.execute(
                "INSERT INTO forecast_value
                    (forecast_id, target_time, expected_power_generation_megawatts)
                    VALUES ($1, $2, $3)",
                &[
                    &forecast_id,
                    &value.target_time,
                    &value.expected_power_generation_megawatts,
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn insert_gsp_yields(&self, gsp_id: i32, yields: &[GspYield]) -> Result<(), Error> {
        let location_id = self.location_id(gsp_id).await?;
        for gsp_yield in yields {
            self.execute(
                "INSERT INTO gsp_yield (location_id, datetime_utc, solar_generation_kw, regime)
                    VALUES ($1, $2, $3, $4)",
                &[
                    &location_id,
                    &gsp_yield.datetime_utc,
                    &gsp_yield.solar_generation_kw,
                    &gsp_yield.regime.to_string(),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn insert_status(&self, status: &Status) -> Result<(), Error> {
        self.execute(
            "INSERT INTO status (status, message) VALUES ($1, $2)",
            &[&status.status.to_string(), &status.message],
        )
        .await?;
        Ok(())
    }
}

fn location_from_row(row: &Row) -> Result<Location, Error> {
    Ok(Location {
        label: row.try_get("label")?,
        gsp_id: row.try_get("gsp_id")?,
        gsp_name: row.try_get("gsp_name")?,
        gsp_group: row.try_get("gsp_group")?,
        region_name: row.try_get("region_name")?,
        installed_capacity_mw: row.try_get("installed_capacity_mw")?,
        gsp_yields: None,
    })
}
