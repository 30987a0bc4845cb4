//! Mock instantiation of the abstract [`db`](super) interface.
//!
//! This instantiation is built on a simple in-memory database. It is useful for testing in
//! isolation from an actual database.
#![cfg(any(test, feature = "testing"))]

use super::Error;
use crate::schema::{Forecast, GspYield, Location, Regime, Status};
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::btree_map::{BTreeMap, Entry};

/// The in-memory database.
#[derive(Debug, Default)]
struct Db {
    locations: BTreeMap<i32, Location>,
    forecasts: Vec<(i32, Forecast)>,
    gsp_yields: Vec<(i32, GspYield)>,
    statuses: Vec<Status>,
}

impl Db {
    fn check_location(&self, gsp_id: i32) -> Result<(), Error> {
        if self.locations.contains_key(&gsp_id) {
            Ok(())
        } else {
            Err(Error::no_such_location(gsp_id))
        }
    }
}

/// A connection to the in-memory database.
#[derive(Clone, Debug)]
pub struct Connection(Arc<RwLock<Db>>);

impl Connection {
    /// Create a new database and connect to it.
    ///
    /// This will create a connection to a fresh, empty database. It will not be connected or
    /// related to any previous connection or database. Once the database is created, this
    /// connection can be [cloned](Clone) in order to create multiple simultaneous connections to
    /// the same database.
    pub fn create() -> Self {
        Self(Default::default())
    }
}

fn selected(gsp_ids: Option<&[i32]>, gsp_id: i32) -> bool {
    gsp_ids.map_or(true, |ids| ids.contains(&gsp_id))
}

#[async_trait]
impl super::Connection for Connection {
    async fn create_tables(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn locations(&self, gsp_ids: Option<&[i32]>) -> Result<Vec<Location>, Error> {
        let db = self.0.read().await;
        Ok(db
            .locations
            .iter()
            .filter(|(gsp_id, _)| selected(gsp_ids, **gsp_id))
            .map(|(_, location)| location.clone())
            .collect())
    }

    async fn forecasts(
        &self,
        gsp_ids: Option<&[i32]>,
        target_from: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, Error> {
        let db = self.0.read().await;
        db.forecasts
            .iter()
            .filter(|(gsp_id, _)| selected(gsp_ids, *gsp_id))
            .map(|(gsp_id, forecast)| {
                let mut forecast = forecast.clone();
                // Report the location as it is stored, as a join would.
                forecast.location = db
                    .locations
                    .get(gsp_id)
                    .cloned()
                    .ok_or_else(|| Error::no_such_location(*gsp_id))?;
                forecast
                    .forecast_values
                    .retain(|value| value.target_time >= target_from);
                forecast
                    .forecast_values
                    .sort_by_key(|value| value.target_time);
                Ok::<_, Error>(forecast)
            })
            .collect()
    }

    async fn gsp_yields(
        &self,
        gsp_ids: &[i32],
        from: DateTime<Utc>,
        regime: Option<Regime>,
    ) -> Result<Vec<(i32, GspYield)>, Error> {
        let db = self.0.read().await;
        let mut yields = db
            .gsp_yields
            .iter()
            .filter(|(gsp_id, gsp_yield)| {
                gsp_ids.contains(gsp_id)
                    && gsp_yield.datetime_utc >= from
                    && regime.map_or(true, |regime| gsp_yield.regime == regime)
            })
            .copied()
            .collect::<Vec<_>>();
        yields.sort_by_key(|(_, gsp_yield)| gsp_yield.datetime_utc);
        Ok(yields)
    }

    async fn latest_status(&self) -> Result<Option<Status>, Error> {
        Ok(self.0.read().await.statuses.last().cloned())
    }

    async fn insert_location(&self, location: &Location) -> Result<(), Error> {
        let gsp_id = location
            .gsp_id
            .ok_or_else(|| Error::custom(format!("location {} has no GSP ID", location.label)))?;
        let mut db = self.0.write().await;
        match db.locations.entry(gsp_id) {
            Entry::Occupied(e) => Err(Error::custom(format!(
                "location with GSP ID {} already exists",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(Location {
                    gsp_yields: None,
                    ..location.clone()
                });
                Ok(())
            }
        }
    }

    async fn insert_forecast(&self, forecast: &Forecast) -> Result<(), Error> {
        let gsp_id = forecast.gsp_id().ok_or_else(|| {
            Error::custom(format!(
                "forecast location {} has no GSP ID",
                forecast.location.label
            ))
        })?;
        let mut db = self.0.write().await;
        db.check_location(gsp_id)?;
        db.forecasts.push((gsp_id, forecast.clone()));
        Ok(())
    }

    async fn insert_gsp_yields(&self, gsp_id: i32, yields: &[GspYield]) -> Result<(), Error> {
        let mut db = self.0.write().await;
        db.check_location(gsp_id)?;
        db.gsp_yields
            .extend(yields.iter().map(|gsp_yield| (gsp_id, *gsp_yield)));
        Ok(())
    }

    async fn insert_status(&self, status: &Status) -> Result<(), Error> {
        self.0.write().await.statuses.push(status.clone());
        Ok(())
    }
}
