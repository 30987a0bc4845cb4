//! High-level queries served by the API.
//!
//! These build on the raw storage operations of [`db::Connection`](Connection), selecting the
//! latest forecasts and truth values within a window of recent history.

use crate::db::{self, Connection};
use crate::schema::{
    regional_gsp_ids, Forecast, ForecastValue, GspYield, Location, ManyForecasts, Regime, Status,
    NATIONAL_GSP_ID,
};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use snafu::Snafu;
use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Errors returned by queries.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{}", what))]
    NotFound { what: String },
    #[snafu(context(false), display("database error: {}", source))]
    Db { source: db::Error },
}

impl Error {
    fn not_found(what: impl Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }
}

/// The longest history that can be requested, in days.
pub const MAX_HISTORY_DAYS: u32 = 36500;

/// How much history to include in query results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum History {
    /// Everything since midnight (UTC) at the start of yesterday.
    #[default]
    Yesterday,
    /// The given number of days, rounded down to a 6 hour boundary.
    ///
    /// At most [`MAX_HISTORY_DAYS`] are included, however many are requested.
    Days(u32),
}

impl History {
    /// The earliest time to include in results, when querying at time `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Yesterday => {
                let yesterday = now.date_naive() - Duration::days(1);
                Utc.from_utc_datetime(&yesterday.and_time(NaiveTime::MIN))
            }
            Self::Days(days) => {
                let days = (*days).min(MAX_HISTORY_DAYS);
                floor_6_hours(now - Duration::days(i64::from(days)))
            }
        }
    }
}

impl FromStr for History {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "yesterday" {
            Ok(Self::Yesterday)
        } else {
            let days: u32 = s.parse().map_err(|err| {
                format!("history must be \"yesterday\" or a number of days (got {s}): {err}")
            })?;
            if days > MAX_HISTORY_DAYS {
                return Err(format!(
                    "history must be at most {MAX_HISTORY_DAYS} days (got {days})"
                ));
            }
            Ok(Self::Days(days))
        }
    }
}

impl Display for History {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Yesterday => write!(f, "yesterday"),
            Self::Days(days) => write!(f, "{days}"),
        }
    }
}

/// Round a time down to the most recent 00:00, 06:00, 12:00 or 18:00 UTC.
fn floor_6_hours(t: DateTime<Utc>) -> DateTime<Utc> {
    const SIX_HOURS: i64 = 6 * 60 * 60;
    t - Duration::seconds(t.timestamp().rem_euclid(SIX_HOURS))
        - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// The source of the current time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Clock {
    /// The system clock.
    #[default]
    System,
    /// A fixed point in time.
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(t) => *t,
        }
    }
}

/// The latest ML forecast for each regional GSP.
///
/// If `historic` is set, each forecast is a [historic](historic_forecast) forecast instead of the
/// latest forecast run.
pub async fn all_forecasts<C: Connection + ?Sized>(
    conn: &C,
    start: DateTime<Utc>,
    historic: bool,
) -> Result<ManyForecasts, Error> {
    let forecasts = conn.forecasts(Some(&regional_gsp_ids()), start).await?;
    let forecasts = group_by_gsp(forecasts)
        .into_values()
        .filter_map(|runs| {
            if historic {
                historic_forecast(runs)
            } else {
                latest_forecast(runs)
            }
        })
        .collect();
    Ok(ManyForecasts { forecasts })
}

/// The latest (or historic) forecast for a single GSP.
///
/// # Errors
///
/// This function fails with [`Error::NotFound`] if there are no forecasts for `gsp_id`.
pub async fn forecast_for_gsp<C: Connection + ?Sized>(
    conn: &C,
    gsp_id: i32,
    start: DateTime<Utc>,
    historic: bool,
) -> Result<Forecast, Error> {
    let runs = conn.forecasts(Some(&[gsp_id]), start).await?;
    let forecast = if historic {
        historic_forecast(runs)
    } else {
        latest_forecast(runs)
    };
    forecast.ok_or_else(|| Error::not_found(format!("no forecast for GSP {gsp_id}")))
}

/// The latest national forecast.
pub async fn national_forecast<C: Connection + ?Sized>(
    conn: &C,
    start: DateTime<Utc>,
    historic: bool,
) -> Result<Forecast, Error> {
    forecast_for_gsp(conn, NATIONAL_GSP_ID, start, historic).await
}

/// The most recent forecast value for each target time for a single GSP.
///
/// If `horizon_minutes` is given, each value comes from the latest forecast made at least that many
/// minutes before the target time, and target times with no such forecast are skipped.
pub async fn latest_forecast_values<C: Connection + ?Sized>(
    conn: &C,
    gsp_id: i32,
    start: DateTime<Utc>,
    horizon_minutes: Option<u32>,
) -> Result<Vec<ForecastValue>, Error> {
    let runs = conn.forecasts(Some(&[gsp_id]), start).await?;
    let horizon = horizon_minutes.map(|minutes| Duration::minutes(i64::from(minutes)));
    Ok(latest_values(&runs, horizon))
}

/// PV_Live truth values for a single GSP.
///
/// If `regime` is not given, the most accurate value available at each time is returned: the
/// day-after value if it has been published, or the in-day value otherwise.
pub async fn truths_for_gsp<C: Connection + ?Sized>(
    conn: &C,
    gsp_id: i32,
    start: DateTime<Utc>,
    regime: Option<Regime>,
) -> Result<Vec<GspYield>, Error> {
    let yields = conn.gsp_yields(&[gsp_id], start, regime).await?;
    Ok(resolve_yields(
        yields.into_iter().map(|(_, gsp_yield)| gsp_yield),
    ))
}

/// PV_Live truth values for the whole country.
pub async fn national_truths<C: Connection + ?Sized>(
    conn: &C,
    start: DateTime<Utc>,
    regime: Option<Regime>,
) -> Result<Vec<GspYield>, Error> {
    truths_for_gsp(conn, NATIONAL_GSP_ID, start, regime).await
}

/// Every regional GSP, with its PV_Live truth values.
pub async fn truths_for_all_gsps<C: Connection + ?Sized>(
    conn: &C,
    start: DateTime<Utc>,
    regime: Option<Regime>,
) -> Result<Vec<Location>, Error> {
    let gsp_ids = regional_gsp_ids();
    let locations = conn.locations(Some(&gsp_ids)).await?;
    let mut yields: BTreeMap<i32, Vec<GspYield>> = BTreeMap::new();
    for (gsp_id, gsp_yield) in conn.gsp_yields(&gsp_ids, start, regime).await? {
        yields.entry(gsp_id).or_default().push(gsp_yield);
    }

    Ok(locations
        .into_iter()
        .map(|location| {
            let gsp_yields = location
                .gsp_id
                .and_then(|gsp_id| yields.remove(&gsp_id))
                .unwrap_or_default();
            Location {
                gsp_yields: Some(resolve_yields(gsp_yields)),
                ..location
            }
        })
        .collect())
}

/// The current status of the forecast service.
pub async fn status<C: Connection + ?Sized>(conn: &C) -> Result<Status, Error> {
    conn.latest_status()
        .await?
        .ok_or_else(|| Error::not_found("no status has been reported"))
}

/// Details of all regional GSPs, or of a single GSP if `gsp_id` is given.
pub async fn gsp_systems<C: Connection + ?Sized>(
    conn: &C,
    gsp_id: Option<i32>,
) -> Result<Vec<Location>, Error> {
    Ok(match gsp_id {
        Some(gsp_id) => conn.locations(Some(&[gsp_id])).await?,
        None => conn.locations(Some(&regional_gsp_ids())).await?,
    })
}

fn group_by_gsp(forecasts: Vec<Forecast>) -> BTreeMap<i32, Vec<Forecast>> {
    let mut groups: BTreeMap<i32, Vec<Forecast>> = BTreeMap::new();
    for forecast in forecasts {
        match forecast.gsp_id() {
            Some(gsp_id) => groups.entry(gsp_id).or_default().push(forecast),
            None => tracing::warn!(
                "forecast for location {} has no GSP ID, skipping",
                forecast.location.label
            ),
        }
    }
    groups
}

/// The most recently created of a set of forecast runs.
fn latest_forecast(runs: Vec<Forecast>) -> Option<Forecast> {
    runs.into_iter().max_by(|a, b| run_order(a).cmp(&run_order(b)))
}

/// The order in which forecast runs supersede each other.
///
/// Later runs supersede earlier ones. Runs created at the same time are ordered by model version
/// and then model name, compared as strings, so the choice does not depend on storage order.
fn run_order(run: &Forecast) -> (DateTime<Utc>, &str, &str) {
    (
        run.forecast_creation_time,
        run.model.version.as_str(),
        run.model.name.as_str(),
    )
}

/// Combine a set of forecast runs for one location into a historic forecast.
///
/// The historic forecast takes its metadata from the latest run, and contains the latest value for
/// each target time covered by any of the runs.
fn historic_forecast(runs: Vec<Forecast>) -> Option<Forecast> {
    let values = latest_values(&runs, None);
    let latest = latest_forecast(runs)?;
    Some(Forecast {
        historic: true,
        forecast_values: values,
        ..latest
    })
}

/// For each target time, the value from the most recently created forecast run.
///
/// If `horizon` is given, only runs created at least `horizon` before the target time are
/// considered. The result is ordered by target time.
fn latest_values(runs: &[Forecast], horizon: Option<Duration>) -> Vec<ForecastValue> {
    let mut latest: BTreeMap<DateTime<Utc>, (&Forecast, ForecastValue)> = BTreeMap::new();
    for run in runs {
        let created = run.forecast_creation_time;
        for value in &run.forecast_values {
            if let Some(horizon) = horizon {
                if created > value.target_time - horizon {
                    continue;
                }
            }
            match latest.entry(value.target_time) {
                Entry::Vacant(e) => {
                    e.insert((run, *value));
                }
                Entry::Occupied(mut e) => {
                    if run_order(run) > run_order(e.get().0) {
                        e.insert((run, *value));
                    }
                }
            }
        }
    }
    latest.into_values().map(|(_, value)| value).collect()
}

/// Pick one truth value for each time, preferring day-after values over in-day values.
///
/// The result is ordered by time.
fn resolve_yields(yields: impl IntoIterator<Item = GspYield>) -> Vec<GspYield> {
    let mut resolved: BTreeMap<DateTime<Utc>, GspYield> = BTreeMap::new();
    for gsp_yield in yields {
        match resolved.entry(gsp_yield.datetime_utc) {
            Entry::Vacant(e) => {
                e.insert(gsp_yield);
            }
            Entry::Occupied(mut e) => {
                if gsp_yield.regime == Regime::DayAfter {
                    e.insert(gsp_yield);
                }
            }
        }
    }
    resolved.into_values().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::mock;
    use crate::schema::{InputDataLastUpdated, MlModel, StatusLevel};

    fn t(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, day, hour, min, 0).unwrap()
    }

    fn location(gsp_id: i32) -> Location {
        Location {
            label: format!("GSP_{gsp_id}"),
            gsp_id: Some(gsp_id),
            gsp_name: Some(format!("NAME_{gsp_id}")),
            gsp_group: None,
            region_name: None,
            installed_capacity_mw: Some(100.),
            gsp_yields: None,
        }
    }

    fn forecast(gsp_id: i32, created: DateTime<Utc>, values: &[(DateTime<Utc>, f64)]) -> Forecast {
        Forecast {
            location: location(gsp_id),
            model: MlModel {
                name: "cnn".into(),
                version: created.to_string(),
            },
            forecast_creation_time: created,
            historic: false,
            forecast_values: values
                .iter()
                .map(|(target, mw)| ForecastValue::new(*target, *mw))
                .collect(),
            input_data_last_updated: InputDataLastUpdated {
                gsp: created,
                nwp: created,
                pv: created,
                satellite: created,
            },
        }
    }

    fn gsp_yield(time: DateTime<Utc>, kw: f64, regime: Regime) -> GspYield {
        GspYield {
            datetime_utc: time,
            solar_generation_kw: kw,
            regime,
        }
    }

    /// A database with two forecast runs for GSP 1, one for GSP 2, and one for the nation.
    async fn seeded() -> mock::Connection {
        let conn = mock::Connection::create();
        db::load(
            &conn,
            &db::Dataset {
                locations: vec![location(0), location(1), location(2), location(3)],
                forecasts: vec![
                    forecast(1, t(8, 9, 0), &[(t(8, 10, 0), 10.), (t(8, 10, 30), 11.)]),
                    forecast(
                        1,
                        t(8, 10, 0),
                        &[(t(8, 10, 30), 21.), (t(8, 11, 0), 22.), (t(8, 11, 30), 23.)],
                    ),
                    forecast(2, t(8, 10, 0), &[(t(8, 11, 0), 5.)]),
                    forecast(0, t(8, 10, 0), &[(t(8, 11, 0), 500.)]),
                ],
                gsp_yields: vec![db::GspYields {
                    gsp_id: 1,
                    yields: vec![
                        gsp_yield(t(8, 10, 0), 1., Regime::InDay),
                        gsp_yield(t(8, 10, 0), 2., Regime::DayAfter),
                        gsp_yield(t(8, 10, 30), 3., Regime::InDay),
                        gsp_yield(t(6, 10, 30), 4., Regime::InDay),
                    ],
                }],
                statuses: vec![],
            },
        )
        .await
        .unwrap();
        conn
    }

    #[test]
    fn test_history_start() {
        let now = t(8, 14, 23);
        assert_eq!(History::Yesterday.start(now), t(7, 0, 0));
        assert_eq!(History::Days(2).start(now), t(6, 12, 0));
        assert_eq!(History::Days(0).start(t(8, 5, 59)), t(8, 0, 0));
    }

    #[test]
    fn test_history_parse() {
        assert_eq!("yesterday".parse::<History>().unwrap(), History::Yesterday);
        assert_eq!("3".parse::<History>().unwrap(), History::Days(3));
        "last week".parse::<History>().unwrap_err();
        assert_eq!(History::Days(3).to_string(), "3");
    }

    #[test]
    fn test_history_bounds() {
        let now = t(8, 14, 23);
        assert_eq!(
            History::Days(u32::MAX).start(now),
            History::Days(MAX_HISTORY_DAYS).start(now)
        );
        assert_eq!(
            MAX_HISTORY_DAYS.to_string().parse::<History>().unwrap(),
            History::Days(MAX_HISTORY_DAYS)
        );
        (MAX_HISTORY_DAYS + 1)
            .to_string()
            .parse::<History>()
            .unwrap_err();
        u32::MAX.to_string().parse::<History>().unwrap_err();
    }

    #[test]
    fn test_resolve_yields_prefers_day_after() {
        let in_day = gsp_yield(t(8, 10, 0), 1., Regime::InDay);
        let day_after = gsp_yield(t(8, 10, 0), 2., Regime::DayAfter);
        assert_eq!(resolve_yields([in_day, day_after]), vec![day_after]);
        assert_eq!(resolve_yields([day_after, in_day]), vec![day_after]);
    }

    #[async_std::test]
    async fn test_simultaneous_runs() {
        let run = |version: &str, mw: f64| {
            let mut run = forecast(1, t(8, 10, 0), &[(t(8, 11, 0), mw)]);
            run.model.version = version.into();
            run
        };

        for runs in [
            vec![run("1.0.0", 1.), run("1.1.0", 2.)],
            vec![run("1.1.0", 2.), run("1.0.0", 1.)],
        ] {
            let conn = mock::Connection::create();
            db::load(
                &conn,
                &db::Dataset {
                    locations: vec![location(1)],
                    forecasts: runs,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            let latest = forecast_for_gsp(&conn, 1, t(7, 0, 0), false).await.unwrap();
            assert_eq!(latest.model.version, "1.1.0");
            let historic = forecast_for_gsp(&conn, 1, t(7, 0, 0), true).await.unwrap();
            assert_eq!(
                historic.forecast_values,
                vec![ForecastValue::new(t(8, 11, 0), 2.)]
            );
            let values = latest_forecast_values(&conn, 1, t(7, 0, 0), None)
                .await
                .unwrap();
            assert_eq!(values, vec![ForecastValue::new(t(8, 11, 0), 2.)]);
        }
    }

    #[async_std::test]
    async fn test_latest_forecast() {
        let conn = seeded().await;
        let forecast = forecast_for_gsp(&conn, 1, t(7, 0, 0), false).await.unwrap();
        assert!(!forecast.historic);
        assert_eq!(forecast.forecast_creation_time, t(8, 10, 0));
        assert_eq!(
            forecast.forecast_values,
            vec![
                ForecastValue::new(t(8, 10, 30), 21.),
                ForecastValue::new(t(8, 11, 0), 22.),
                ForecastValue::new(t(8, 11, 30), 23.),
            ]
        );
    }

    #[async_std::test]
    async fn test_historic_forecast() {
        let conn = seeded().await;
        let forecast = forecast_for_gsp(&conn, 1, t(7, 0, 0), true).await.unwrap();
        assert!(forecast.historic);
        assert_eq!(forecast.forecast_creation_time, t(8, 10, 0));
        assert_eq!(
            forecast.forecast_values,
            vec![
                ForecastValue::new(t(8, 10, 0), 10.),
                ForecastValue::new(t(8, 10, 30), 21.),
                ForecastValue::new(t(8, 11, 0), 22.),
                ForecastValue::new(t(8, 11, 30), 23.),
            ]
        );

        // Values before the start of the window are excluded.
        let forecast = forecast_for_gsp(&conn, 1, t(8, 10, 30), true)
            .await
            .unwrap();
        assert_eq!(forecast.forecast_values.len(), 3);
    }

    #[async_std::test]
    async fn test_missing_forecast() {
        let conn = seeded().await;
        let err = forecast_for_gsp(&conn, 3, t(7, 0, 0), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err}");
    }

    #[async_std::test]
    async fn test_all_forecasts() {
        let conn = seeded().await;
        let forecasts = all_forecasts(&conn, t(7, 0, 0), false).await.unwrap();
        // The national forecast is not included, and GSP 3 has no forecast.
        let gsp_ids = forecasts
            .forecasts
            .iter()
            .map(Forecast::gsp_id)
            .collect::<Vec<_>>();
        assert_eq!(gsp_ids, vec![Some(1), Some(2)]);
        assert!(forecasts.forecasts.iter().all(|forecast| !forecast.historic));

        let historic = all_forecasts(&conn, t(7, 0, 0), true).await.unwrap();
        assert!(historic.forecasts.iter().all(|forecast| forecast.historic));
        assert_eq!(historic.forecasts[0].forecast_values.len(), 4);
    }

    #[async_std::test]
    async fn test_national_forecast() {
        let conn = seeded().await;
        let forecast = national_forecast(&conn, t(7, 0, 0), false).await.unwrap();
        assert_eq!(forecast.gsp_id(), Some(NATIONAL_GSP_ID));
        assert_eq!(
            forecast.forecast_values,
            vec![ForecastValue::new(t(8, 11, 0), 500.)]
        );
    }

    #[async_std::test]
    async fn test_forecast_horizon() {
        let conn = seeded().await;

        // Without a horizon, we get the latest value for each target time.
        let values = latest_forecast_values(&conn, 1, t(7, 0, 0), None)
            .await
            .unwrap();
        assert_eq!(
            values
                .iter()
                .map(|value| value.expected_power_generation_megawatts)
                .collect::<Vec<_>>(),
            vec![10., 21., 22., 23.]
        );

        // With a 60 minute horizon, the 10:00 run only counts for targets at 11:00 or later, and
        // the 09:00 run only for targets at 10:00 or later.
        let values = latest_forecast_values(&conn, 1, t(7, 0, 0), Some(60))
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![
                ForecastValue::new(t(8, 10, 0), 10.),
                ForecastValue::new(t(8, 10, 30), 11.),
                ForecastValue::new(t(8, 11, 0), 22.),
                ForecastValue::new(t(8, 11, 30), 23.),
            ]
        );

        // With a long horizon, no run qualifies.
        let values = latest_forecast_values(&conn, 1, t(7, 0, 0), Some(24 * 60))
            .await
            .unwrap();
        assert!(values.is_empty());
    }

    #[async_std::test]
    async fn test_truths_for_gsp() {
        let conn = seeded().await;

        // Day-after values take precedence.
        let truths = truths_for_gsp(&conn, 1, t(7, 0, 0), None).await.unwrap();
        assert_eq!(
            truths,
            vec![
                gsp_yield(t(8, 10, 0), 2., Regime::DayAfter),
                gsp_yield(t(8, 10, 30), 3., Regime::InDay),
            ]
        );

        let truths = truths_for_gsp(&conn, 1, t(7, 0, 0), Some(Regime::InDay))
            .await
            .unwrap();
        assert_eq!(
            truths,
            vec![
                gsp_yield(t(8, 10, 0), 1., Regime::InDay),
                gsp_yield(t(8, 10, 30), 3., Regime::InDay),
            ]
        );

        // Older values appear once the window is widened.
        let truths = truths_for_gsp(&conn, 1, t(6, 0, 0), None).await.unwrap();
        assert_eq!(truths.len(), 3);

        assert!(national_truths(&conn, t(7, 0, 0), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[async_std::test]
    async fn test_truths_for_all_gsps() {
        let conn = seeded().await;
        let locations = truths_for_all_gsps(&conn, t(7, 0, 0), Some(Regime::DayAfter))
            .await
            .unwrap();
        assert_eq!(
            locations
                .iter()
                .map(|location| (location.gsp_id, location.gsp_yields.clone()))
                .collect::<Vec<_>>(),
            vec![
                (
                    Some(1),
                    Some(vec![gsp_yield(t(8, 10, 0), 2., Regime::DayAfter)])
                ),
                (Some(2), Some(vec![])),
                (Some(3), Some(vec![])),
            ]
        );
    }

    #[async_std::test]
    async fn test_status() {
        let conn = seeded().await;
        assert!(matches!(
            status(&conn).await.unwrap_err(),
            Error::NotFound { .. }
        ));

        let ok = Status {
            status: StatusLevel::Ok,
            message: "all good".into(),
        };
        conn.insert_status(&ok).await.unwrap();
        assert_eq!(status(&conn).await.unwrap(), ok);
    }

    #[async_std::test]
    async fn test_gsp_systems() {
        let conn = seeded().await;
        let all = gsp_systems(&conn, None).await.unwrap();
        assert_eq!(all, vec![location(1), location(2), location(3)]);
        let one = gsp_systems(&conn, Some(2)).await.unwrap();
        assert_eq!(one, vec![location(2)]);
        assert!(gsp_systems(&conn, Some(99)).await.unwrap().is_empty());
    }
}
