//! The entities returned by the Nowcasting API.
//!
//! All of these types serialize to JSON with camelCase field names, which is the format clients of
//! the API expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The GSP ID of the national location.
pub const NATIONAL_GSP_ID: i32 = 0;

/// The number of regional GSPs run by National Grid.
pub const N_GSP: i32 = 317;

/// The IDs of all regional GSPs.
pub fn regional_gsp_ids() -> Vec<i32> {
    (1..=N_GSP).collect()
}

/// A location for which forecasts and truth values are reported.
///
/// This is either the whole of Great Britain (GSP ID 0) or a single grid supply point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// A human readable label, such as "GSP_122".
    pub label: String,
    /// The National Grid ID of this GSP, if this location is a GSP.
    #[serde(default)]
    pub gsp_id: Option<i32>,
    /// The National Grid name of this GSP (for example "FIDF_1").
    #[serde(default)]
    pub gsp_name: Option<String>,
    /// The group of GSPs this location belongs to.
    #[serde(default)]
    pub gsp_group: Option<String>,
    /// The name of the region served (for example "Fiddlers Ferry").
    #[serde(default)]
    pub region_name: Option<String>,
    /// The installed photovoltaic capacity at this location, in megawatts.
    #[serde(default)]
    pub installed_capacity_mw: Option<f64>,
    /// Truth values for this location, when they have been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsp_yields: Option<Vec<GspYield>>,
}

/// The machine learning model which produced a forecast.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlModel {
    pub name: String,
    pub version: String,
}

/// When each of the inputs to a forecast was last refreshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDataLastUpdated {
    pub gsp: DateTime<Utc>,
    pub nwp: DateTime<Utc>,
    pub pv: DateTime<Utc>,
    pub satellite: DateTime<Utc>,
}

/// The forecasted generation at a single point in time.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastValue {
    /// The time this value is a forecast for.
    pub target_time: DateTime<Utc>,
    /// Expected PV generation, in megawatts.
    pub expected_power_generation_megawatts: f64,
    /// Expected PV generation as a fraction of installed capacity.
    ///
    /// This is only filled in once the containing forecast has been
    /// [normalized](Forecast::normalize).
    #[serde(default)]
    pub expected_power_generation_normalized: Option<f64>,
}

impl ForecastValue {
    /// A forecast value which has not been normalized.
    pub fn new(target_time: DateTime<Utc>, megawatts: f64) -> Self {
        Self {
            target_time,
            expected_power_generation_megawatts: megawatts,
            expected_power_generation_normalized: None,
        }
    }
}

/// A solar forecast for one location.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub location: Location,
    pub model: MlModel,
    pub forecast_creation_time: DateTime<Utc>,
    /// Whether this forecast was assembled from the latest values of many forecasts, rather than
    /// being a single forecast run.
    #[serde(default)]
    pub historic: bool,
    pub forecast_values: Vec<ForecastValue>,
    pub input_data_last_updated: InputDataLastUpdated,
}

impl Forecast {
    /// Fill in the normalized generation of each value, relative to the installed capacity of
    /// the location.
    ///
    /// If the capacity of the location is unknown or not positive, the values are left as they
    /// are.
    pub fn normalize(&mut self) {
        let Some(capacity) = self.location.installed_capacity_mw.filter(|mw| *mw > 0.) else {
            tracing::debug!("location {} has no installed capacity", self.location.label);
            return;
        };
        for value in &mut self.forecast_values {
            value.expected_power_generation_normalized =
                Some(value.expected_power_generation_megawatts / capacity);
        }
    }

    /// The GSP ID of the location of this forecast.
    pub fn gsp_id(&self) -> Option<i32> {
        self.location.gsp_id
    }
}

/// A collection of forecasts, typically one per GSP.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManyForecasts {
    pub forecasts: Vec<Forecast>,
}

impl ManyForecasts {
    /// [Normalize](Forecast::normalize) every forecast.
    pub fn normalize(&mut self) {
        for forecast in &mut self.forecasts {
            forecast.normalize();
        }
    }
}

/// The PV_Live regime of a truth value.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Regime {
    /// Readings reported throughout the day.
    InDay,
    /// Finalized readings, published the following day.
    DayAfter,
}

/// A PV_Live estimate of the solar generation at a GSP.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GspYield {
    pub datetime_utc: DateTime<Utc>,
    pub solar_generation_kw: f64,
    pub regime: Regime,
}

/// The severity of a service status message.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusLevel {
    Ok,
    Warning,
    Error,
}

/// The operational status of the forecast service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub status: StatusLevel,
    pub message: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn location(capacity: Option<f64>) -> Location {
        Location {
            label: "GSP_1".into(),
            gsp_id: Some(1),
            gsp_name: None,
            gsp_group: None,
            region_name: None,
            installed_capacity_mw: capacity,
            gsp_yields: None,
        }
    }

    fn forecast(capacity: Option<f64>) -> Forecast {
        let t = Utc.with_ymd_and_hms(2022, 9, 8, 12, 0, 0).unwrap();
        Forecast {
            location: location(capacity),
            model: MlModel {
                name: "cnn".into(),
                version: "1".into(),
            },
            forecast_creation_time: t,
            historic: false,
            forecast_values: vec![ForecastValue::new(t, 50.), ForecastValue::new(t, 20.)],
            input_data_last_updated: InputDataLastUpdated {
                gsp: t,
                nwp: t,
                pv: t,
                satellite: t,
            },
        }
    }

    #[test]
    fn test_normalize() {
        let mut forecast = forecast(Some(100.));
        forecast.normalize();
        let normalized = forecast
            .forecast_values
            .iter()
            .map(|value| value.expected_power_generation_normalized)
            .collect::<Vec<_>>();
        assert_eq!(normalized, vec![Some(0.5), Some(0.2)]);
    }

    #[test]
    fn test_normalize_without_capacity() {
        for capacity in [None, Some(0.)] {
            let mut forecast = forecast(capacity);
            forecast.normalize();
            assert!(forecast
                .forecast_values
                .iter()
                .all(|value| value.expected_power_generation_normalized.is_none()));
        }
    }

    #[test]
    fn test_camel_case() {
        let value = ForecastValue::new(Utc.with_ymd_and_hms(2022, 9, 8, 12, 30, 0).unwrap(), 1.5);
        assert_eq!(
            serde_json::to_value(value).unwrap(),
            json!({
                "targetTime": "2022-09-08T12:30:00Z",
                "expectedPowerGenerationMegawatts": 1.5,
                "expectedPowerGenerationNormalized": null,
            })
        );
    }

    #[test]
    fn test_location_omits_missing_yields() {
        let value = serde_json::to_value(location(Some(10.))).unwrap();
        assert!(value.get("gspYields").is_none());
        assert_eq!(value["installedCapacityMw"], json!(10.0));
    }

    #[test]
    fn test_regime_forms() {
        assert_eq!(Regime::DayAfter.to_string(), "day-after");
        assert_eq!("in-day".parse::<Regime>().unwrap(), Regime::InDay);
        assert_eq!(
            serde_json::from_value::<Regime>(json!("day-after")).unwrap(),
            Regime::DayAfter
        );
    }
}
