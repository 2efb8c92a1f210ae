use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Unmodified JSON object returned by the weather endpoint for one location.
pub type RawObservation = Value;

/// Column order of the transformed CSV. Downstream consumers parse positionally.
pub const COLUMNS: [&str; 9] = [
    "City",
    "Temperature_C",
    "Feels_Like_C",
    "Humidity",
    "Pressure_hPa",
    "Wind_Speed_mps",
    "Wind_Degree",
    "Weather_Description",
    "Timestamp",
];

/// Rendering of [`TransformedRecord::timestamp`] in CSV.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One flattened reading. Numbers are kept as the endpoint sent them so that
/// integers stay integers in the CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    pub city: String,
    pub temperature_c: Option<Number>,
    pub feels_like_c: Option<Number>,
    pub humidity: Option<Number>,
    pub pressure_hpa: Option<Number>,
    pub wind_speed_mps: Option<Number>,
    pub wind_degree: Option<Number>,
    pub weather_description: String,
    /// Processing time, not observation time.
    pub timestamp: DateTime<Utc>,
}

impl TransformedRecord {
    /// Fields rendered as CSV cells, in [`COLUMNS`] order. Null is an empty cell.
    pub fn to_row(&self) -> [String; 9] {
        let num = |n: &Option<Number>| n.as_ref().map(Number::to_string).unwrap_or_default();

        [
            self.city.clone(),
            num(&self.temperature_c),
            num(&self.feels_like_c),
            num(&self.humidity),
            num(&self.pressure_hpa),
            num(&self.wind_speed_mps),
            num(&self.wind_degree),
            self.weather_description.clone(),
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ]
    }
}

/// Outcome status reported to whatever triggered a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Structured result every stage entry point returns instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub status: Status,
    pub message: String,

    /// Key of the object written by the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,

    /// Locations whose fetch failed and were left out of the raw batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_locations: Vec<String>,
}

impl StageResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            key: None,
            records: None,
            dropped_locations: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            ..Self::success(message)
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_dropped(mut self, dropped: Vec<String>) -> Self {
        self.dropped_locations = dropped;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn row_renders_nulls_as_empty_cells() {
        let record = TransformedRecord {
            city: "X".into(),
            temperature_c: Some(10.into()),
            feels_like_c: None,
            humidity: Some(80.into()),
            pressure_hpa: None,
            wind_speed_mps: Number::from_f64(3.5),
            wind_degree: None,
            weather_description: "clear".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 7, 5, 9).unwrap(),
        };

        assert_eq!(
            record.to_row(),
            ["X", "10", "", "80", "", "3.5", "", "clear", "2025-03-01 07:05:09"]
        );
    }

    #[test]
    fn stage_result_serializes_contract_fields() {
        let ok = StageResult::success("done");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "message": "done"}));

        let err = StageResult::error("boom").with_dropped(vec!["Glasgow".into()]);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["dropped_locations"][0], "Glasgow");
        assert!(!err.is_success());
    }
}
