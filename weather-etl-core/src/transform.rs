//! Transformation stage: flatten the latest raw batch into CSV.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    error::{EtlError, Result},
    keys, locate,
    model::{COLUMNS, StageResult, TransformedRecord},
    store::{BlobStore, CONTENT_TYPE_CSV},
};

/// What one transformation run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformReport {
    pub source_key: String,
    pub key: String,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    store: Arc<dyn BlobStore>,
    raw_prefix: String,
    transformed_prefix: String,
}

impl Transformer {
    pub fn new(
        store: Arc<dyn BlobStore>,
        raw_prefix: impl Into<String>,
        transformed_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            raw_prefix: raw_prefix.into(),
            transformed_prefix: transformed_prefix.into(),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn BlobStore>) -> Self {
        Self::new(
            store,
            config.store.raw_prefix.clone(),
            config.store.transformed_prefix.clone(),
        )
    }

    /// Transform the newest raw object. Never fails; errors are reported in
    /// the returned result.
    pub async fn run(&self) -> StageResult {
        Self::report(self.try_run(None).await)
    }

    /// Transform an explicitly named raw object instead of the newest one.
    pub async fn run_key(&self, raw_key: &str) -> StageResult {
        Self::report(self.try_run(Some(raw_key)).await)
    }

    fn report(outcome: Result<TransformReport>) -> StageResult {
        match outcome {
            Ok(report) => {
                info!(source = %report.source_key, key = %report.key, records = report.records, "transformed batch stored");
                StageResult::success(format!(
                    "Transformed {} record(s) from {} into {}",
                    report.records, report.source_key, report.key
                ))
                .with_key(report.key)
                .with_records(report.records)
            }
            Err(e) => {
                error!(error = %e, "transformation failed");
                StageResult::error(e.to_string())
            }
        }
    }

    pub async fn try_run(&self, raw_key: Option<&str>) -> Result<TransformReport> {
        let source_key = match raw_key {
            Some(key) => key.to_string(),
            None => locate::latest_key(self.store.as_ref(), &self.raw_prefix).await?,
        };
        info!(key = %source_key, "reading raw batch");

        let raw = self.store.get(&source_key).await?;
        let now = Utc::now();
        let records = transform_batch(&raw, now)?;
        debug!(records = ?records, "transformed records");

        let body = to_csv(&records)?;
        let key = keys::transformed_key(&self.transformed_prefix, now);
        self.store.put(&key, body, CONTENT_TYPE_CSV).await?;

        Ok(TransformReport {
            source_key,
            key,
            records: records.len(),
        })
    }
}

/// Decode a raw batch and project every observation, in order.
///
/// Either the whole batch projects or nothing does.
pub fn transform_batch(raw: &[u8], processed_at: DateTime<Utc>) -> Result<Vec<TransformedRecord>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| EtlError::MalformedInput(format!("raw batch is not UTF-8: {e}")))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| EtlError::MalformedInput(format!("raw batch is not JSON: {e}")))?;

    let observations = match value {
        Value::Array(items) => items,
        other => {
            return Err(EtlError::MalformedInput(format!(
                "expected a JSON array, found {}",
                kind(&other)
            )));
        }
    };

    observations
        .iter()
        .enumerate()
        .map(|(idx, obs)| project(idx, obs, processed_at))
        .collect()
}

/// Flatten one observation. Absent fields become null (numbers) or empty
/// strings; containers of the wrong JSON type are malformed input.
pub fn project(idx: usize, obs: &Value, processed_at: DateTime<Utc>) -> Result<TransformedRecord> {
    let obs = obs.as_object().ok_or_else(|| {
        EtlError::MalformedInput(format!("record {idx} is {}, not an object", kind(obs)))
    })?;

    let main = section(idx, obs, "main")?;
    let wind = section(idx, obs, "wind")?;

    Ok(TransformedRecord {
        city: text(obs, "name"),
        temperature_c: number(main, "temp"),
        feels_like_c: number(main, "feels_like"),
        humidity: number(main, "humidity"),
        pressure_hpa: number(main, "pressure"),
        wind_speed_mps: number(wind, "speed"),
        wind_degree: number(wind, "deg"),
        weather_description: description(idx, obs)?,
        timestamp: processed_at,
    })
}

fn section<'a>(
    idx: usize,
    obs: &'a Map<String, Value>,
    field: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match obs.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(EtlError::MalformedInput(format!(
            "record {idx}: `{field}` is {}, not an object",
            kind(other)
        ))),
    }
}

fn description(idx: usize, obs: &Map<String, Value>) -> Result<String> {
    let first = match obs.get("weather") {
        None | Some(Value::Null) => return Ok(String::new()),
        Some(Value::Array(items)) => items.first(),
        Some(other) => {
            return Err(EtlError::MalformedInput(format!(
                "record {idx}: `weather` is {}, not an array",
                kind(other)
            )));
        }
    };

    match first {
        // An empty `weather` list carries no description.
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::Object(entry)) => Ok(text(entry, "description")),
        Some(other) => Err(EtlError::MalformedInput(format!(
            "record {idx}: `weather[0]` is {}, not an object",
            kind(other)
        ))),
    }
}

fn number(map: Option<&Map<String, Value>>, field: &str) -> Option<Number> {
    match map?.get(field) {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    }
}

fn text(map: &Map<String, Value>, field: &str) -> String {
    map.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render records as CSV with a header row in [`COLUMNS`] order.
pub fn to_csv(records: &[TransformedRecord]) -> Result<Vec<u8>> {
    let encode = |e: csv::Error| EtlError::Encode {
        what: "transformed batch",
        reason: e.to_string(),
    };

    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(COLUMNS).map_err(encode)?;
    for record in records {
        wtr.write_record(record.to_row()).map_err(encode)?;
    }

    wtr.into_inner().map_err(|e| EtlError::Encode {
        what: "transformed batch",
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 7, 5, 9).unwrap()
    }

    fn batch(observations: &[Value]) -> Vec<u8> {
        serde_json::to_vec(observations).unwrap()
    }

    fn full(name: &str, temp: f64) -> Value {
        json!({
            "name": name,
            "main": {"temp": temp, "feels_like": temp - 1.5, "humidity": 71, "pressure": 1012},
            "wind": {"speed": 4.1, "deg": 250},
            "weather": [{"description": "light rain"}, {"description": "mist"}]
        })
    }

    #[test]
    fn sparse_observation_projects_to_nulls() {
        let obs = json!({
            "name": "X",
            "main": {"temp": 10, "humidity": 80},
            "wind": {"speed": 3},
            "weather": [{"description": "clear"}]
        });

        let record = project(0, &obs, at()).unwrap();
        assert_eq!(
            record,
            TransformedRecord {
                city: "X".into(),
                temperature_c: Some(10.into()),
                feels_like_c: None,
                humidity: Some(80.into()),
                pressure_hpa: None,
                wind_speed_mps: Some(3.into()),
                wind_degree: None,
                weather_description: "clear".into(),
                timestamp: at(),
            }
        );
        assert_eq!(
            record.to_row(),
            ["X", "10", "", "80", "", "3", "", "clear", "2025-03-01 07:05:09"]
        );
    }

    #[test]
    fn missing_sections_are_null_or_empty() {
        let record = project(0, &json!({}), at()).unwrap();
        assert_eq!(record.city, "");
        assert_eq!(record.temperature_c, None);
        assert_eq!(record.wind_degree, None);
        assert_eq!(record.weather_description, "");

        let record = project(0, &json!({"name": "Y", "weather": []}), at()).unwrap();
        assert_eq!(record.city, "Y");
        assert_eq!(record.weather_description, "");
    }

    #[test]
    fn wrong_leaf_types_are_treated_as_absent() {
        let obs = json!({"name": 7, "main": {"temp": "hot"}, "weather": [{"description": 1}]});
        let record = project(0, &obs, at()).unwrap();
        assert_eq!(record.city, "");
        assert_eq!(record.temperature_c, None);
        assert_eq!(record.weather_description, "");
    }

    #[test]
    fn batch_preserves_order_and_length() {
        let raw = serde_json::to_vec(&json!([full("B", 1.0), full("A", 2.5), {"name": "C"}]))
            .unwrap();

        let records = transform_batch(&raw, at()).unwrap();
        let cities: Vec<_> = records.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(cities, vec!["B", "A", "C"]);
        assert_eq!(records[1].temperature_c, Number::from_f64(2.5));
        assert_eq!(records[0].weather_description, "light rain");
        assert!(records.iter().all(|r| r.timestamp == at()));
    }

    #[test]
    fn malformed_batches_fail_whole() {
        let cases: &[&[u8]] = &[
            br#"{"name": "X"}"#,
            b"[1, 2]",
            br#"[{"name": "A"}, {"main": "warm"}]"#,
            br#"[{"weather": {"description": "clear"}}]"#,
            br#"[{"weather": ["clear"]}]"#,
            b"not json",
            &[0xff, 0xfe],
        ];

        for raw in cases {
            let err = transform_batch(raw, at()).unwrap_err();
            assert!(matches!(err, EtlError::MalformedInput(_)), "{err}");
        }
    }

    #[test]
    fn csv_has_fixed_header_and_roundtrips_as_strings() {
        let raw = serde_json::to_vec(&json!([
            full("London", 12.3),
            {"name": "Quoted, \"Town\"", "main": {"temp": 10}}
        ]))
        .unwrap();
        let records = transform_batch(&raw, at()).unwrap();
        let csv_bytes = to_csv(&records).unwrap();

        let mut rdr = csv::Reader::from_reader(csv_bytes.as_slice());
        let header: Vec<_> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, COLUMNS);

        let rows: Vec<Vec<String>> = rdr
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(rows.len(), records.len());
        for (row, record) in rows.iter().zip(&records) {
            assert_eq!(row.as_slice(), record.to_row().as_slice());
        }
        assert_eq!(rows[0][0], "London");
        assert_eq!(rows[0][1], "12.3");
        assert_eq!(rows[1][0], "Quoted, \"Town\"");
    }

    #[tokio::test]
    async fn run_transforms_latest_raw_object() {
        let store = Arc::new(MemoryStore::new());
        let old = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        store.insert_at("raw/z_old.json", batch(&[full("Old", 1.0)]), old);
        store.insert_at("raw/a_new.json", batch(&[full("New", 2.0)]), new);

        let transformer = Transformer::new(store.clone(), "raw", "transformed");
        let result = transformer.run().await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.records, Some(1));

        let key = result.key.expect("key");
        assert!(key.starts_with("transformed/weather_transformed_"));
        assert!(key.ends_with(".csv"));
        assert_eq!(store.content_type(&key).as_deref(), Some(CONTENT_TYPE_CSV));

        let csv_text = String::from_utf8(store.get(&key).await.unwrap()).unwrap();
        assert!(csv_text.starts_with("City,Temperature_C,Feels_Like_C,Humidity,Pressure_hPa,"));
        assert!(csv_text.contains("\nNew,2.0,0.5,71,1012,4.1,250,light rain,"));
    }

    #[tokio::test]
    async fn run_key_bypasses_locator() {
        let store = Arc::new(MemoryStore::new());
        let old = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.insert_at("raw/chosen.json", batch(&[full("Chosen", 1.0)]), old);
        store.insert_at("raw/newer.json", "[]", Utc::now());

        let transformer = Transformer::new(store.clone(), "raw", "transformed");
        let report = transformer.try_run(Some("raw/chosen.json")).await.unwrap();
        assert_eq!(report.source_key, "raw/chosen.json");
        assert_eq!(report.records, 1);
    }

    #[tokio::test]
    async fn empty_prefix_reports_error_and_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let transformer = Transformer::new(store.clone(), "raw", "transformed");

        let result = transformer.run().await;
        assert!(!result.is_success());
        assert!(result.message.contains("no objects found"), "{}", result.message);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn malformed_raw_object_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert_at("raw/bad.json", r#"{"not": "an array"}"#, Utc::now());

        let result = Transformer::new(store.clone(), "raw", "transformed").run().await;
        assert!(!result.is_success());
        assert!(result.message.contains("malformed raw batch"), "{}", result.message);
        assert_eq!(store.keys(), vec!["raw/bad.json"]);
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let store = Arc::new(MemoryStore::failing_writes());
        store.insert_at("raw/ok.json", "[]", Utc::now());

        let result = Transformer::new(store, "raw", "transformed").run().await;
        assert!(!result.is_success());
        assert!(result.message.contains("rejects writes"));
    }
}
