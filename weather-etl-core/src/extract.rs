//! Extraction stage: fetch every configured location and land the raw batch.

use chrono::Utc;
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::{EtlError, Result},
    keys,
    model::{RawObservation, StageResult},
    source::WeatherSource,
    store::{BlobStore, CONTENT_TYPE_JSON},
};

/// What one extraction run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractReport {
    pub key: String,
    pub records: usize,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    source: Arc<dyn WeatherSource>,
    store: Arc<dyn BlobStore>,
    locations: Vec<String>,
    raw_prefix: String,
    concurrency: usize,
    verify_upload: bool,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn BlobStore>,
        locations: Vec<String>,
        raw_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            locations,
            raw_prefix: raw_prefix.into(),
            concurrency: 1,
            verify_upload: false,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self::new(
            source,
            store,
            config.weather.locations.clone(),
            config.store.raw_prefix.clone(),
        )
        .with_concurrency(config.weather.concurrency)
        .with_verify_upload(config.weather.verify_upload)
    }

    /// Allow up to `n` fetches in flight. Batch order stays location order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_verify_upload(mut self, verify: bool) -> Self {
        self.verify_upload = verify;
        self
    }

    /// Entry point for schedulers and the CLI. Never fails; errors are
    /// reported in the returned result.
    pub async fn run(&self) -> StageResult {
        match self.try_run().await {
            Ok(report) => {
                info!(key = %report.key, records = report.records, dropped = report.dropped.len(), "raw batch stored");
                StageResult::success(format!(
                    "Weather data for {} location(s) uploaded to {}",
                    report.records, report.key
                ))
                .with_key(report.key)
                .with_records(report.records)
                .with_dropped(report.dropped)
            }
            Err(e) => {
                error!(error = %e, "extraction failed");
                StageResult::error(e.to_string())
            }
        }
    }

    pub async fn try_run(&self) -> Result<ExtractReport> {
        let (batch, dropped) = self.fetch_all().await?;
        let body = to_pretty_json(&batch)?;

        let key = keys::raw_key(&self.raw_prefix, Utc::now());
        self.store.put(&key, body, CONTENT_TYPE_JSON).await?;

        if self.verify_upload {
            match self.store.head(&key).await {
                Ok(meta) => info!(key = %key, size = meta.size, "raw object verified"),
                Err(e) => warn!(key = %key, error = %e, "raw object could not be verified"),
            }
        }

        Ok(ExtractReport {
            key,
            records: batch.len(),
            dropped,
        })
    }

    /// Fetch every location in order. Returns the raw batch and the
    /// locations that were dropped.
    pub async fn fetch_all(&self) -> Result<(Vec<RawObservation>, Vec<String>)> {
        let mut fetches = stream::iter(&self.locations)
            .map(|location| async move {
                info!(location = %location, "fetching weather");
                (location, self.source.fetch(location).await)
            })
            .buffered(self.concurrency);

        let mut batch = Vec::with_capacity(self.locations.len());
        let mut dropped = Vec::new();

        while let Some((location, outcome)) = fetches.next().await {
            match outcome {
                Ok(observation) => batch.push(observation),
                Err(e) if e.is_item_local() => {
                    warn!(location = %location, error = %e, "skipping location");
                    dropped.push(location.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((batch, dropped))
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser).map_err(|e| EtlError::Encode {
        what: "raw batch",
        reason: e.to_string(),
    })?;
    Ok(out)
}
