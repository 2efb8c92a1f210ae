//! Core library for the `weather-etl` pipeline.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The weather source and blob store seams, with their backends
//! - The two stages ([`Extractor`], [`Transformer`]) and the latest-object locator
//!
//! Stages communicate only through the blob store. Both take their store and
//! source handles explicitly so embeddings (CLI, scheduler, tests) choose them.

pub mod config;
pub mod error;
pub mod extract;
pub mod keys;
pub mod locate;
pub mod model;
pub mod source;
pub mod store;
pub mod transform;

pub use config::{Config, StoreBackend, StoreConfig, Units, WeatherConfig};
pub use error::{EtlError, FetchError, StoreError};
pub use extract::{ExtractReport, Extractor};
pub use locate::latest_key;
pub use model::{RawObservation, StageResult, Status, TransformedRecord};
pub use source::{WeatherSource, source_from_config};
pub use store::{BlobMeta, BlobStore, store_from_config};
pub use transform::{TransformReport, Transformer};
