use crate::{
    config::WeatherConfig,
    error::FetchError,
    model::RawObservation,
    source::openweather::OpenWeatherSource,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Remote JSON endpoint that returns the current reading for one location.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, location: &str) -> Result<RawObservation, FetchError>;
}

/// Construct the HTTP weather source from config.
pub fn source_from_config(config: &WeatherConfig) -> anyhow::Result<OpenWeatherSource> {
    let api_key = config.api_key()?;

    OpenWeatherSource::new(&config.base_url, api_key, config.units, config.timeout())
}
