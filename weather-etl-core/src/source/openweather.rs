use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::{config::Units, error::FetchError, model::RawObservation};

use super::WeatherSource;

/// OpenWeather-style current weather endpoint:
/// `GET {base_url}?q={location}&appid={key}&units={units}`.
#[derive(Debug, Clone)]
pub struct OpenWeatherSource {
    base_url: String,
    api_key: String,
    units: Units,
    http: Client,
}

impl OpenWeatherSource {
    pub fn new(
        base_url: &str,
        api_key: &str,
        units: Units,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            units,
            http,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherSource {
    async fn fetch(&self, location: &str) -> Result<RawObservation, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            location: location.to_string(),
            source,
        };

        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = res.status();
        let body = res.text().await.map_err(transport)?;

        if !status.is_success() {
            debug!(location, %status, body = %truncate_body(&body), "weather request rejected");
            return Err(FetchError::Status {
                location: location.to_string(),
                status,
            });
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            location: location.to_string(),
            source,
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn source(server: &MockServer) -> OpenWeatherSource {
        OpenWeatherSource::new(
            &format!("{}/data/2.5/weather", server.uri()),
            "SECRET",
            Units::Metric,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn sends_location_key_and_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .and(query_param("appid", "SECRET"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "London"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = source(&server).fetch("London").await.expect("fetch");
        assert_eq!(body["name"], "London");
    }

    #[tokio::test]
    async fn non_success_status_is_item_local() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("city not found"))
            .mount(&server)
            .await;

        let err = source(&server).fetch("Atlantis").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status, .. } if status.as_u16() == 404));
        assert!(err.is_item_local());
    }

    #[tokio::test]
    async fn invalid_json_is_not_item_local() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = source(&server).fetch("London").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(!err.is_item_local());
    }

    #[tokio::test]
    async fn connection_failure_is_item_local() {
        let source = OpenWeatherSource::new(
            "http://127.0.0.1:1/data/2.5/weather",
            "SECRET",
            Units::Metric,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = source.fetch("London").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { ref location, .. } if location == "London"));
        assert!(err.is_item_local());
    }

    #[test]
    fn truncate_body_limits_length() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
