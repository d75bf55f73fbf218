//! Positioning providers supplying the initial map position.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::{
    config::{PositionConfig, PositionSource},
    models::Coordinates,
};

/// Resolves the user's position once, at startup.
#[derive(Debug, Clone)]
pub struct Locator {
    config: PositionConfig,
}

#[derive(Debug, Deserialize)]
struct IpLocation {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl Locator {
    /// Build a locator from configuration.
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    /// Resolve the position according to the configured source.
    pub async fn locate(&self) -> Result<Coordinates> {
        match self.config.source {
            PositionSource::Fixed => self
                .config
                .fixed()
                .ok_or_else(|| anyhow!("no fixed position configured")),
            PositionSource::Ip => self.locate_by_ip().await,
        }
    }

    async fn locate_by_ip(&self) -> Result<Coordinates> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let location: IpLocation = client
            .get(&self.config.endpoint)
            .send()
            .await
            .with_context(|| format!("failed to query {}", self.config.endpoint))?
            .error_for_status()
            .context("geolocation service returned an error status")?
            .json()
            .await
            .context("failed to parse geolocation response")?;
        let position = location.into_coordinates()?;
        info!(%position, endpoint = %self.config.endpoint, "position resolved");
        Ok(position)
    }
}

impl IpLocation {
    fn into_coordinates(self) -> Result<Coordinates> {
        if self.status.as_deref() == Some("fail") {
            return Err(anyhow!(
                "geolocation failed: {}",
                self.message.as_deref().unwrap_or("no reason given")
            ));
        }
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(anyhow!("geolocation response has no coordinates"));
        };
        let position = Coordinates::new(lat, lon);
        if !position.is_finite() {
            return Err(anyhow!("geolocation returned invalid coordinates"));
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_source_returns_configured_position() -> Result<()> {
        let locator = Locator::new(PositionConfig {
            source: PositionSource::Fixed,
            latitude: Some(52.1),
            longitude: Some(4.3),
            ..PositionConfig::default()
        });
        assert_eq!(locator.locate().await?, Coordinates::new(52.1, 4.3));
        Ok(())
    }

    #[tokio::test]
    async fn fixed_source_without_position_fails() {
        let locator = Locator::new(PositionConfig {
            source: PositionSource::Fixed,
            ..PositionConfig::default()
        });
        assert!(locator.locate().await.is_err());
    }

    fn parse_ip_location(body: &str) -> Result<Coordinates> {
        serde_json::from_str::<IpLocation>(body)?.into_coordinates()
    }

    #[test]
    fn parses_ip_api_payloads() -> Result<()> {
        let ok = r#"{"status":"success","country":"Netherlands","lat":52.3759,"lon":4.8975}"#;
        assert_eq!(parse_ip_location(ok)?, Coordinates::new(52.3759, 4.8975));

        let failed = r#"{"status":"fail","message":"reserved range"}"#;
        let err = parse_ip_location(failed).unwrap_err();
        assert!(err.to_string().contains("reserved range"));

        assert!(parse_ip_location(r#"{"status":"success"}"#).is_err());
        assert!(parse_ip_location("<html>").is_err());
        Ok(())
    }
}
