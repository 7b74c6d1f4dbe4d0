use std::collections::HashMap;

use serde::Deserialize;

use super::{ApiError, endpoint, get_json};

/// Marine data from the first forecast hour.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarineReading {
    /// Wave height in meters.
    pub wave_height: Option<f64>,
    /// Wave period in seconds.
    pub wave_period: Option<f64>,
    /// Water temperature in °C.
    pub water_temperature: Option<f64>,
}

// Each parameter is reported by several models, keyed by source name.
type Sources = HashMap<String, f64>;

#[derive(Deserialize)]
struct PointResponse {
    #[serde(default)]
    hours: Vec<Hour>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hour {
    #[serde(default)]
    wave_height: Sources,
    #[serde(default)]
    wave_period: Sources,
    #[serde(default)]
    water_temperature: Sources,
}

fn preferred(sources: &Sources) -> Option<f64> {
    sources.get("sg").or_else(|| sources.get("noaa")).copied()
}

/// StormGlass point forecasts.
#[derive(Clone)]
pub struct StormGlass {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl StormGlass {
    /// Creates a client authenticating with `api_key`.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
            api_key: api_key.to_owned(),
        }
    }

    /// Returns the first forecast hour at a point, `None` if there is none.
    pub async fn current(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<MarineReading>, ApiError> {
        let (latitude, longitude) = (latitude.to_string(), longitude.to_string());
        let url = endpoint(
            &self.base_url,
            "/v2/weather/point",
            &[
                ("lat", &latitude),
                ("lng", &longitude),
                ("params", "waveHeight,wavePeriod,waterTemperature"),
            ],
        )?;
        let resp: PointResponse = get_json(
            self.client.get(url).header("Authorization", &self.api_key),
        )
        .await?;

        Ok(resp.hours.first().map(|hour| MarineReading {
            wave_height: preferred(&hour.wave_height),
            wave_period: preferred(&hour.wave_period),
            water_temperature: preferred(&hour.water_temperature),
        }))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_prefers_sg_then_noaa() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/weather/point")
            .match_header("authorization", "sg-key")
            .match_query(Matcher::UrlEncoded("lat".into(), "47.8".into()))
            .with_body(
                json!({"hours": [
                    {
                        "time": "2026-10-18T00:00:00+00:00",
                        "waveHeight": {"noaa": 1.4, "sg": 1.5},
                        "wavePeriod": {"noaa": 11.2},
                        "waterTemperature": {"meto": 14.0},
                    },
                    {"waveHeight": {"sg": 3.0}},
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let storm_glass = StormGlass::new(reqwest::Client::new(), &server.url(), "sg-key");
        let reading = storm_glass.current(47.8, -4.35).await.unwrap().unwrap();
        assert_eq!(
            reading,
            MarineReading {
                wave_height: Some(1.5),
                wave_period: Some(11.2),
                water_temperature: None,
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_hours() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/weather/point")
            .match_query(Matcher::Any)
            .with_body(json!({"hours": [], "meta": {}}).to_string())
            .create_async()
            .await;

        let storm_glass = StormGlass::new(reqwest::Client::new(), &server.url(), "k");
        assert!(storm_glass.current(0.0, 0.0).await.unwrap().is_none());
    }
}
