use serde::Deserialize;

use super::{ApiError, Endpoints, endpoint, get_json};

/// A geocoded place.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Place {
    /// The place name as the geocoder spells it.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Current conditions from the forecast API.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CurrentWeather {
    /// Air temperature in °C.
    pub temperature_2m: Option<f64>,
    /// Relative humidity in %.
    pub relative_humidity_2m: Option<f64>,
    /// WMO weather interpretation code.
    pub weather_code: Option<u32>,
    /// Mean wind speed in km/h.
    pub wind_speed_10m: Option<f64>,
    /// Gusts in km/h.
    pub wind_gusts_10m: Option<f64>,
}

/// Current sea state from the marine API.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CurrentMarine {
    /// Significant wave height in meters.
    pub wave_height: Option<f64>,
    /// Wave period in seconds.
    pub wave_period: Option<f64>,
    /// Sea surface temperature in °C.
    pub sea_surface_temperature: Option<f64>,
}

#[derive(Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<Place>>,
}

#[derive(Deserialize)]
struct CurrentResponse<T> {
    current: Option<T>,
}

/// Client for the keyless Open-Meteo APIs.
#[derive(Clone, Debug)]
pub struct OpenMeteo {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
    marine_url: String,
}

impl OpenMeteo {
    /// Creates a client using the Open-Meteo URLs of `endpoints`.
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self {
            client,
            geocoding_url: endpoints.geocoding.clone(),
            forecast_url: endpoints.forecast.clone(),
            marine_url: endpoints.marine.clone(),
        }
    }

    /// Returns the best match for `name`, in French.
    pub async fn geocode(&self, name: &str) -> Result<Option<Place>, ApiError> {
        let url = endpoint(
            &self.geocoding_url,
            "/v1/search",
            &[
                ("name", name),
                ("count", "1"),
                ("language", "fr"),
                ("format", "json"),
            ],
        )?;
        let resp: GeocodingResponse = get_json(self.client.get(url)).await?;
        Ok(resp.results.and_then(|results| results.into_iter().next()))
    }

    /// Returns the current weather at a point.
    pub async fn current_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CurrentWeather, ApiError> {
        let (latitude, longitude) = (latitude.to_string(), longitude.to_string());
        let url = endpoint(
            &self.forecast_url,
            "/v1/forecast",
            &[
                ("latitude", &latitude),
                ("longitude", &longitude),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m,wind_gusts_10m",
                ),
                ("wind_speed_unit", "kmh"),
                ("timezone", "auto"),
            ],
        )?;
        let resp: CurrentResponse<CurrentWeather> =
            get_json(self.client.get(url)).await?;
        Ok(resp.current.unwrap_or_default())
    }

    /// Returns the current sea state at a point.
    pub async fn current_marine(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CurrentMarine, ApiError> {
        let (latitude, longitude) = (latitude.to_string(), longitude.to_string());
        let url = endpoint(
            &self.marine_url,
            "/v1/marine",
            &[
                ("latitude", &latitude),
                ("longitude", &longitude),
                ("current", "wave_height,wave_period,sea_surface_temperature"),
                ("timezone", "auto"),
            ],
        )?;
        let resp: CurrentResponse<CurrentMarine> =
            get_json(self.client.get(url)).await?;
        Ok(resp.current.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn client(server: &mockito::Server) -> OpenMeteo {
        OpenMeteo::new(reqwest::Client::new(), &Endpoints::all(&server.url()))
    }

    #[tokio::test]
    async fn test_geocode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "Brest".into()),
                Matcher::UrlEncoded("language".into(), "fr".into()),
            ]))
            .with_body(
                json!({"results": [{"name": "Brest", "latitude": 48.39, "longitude": -4.49, "country": "France"}]})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/v1/search")
            .match_query(Matcher::UrlEncoded("name".into(), "Atlantide".into()))
            .with_body(json!({"generationtime_ms": 0.5}).to_string())
            .create_async()
            .await;

        let open_meteo = client(&server);
        let place = open_meteo.geocode("Brest").await.unwrap().unwrap();
        assert_eq!(place.name, "Brest");
        assert_eq!(place.latitude, 48.39);
        assert!(open_meteo.geocode("Atlantide").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_weather_and_marine() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("latitude".into(), "48.39".into()),
                Matcher::UrlEncoded("wind_speed_unit".into(), "kmh".into()),
            ]))
            .with_body(
                json!({"current": {
                    "time": "2026-10-18T14:00",
                    "temperature_2m": 13.4,
                    "relative_humidity_2m": 88,
                    "weather_code": 61,
                    "wind_speed_10m": 24.1,
                    "wind_gusts_10m": 41.0,
                }})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/v1/marine")
            .match_query(Matcher::Any)
            .with_body(json!({"current": {"wave_height": 1.6}}).to_string())
            .create_async()
            .await;

        let open_meteo = client(&server);
        let weather = open_meteo.current_weather(48.39, -4.49).await.unwrap();
        assert_eq!(weather.weather_code, Some(61));
        assert_eq!(weather.wind_gusts_10m, Some(41.0));
        let marine = open_meteo.current_marine(48.39, -4.49).await.unwrap();
        assert_eq!(marine.wave_height, Some(1.6));
        assert_eq!(marine.wave_period, None);
    }

    #[tokio::test]
    async fn test_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server).current_weather(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, ApiError::Http(_)));
    }
}
