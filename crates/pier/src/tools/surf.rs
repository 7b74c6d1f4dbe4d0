use pier_core::tool::{Tool, ToolContext, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ApiError, MarineReading, Nominatim, OpenMeteo, Place, StormGlass, Toolbox,
    reading,
};

/// Parameters of [`SurfConditionsTool`].
#[derive(Deserialize, JsonSchema)]
pub struct SurfParameters {
    #[schemars(description = "Nom d'une ville ou d'un spot de surf.")]
    location: String,
}

/// Waist to overhead waves, long period swell and little wind.
pub fn is_dream_session(
    wave_height: Option<f64>,
    wave_period: Option<f64>,
    wind_speed: Option<f64>,
) -> bool {
    match (wave_height, wave_period, wind_speed) {
        (Some(height), Some(period), Some(wind)) => {
            (1.0..=2.2).contains(&height) && period >= 9.0 && wind <= 15.0
        }
        _ => false,
    }
}

/// Current surf conditions of a spot, as a JSON object.
///
/// Wind always comes from the Open-Meteo forecast. Waves and water
/// temperature come from StormGlass when a key is configured, from the
/// Open-Meteo marine API otherwise.
pub struct SurfConditionsTool {
    open_meteo: OpenMeteo,
    nominatim: Nominatim,
    stormglass: Option<StormGlass>,
    parameter_schema: Value,
}

impl SurfConditionsTool {
    /// Creates a surf tool using the toolbox clients.
    pub fn new(toolbox: &Toolbox) -> Self {
        Self {
            open_meteo: toolbox.open_meteo(),
            nominatim: toolbox.nominatim(),
            stormglass: toolbox.stormglass(),
            parameter_schema: schema_for!(SurfParameters).to_value(),
        }
    }
}

impl Tool for SurfConditionsTool {
    type Input = SurfParameters;

    fn name(&self) -> &str {
        "get_surf_conditions"
    }

    fn description(&self) -> &str {
        r#"
Obtient les conditions de surf actuelles (vagues, période, vent, rafales, température de l'eau) pour un lieu donné.
L'argument 'location' doit être un nom de ville ou de spot de surf."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SurfParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let open_meteo = self.open_meteo.clone();
        let nominatim = self.nominatim.clone();
        let stormglass = self.stormglass.clone();
        async move {
            let location = input.location;
            let place = match locate(&open_meteo, &nominatim, &location).await {
                Ok(Some(place)) => place,
                Ok(None) => {
                    return Ok(format!(
                        "Je n'ai même pas trouvé ton patelin paumé ({location}) sur une carte. Tu l'as inventé ?"
                    ));
                }
                Err(err) => return Ok(overheated(&location, err)),
            };
            match conditions(&open_meteo, stormglass.as_ref(), place).await {
                Ok(report) => Ok(report.to_string()),
                Err(err) => Ok(overheated(&location, err)),
            }
        }
    }
}

fn overheated(location: &str, err: ApiError) -> String {
    warn!("surf lookup for {location} failed: {err}");
    "Mon cerveau électronique surchauffe à cause de tes questions. Réessaie plus tard."
        .to_owned()
}

async fn locate(
    open_meteo: &OpenMeteo,
    nominatim: &Nominatim,
    location: &str,
) -> Result<Option<Place>, ApiError> {
    if let Some(place) = open_meteo.geocode(location).await? {
        return Ok(Some(place));
    }
    debug!("{location} unknown to Open-Meteo, asking Nominatim");
    nominatim.search(location).await
}

async fn conditions(
    open_meteo: &OpenMeteo,
    stormglass: Option<&StormGlass>,
    place: Place,
) -> Result<Value, ApiError> {
    let (lat, lon) = (place.latitude, place.longitude);
    let marine = async {
        match stormglass {
            Some(stormglass) => stormglass
                .current(lat, lon)
                .await
                .map(Option::unwrap_or_default),
            None => open_meteo.current_marine(lat, lon).await.map(|current| {
                MarineReading {
                    wave_height: current.wave_height,
                    wave_period: current.wave_period,
                    water_temperature: current.sea_surface_temperature,
                }
            }),
        }
    };
    let (weather, marine) =
        tokio::try_join!(open_meteo.current_weather(lat, lon), marine)?;

    let dream = is_dream_session(
        marine.wave_height,
        marine.wave_period,
        weather.wind_speed_10m,
    );
    if dream {
        info!("dream session at {}", place.name);
    }

    Ok(json!({
        "lieu": place.name,
        "vagues": reading(marine.wave_height, "m"),
        "periode": reading(marine.wave_period, "s"),
        "vent": reading(weather.wind_speed_10m, "km/h"),
        "rafales": reading(weather.wind_gusts_10m, "km/h"),
        "temperature_eau": reading(marine.water_temperature, "°C"),
        "session_de_reve": dream,
    }))
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::tools::Endpoints;

    async fn run(tool: &SurfConditionsTool, location: &str) -> String {
        tool.execute(
            SurfParameters {
                location: location.to_owned(),
            },
            ToolContext::default(),
        )
        .await
        .unwrap()
    }

    async fn mock_place(server: &mut Server) {
        server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_body(
                json!({"results": [{"name": "Plomeur", "latitude": 47.84, "longitude": -4.35}]})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_body(
                json!({"current": {"wind_speed_10m": 12.0, "wind_gusts_10m": 20.5}})
                    .to_string(),
            )
            .create_async()
            .await;
    }

    #[test]
    fn test_dream_session_bounds() {
        assert!(is_dream_session(Some(1.0), Some(9.0), Some(15.0)));
        assert!(is_dream_session(Some(2.2), Some(12.0), Some(0.0)));
        assert!(!is_dream_session(Some(0.9), Some(12.0), Some(5.0)));
        assert!(!is_dream_session(Some(2.3), Some(12.0), Some(5.0)));
        assert!(!is_dream_session(Some(1.5), Some(8.9), Some(5.0)));
        assert!(!is_dream_session(Some(1.5), Some(10.0), Some(15.1)));
        assert!(!is_dream_session(Some(1.5), Some(10.0), None));
    }

    #[tokio::test]
    async fn test_open_meteo_marine() {
        let mut server = Server::new_async().await;
        mock_place(&mut server).await;
        server
            .mock("GET", "/v1/marine")
            .match_query(Matcher::Any)
            .with_body(
                json!({"current": {"wave_height": 1.6, "wave_period": 11.0, "sea_surface_temperature": 14.2}})
                    .to_string(),
            )
            .create_async()
            .await;

        let tool = SurfConditionsTool::new(&Toolbox::new(Endpoints::all(&server.url())));
        let report: Value = serde_json::from_str(&run(&tool, "La Torche").await).unwrap();
        assert_eq!(
            report,
            json!({
                "lieu": "Plomeur",
                "vagues": "1.6m",
                "periode": "11.0s",
                "vent": "12.0km/h",
                "rafales": "20.5km/h",
                "temperature_eau": "14.2°C",
                "session_de_reve": true,
            })
        );
    }

    #[tokio::test]
    async fn test_stormglass_marine() {
        let mut server = Server::new_async().await;
        mock_place(&mut server).await;
        let marine = server
            .mock("GET", "/v1/marine")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        server
            .mock("GET", "/v2/weather/point")
            .match_query(Matcher::Any)
            .match_header("authorization", "sg-key")
            .with_body(
                json!({"hours": [{"waveHeight": {"sg": 0.4}, "wavePeriod": {"sg": 6.0}, "waterTemperature": {"noaa": 12.0}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let toolbox = Toolbox::new(Endpoints::all(&server.url()))
            .with_stormglass_key(Some("sg-key".to_owned()));
        let tool = SurfConditionsTool::new(&toolbox);
        let report: Value = serde_json::from_str(&run(&tool, "Brest").await).unwrap();
        assert_eq!(report["vagues"], "0.4m");
        assert_eq!(report["temperature_eau"], "12.0°C");
        assert_eq!(report["session_de_reve"], false);
        marine.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_place_and_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "Ys".into()))
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "Kerlouan".into()))
            .with_status(500)
            .create_async()
            .await;

        let tool = SurfConditionsTool::new(&Toolbox::new(Endpoints::all(&server.url())));
        assert_eq!(
            run(&tool, "Ys").await,
            "Je n'ai même pas trouvé ton patelin paumé (Ys) sur une carte. Tu l'as inventé ?"
        );
        assert!(run(&tool, "Kerlouan").await.starts_with("Mon cerveau électronique surchauffe"));
    }
}
