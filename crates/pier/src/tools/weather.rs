use pier_core::tool::{Tool, ToolContext, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, OpenMeteo, Toolbox, reading};

/// Parameters of [`WeatherTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WeatherParameters {
    #[schemars(description = "Nom de la ville.")]
    city: String,
}

/// Translates a WMO weather interpretation code.
pub fn sky_description(code: Option<u32>) -> &'static str {
    match code {
        Some(0) => "Ciel dégagé (pour une fois)",
        Some(1) => "Presque beau",
        Some(2) => "Un peu de nuages",
        Some(3) => "Couvert et gris",
        Some(45) => "Brouillard total",
        Some(48) => "Brouillard givrant",
        Some(51) => "Bruine légère",
        Some(61) => "Pluie",
        Some(63) => "Pluie forte",
        Some(71) => "Neige (prépare tes skis)",
        Some(95) => "Orage",
        _ => "Inconnu (mais probablement moche)",
    }
}

/// Current weather of a city, as a JSON object.
pub struct WeatherTool {
    open_meteo: OpenMeteo,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a weather tool using the toolbox clients.
    pub fn new(toolbox: &Toolbox) -> Self {
        Self {
            open_meteo: toolbox.open_meteo(),
            parameter_schema: schema_for!(WeatherParameters).to_value(),
        }
    }
}

impl Tool for WeatherTool {
    type Input = WeatherParameters;

    fn name(&self) -> &str {
        "get_weather_for_location"
    }

    fn description(&self) -> &str {
        "Obtenir la météo réelle (température, vent, ciel) pour une ville donnée."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WeatherParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let open_meteo = self.open_meteo.clone();
        async move {
            let report = match report(&open_meteo, &input.city).await {
                Ok(report) => report,
                Err(err) => {
                    warn!("weather lookup for {} failed: {err}", input.city);
                    json!({"erreur": "Mon baromètre est cassé, je ne vois rien."})
                }
            };
            Ok(report.to_string())
        }
    }
}

async fn report(open_meteo: &OpenMeteo, city: &str) -> Result<Value, ApiError> {
    let Some(place) = open_meteo.geocode(city).await? else {
        return Ok(json!({
            "erreur": format!("Je n'ai même pas trouvé {city} sur une carte.")
        }));
    };
    let current = open_meteo
        .current_weather(place.latitude, place.longitude)
        .await?;

    Ok(json!({
        "ville": place.name,
        "temp_air": reading(current.temperature_2m, "°C"),
        "vent": reading(current.wind_speed_10m, " km/h"),
        "ciel": sky_description(current.weather_code),
    }))
}
