//! Tools the personas can call, and the web APIs behind them.

mod duckduckgo;
mod knowledge;
mod location;
mod nominatim;
mod open_meteo;
mod stormglass;
mod surf;
mod weather;
mod wine;

use std::time::Duration;

use pier_rag::KnowledgeBase;
use serde::de::DeserializeOwned;
use url::Url;

pub use duckduckgo::{DuckDuckGo, MAX_RESULTS, SearchResult};
pub use knowledge::KnowledgeTool;
pub use location::UserLocationTool;
pub use nominatim::Nominatim;
pub use open_meteo::{CurrentMarine, CurrentWeather, OpenMeteo, Place};
pub use stormglass::{MarineReading, StormGlass};
pub use surf::{SurfConditionsTool, is_dream_session};
pub use weather::{WeatherTool, sky_description};
pub use wine::{WinePricesTool, WineRecommendationsTool, WineWebSearchTool};

/// Sent with every request. Nominatim rejects anonymous clients.
pub const USER_AGENT: &str =
    concat!("pier/", env!("CARGO_PKG_VERSION"), " (surf and wine agent)");

/// Base URLs of the web APIs, without trailing paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// Open-Meteo geocoding.
    pub geocoding: String,
    /// Open-Meteo forecast.
    pub forecast: String,
    /// Open-Meteo marine.
    pub marine: String,
    /// OpenStreetMap Nominatim.
    pub nominatim: String,
    /// StormGlass.
    pub stormglass: String,
    /// DuckDuckGo HTML search.
    pub duckduckgo: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocoding: "https://geocoding-api.open-meteo.com".to_owned(),
            forecast: "https://api.open-meteo.com".to_owned(),
            marine: "https://marine-api.open-meteo.com".to_owned(),
            nominatim: "https://nominatim.openstreetmap.org".to_owned(),
            stormglass: "https://api.stormglass.io".to_owned(),
            duckduckgo: "https://html.duckduckgo.com".to_owned(),
        }
    }
}

impl Endpoints {
    /// Points every API at the same server.
    pub fn all(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_owned();
        Self {
            geocoding: base_url.clone(),
            forecast: base_url.clone(),
            marine: base_url.clone(),
            nominatim: base_url.clone(),
            stormglass: base_url.clone(),
            duckduckgo: base_url,
        }
    }
}

/// A failed web API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    /// The request failed or returned an error status.
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    /// The response did not look as expected.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Everything the tools need to reach the outside world.
#[derive(Clone)]
pub struct Toolbox {
    client: reqwest::Client,
    endpoints: Endpoints,
    stormglass_key: Option<String>,
    knowledge: Option<KnowledgeBase>,
}

impl Default for Toolbox {
    fn default() -> Self {
        Self::new(Endpoints::default())
    }
}

impl Toolbox {
    /// Creates a toolbox calling `endpoints`.
    pub fn new(endpoints: Endpoints) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|err| {
                warn!("falling back to a default HTTP client: {err}");
                reqwest::Client::new()
            });
        Self {
            client,
            endpoints,
            stormglass_key: None,
            knowledge: None,
        }
    }

    /// Reads marine data from StormGlass instead of Open-Meteo.
    #[inline]
    pub fn with_stormglass_key(mut self, api_key: Option<String>) -> Self {
        self.stormglass_key = api_key.filter(|key| !key.is_empty());
        self
    }

    /// Makes the surf knowledge base searchable.
    #[inline]
    pub fn with_knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Returns the knowledge base, if one was attached.
    #[inline]
    pub fn knowledge_base(&self) -> Option<&KnowledgeBase> {
        self.knowledge.as_ref()
    }

    pub(crate) fn open_meteo(&self) -> OpenMeteo {
        OpenMeteo::new(self.client.clone(), &self.endpoints)
    }

    pub(crate) fn nominatim(&self) -> Nominatim {
        Nominatim::new(self.client.clone(), &self.endpoints.nominatim)
    }

    pub(crate) fn stormglass(&self) -> Option<StormGlass> {
        self.stormglass_key.as_ref().map(|key| {
            StormGlass::new(self.client.clone(), &self.endpoints.stormglass, key)
        })
    }

    pub(crate) fn duckduckgo(&self) -> DuckDuckGo {
        DuckDuckGo::new(self.client.clone(), &self.endpoints.duckduckgo)
    }
}

pub(crate) fn endpoint(
    base_url: &str,
    path: &str,
    params: &[(&str, &str)],
) -> Result<Url, ApiError> {
    let url = format!("{}{path}", base_url.trim_end_matches('/'));
    Ok(Url::parse_with_params(&url, params)?)
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T, ApiError> {
    let resp = req.send().await?.error_for_status()?;
    Ok(resp.json().await?)
}

/// Formats a measurement the way the personas quote it, `N/A` if missing.
pub(crate) fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format!("{value:?}{unit}"),
        None => format!("N/A{unit}"),
    }
}
