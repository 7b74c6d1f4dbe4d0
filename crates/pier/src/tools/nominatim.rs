use serde::Deserialize;

use super::{ApiError, Place, endpoint, get_json};

#[derive(Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
}

/// OpenStreetMap geocoding. Knows many surf spots the Open-Meteo
/// geocoder does not.
#[derive(Clone, Debug)]
pub struct Nominatim {
    client: reqwest::Client,
    base_url: String,
}

impl Nominatim {
    /// Creates a client for the Nominatim instance at `base_url`.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
        }
    }

    /// Returns the best match for `query`.
    pub async fn search(&self, query: &str) -> Result<Option<Place>, ApiError> {
        let url = endpoint(
            &self.base_url,
            "/search",
            &[("q", query), ("format", "json"), ("limit", "1")],
        )?;
        let hits: Vec<SearchHit> = get_json(self.client.get(url)).await?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let parse = |value: &str| {
            value.parse::<f64>().map_err(|_| {
                ApiError::Unexpected(format!("invalid coordinate `{value}`"))
            })
        };
        let name = if hit.name.is_empty() {
            hit.display_name
                .split(',')
                .next()
                .unwrap_or(query)
                .trim()
                .to_owned()
        } else {
            hit.name
        };
        Ok(Some(Place {
            latitude: parse(&hit.lat)?,
            longitude: parse(&hit.lon)?,
            name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::tools::USER_AGENT;

    #[tokio::test]
    async fn test_search() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_header("user-agent", USER_AGENT)
            .match_query(Matcher::UrlEncoded("q".into(), "La Torche".into()))
            .with_body(
                json!([{
                    "lat": "47.8378",
                    "lon": "-4.3497",
                    "display_name": "La Torche, Plomeur, Finistère, France",
                }])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "Nulle Part".into()))
            .with_body("[]")
            .create_async()
            .await;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap();
        let nominatim = Nominatim::new(client, &server.url());
        let place = nominatim.search("La Torche").await.unwrap().unwrap();
        assert_eq!(place.name, "La Torche");
        assert_eq!(place.longitude, -4.3497);
        assert!(nominatim.search("Nulle Part").await.unwrap().is_none());
        mock.assert_async().await;
    }
}
