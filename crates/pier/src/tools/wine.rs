use pier_core::tool::{Tool, ToolContext, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use super::{DuckDuckGo, SearchResult, Toolbox};

/// Parameters of [`WineWebSearchTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "La requête de recherche (ex: \"meilleurs vins pour saumon\").")]
    query: String,
}

/// Parameters of [`WineRecommendationsTool`].
#[derive(Deserialize, JsonSchema)]
pub struct RecommendationParameters {
    #[schemars(description = "Description du plat (ex: \"saumon grillé\", \"gigot d'agneau\").")]
    dish_description: String,
    #[schemars(description = "Saison optionnelle (printemps, été, automne, hiver).")]
    #[serde(default)]
    season: Option<String>,
    #[schemars(description = "Budget optionnel (ex: \"20-30 euros\").")]
    #[serde(default)]
    budget: Option<String>,
}

/// Parameters of [`WinePricesTool`].
#[derive(Deserialize, JsonSchema)]
pub struct PriceParameters {
    #[schemars(description = "Nom du vin (ex: \"Sancerre 2022\", \"Châteauneuf-du-Pape\").")]
    wine_name: String,
    #[schemars(description = "Région optionnelle pour affiner la recherche.")]
    #[serde(default)]
    region: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn format_results(header: &str, results: &[SearchResult]) -> String {
    let mut formatted = format!("{header} :\n\n");
    for (i, result) in results.iter().enumerate() {
        formatted.push_str(&format!(
            "{}. {}\n   {}\n   Source: {}\n\n",
            i + 1,
            result.title,
            result.body,
            result.href
        ));
    }
    formatted
}

async fn search(
    ddg: DuckDuckGo,
    query: String,
    header: String,
    empty: String,
) -> ToolResult {
    match ddg.search(&query).await {
        Ok(results) if results.is_empty() => Ok(empty),
        Ok(results) => Ok(format_results(&header, &results)),
        Err(err) => {
            warn!("web search for {query:?} failed: {err}");
            Ok(format!("Erreur lors de la recherche : {err}"))
        }
    }
}

/// Free web search about wines.
pub struct WineWebSearchTool {
    ddg: DuckDuckGo,
    parameter_schema: Value,
}

impl WineWebSearchTool {
    /// Creates a web search tool using the toolbox clients.
    pub fn new(toolbox: &Toolbox) -> Self {
        Self {
            ddg: toolbox.duckduckgo(),
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Tool for WineWebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "search_wine_web"
    }

    fn description(&self) -> &str {
        "Recherche des informations sur les vins via DuckDuckGo et renvoie les résultats formatés."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WebSearchParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        search(
            self.ddg.clone(),
            input.query,
            "Résultats de recherche".to_owned(),
            "Aucun résultat trouvé.".to_owned(),
        )
    }
}

/// Food and wine pairings found on the web.
pub struct WineRecommendationsTool {
    ddg: DuckDuckGo,
    parameter_schema: Value,
}

impl WineRecommendationsTool {
    /// Creates a pairing search tool using the toolbox clients.
    pub fn new(toolbox: &Toolbox) -> Self {
        Self {
            ddg: toolbox.duckduckgo(),
            parameter_schema: schema_for!(RecommendationParameters).to_value(),
        }
    }
}

impl Tool for WineRecommendationsTool {
    type Input = RecommendationParameters;

    fn name(&self) -> &str {
        "search_wine_recommendations"
    }

    fn description(&self) -> &str {
        "Cherche des recommandations de vins pour un plat spécifique sur le web."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: RecommendationParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let dish = input.dish_description;
        let mut query = format!("vin accord {dish}");
        if let Some(season) = non_empty(input.season) {
            query.push(' ');
            query.push_str(&season);
        }
        if let Some(budget) = non_empty(input.budget) {
            query.push_str(&format!(" budget {budget}"));
        }
        search(
            self.ddg.clone(),
            query,
            format!("Recommandations de vins pour {dish}"),
            format!("Aucune recommandation trouvée pour : {dish}"),
        )
    }
}

/// Prices and shops for a given wine.
pub struct WinePricesTool {
    ddg: DuckDuckGo,
    parameter_schema: Value,
}

impl WinePricesTool {
    /// Creates a price search tool using the toolbox clients.
    pub fn new(toolbox: &Toolbox) -> Self {
        Self {
            ddg: toolbox.duckduckgo(),
            parameter_schema: schema_for!(PriceParameters).to_value(),
        }
    }
}

impl Tool for WinePricesTool {
    type Input = PriceParameters;

    fn name(&self) -> &str {
        "search_wine_prices"
    }

    fn description(&self) -> &str {
        "Cherche les prix et disponibilités d'un vin spécifique."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: PriceParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let wine = input.wine_name;
        let mut query = format!("{wine} prix achat");
        if let Some(region) = non_empty(input.region) {
            query.push(' ');
            query.push_str(&region);
        }
        search(
            self.ddg.clone(),
            query,
            format!("Prix et disponibilités pour {wine}"),
            format!("Aucune information de prix trouvée pour : {wine}"),
        )
    }
}
