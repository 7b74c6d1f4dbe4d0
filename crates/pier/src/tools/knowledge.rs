use pier_core::tool::{Error as ToolError, Tool, ToolContext, ToolResult};
use pier_rag::{DEFAULT_RESULTS, KnowledgeBase};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

/// Parameters of [`KnowledgeTool`].
#[derive(Deserialize, JsonSchema)]
pub struct KnowledgeParameters {
    #[schemars(
        description = "La recherche à effectuer (ex: 'meilleurs spots Finistère' ou 'épaisseur combi eau 12 degrés')."
    )]
    query: String,
}

/// Searches the local surf knowledge base.
pub struct KnowledgeTool {
    knowledge: KnowledgeBase,
    parameter_schema: Value,
}

impl KnowledgeTool {
    /// Creates a tool searching `knowledge`.
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self {
            knowledge,
            parameter_schema: schema_for!(KnowledgeParameters).to_value(),
        }
    }
}

impl Tool for KnowledgeTool {
    type Input = KnowledgeParameters;

    fn name(&self) -> &str {
        "search_surf_knowledge"
    }

    fn description(&self) -> &str {
        r#"
Recherche des informations dans la base de connaissances locale sur :
1. Les équipements : combinaisons, planches, accessoires, protection, et conseils selon la température.
2. Les spots de surf en Bretagne : localisation, caractéristiques des vagues, niveau requis et conseils spécifiques.
Les extraits peuvent être en anglais, il faut alors les synthétiser et les traduire en français."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: KnowledgeParameters,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let knowledge = self.knowledge.clone();
        async move {
            knowledge
                .ask(&input.query, DEFAULT_RESULTS)
                .await
                .map_err(|err| {
                    ToolError::execution_error()
                        .with_reason(format!("knowledge base unavailable: {err}"))
                })
        }
    }
}
