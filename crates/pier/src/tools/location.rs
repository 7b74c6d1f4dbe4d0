use pier_core::tool::{Tool, ToolContext, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

/// Parameters of [`UserLocationTool`].
#[derive(Deserialize, JsonSchema)]
pub struct UserLocationParameters {}

/// Tells where the current user is.
pub struct UserLocationTool {
    parameter_schema: Value,
}

impl UserLocationTool {
    /// Creates a new user location tool.
    #[inline]
    pub fn new() -> Self {
        Self {
            parameter_schema: schema_for!(UserLocationParameters).to_value(),
        }
    }
}

impl Default for UserLocationTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for UserLocationTool {
    type Input = UserLocationParameters;

    fn name(&self) -> &str {
        "get_user_location"
    }

    fn description(&self) -> &str {
        "Localisation de l'utilisateur"
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        _input: UserLocationParameters,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let city = if ctx.user_id == "1" { "Brest" } else { "Rennes" };
        std::future::ready(Ok(city.to_owned()))
    }
}
