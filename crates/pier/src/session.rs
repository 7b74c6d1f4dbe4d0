use std::fmt::{self, Display};

use pier_core::{Agent, AgentBuilder, RunConfig, TranscriptSource, Turn};
use pier_model::ModelProvider;
use serde::Serialize;
use serde_json::Value;

use crate::persona::{Persona, ToolKind};
use crate::tools::*;

/// Errors building a [`Session`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The persona searches a knowledge base but the toolbox has none.
    #[error("{0:?} needs a knowledge base")]
    MissingKnowledgeBase(Persona),
}

/// Who wrote a history entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person chatting.
    User,
    /// The persona.
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One line of the visible conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// The author.
    pub role: Role,
    /// What was said.
    pub content: String,
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    persona: Persona,
    agent_builder: AgentBuilder,
    toolbox: Toolbox,
    user_id: String,
}

impl SessionBuilder {
    /// Creates a builder for `persona` talking through `provider`.
    pub fn new<M: ModelProvider + 'static>(persona: Persona, provider: M) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider)
            .with_system_prompt(persona.system_prompt());
        Self {
            persona,
            agent_builder,
            toolbox: Toolbox::default(),
            user_id: "1".to_owned(),
        }
    }

    /// Sets the user handed to tools. Defaults to `"1"`.
    #[inline]
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets the clients the tools use.
    #[inline]
    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Result<Session, SessionError> {
        let Self {
            persona,
            mut agent_builder,
            toolbox,
            user_id,
        } = self;

        for kind in persona.tools() {
            agent_builder = match kind {
                ToolKind::UserLocation => agent_builder.with_tool(UserLocationTool::new()),
                ToolKind::Weather => agent_builder.with_tool(WeatherTool::new(&toolbox)),
                ToolKind::Surf => agent_builder.with_tool(SurfConditionsTool::new(&toolbox)),
                ToolKind::Knowledge => {
                    let Some(knowledge) = toolbox.knowledge_base() else {
                        return Err(SessionError::MissingKnowledgeBase(persona));
                    };
                    agent_builder.with_tool(KnowledgeTool::new(knowledge.clone()))
                }
                ToolKind::WineWebSearch => {
                    agent_builder.with_tool(WineWebSearchTool::new(&toolbox))
                }
                ToolKind::WineRecommendations => {
                    agent_builder.with_tool(WineRecommendationsTool::new(&toolbox))
                }
                ToolKind::WinePrices => agent_builder.with_tool(WinePricesTool::new(&toolbox)),
            };
        }

        Ok(Session {
            persona,
            agent: agent_builder.build(),
            user_id,
            thread_number: 1,
            history: vec![],
            dream_session_seen: false,
        })
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session owns the visible history. The agent remembers the model
/// side of the conversation under the current thread id.
pub struct Session {
    persona: Persona,
    agent: Agent,
    user_id: String,
    thread_number: usize,
    history: Vec<HistoryEntry>,
    dream_session_seen: bool,
}

impl Session {
    /// The persona of this session.
    #[inline]
    pub fn persona(&self) -> Persona {
        self.persona
    }

    /// The underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// The current thread id, `thread_1` for a fresh session.
    pub fn thread_id(&self) -> String {
        format!("thread_{}", self.thread_number)
    }

    /// The conversation so far, oldest first.
    #[inline]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Whether a tool reported a dream session in this conversation.
    #[inline]
    pub fn dream_session_seen(&self) -> bool {
        self.dream_session_seen
    }

    /// Sends a message and returns the reply.
    ///
    /// Failures are answered with an error line, which is kept in the
    /// history like any other reply.
    pub async fn send(&mut self, input: &str) -> String {
        self.history.push(HistoryEntry {
            role: Role::User,
            content: input.to_owned(),
        });

        let config = RunConfig::new(self.thread_id(), self.user_id.clone());
        let reply = match self.agent.invoke(input, &config).await {
            Ok(turn) => {
                if reports_dream_session(&turn) {
                    info!("dream session spotted in {}", config.thread_id);
                    self.dream_session_seen = true;
                }
                turn.reply
            }
            Err(err) => {
                error!("turn failed in {}: {err}", config.thread_id);
                format!("Erreur : {err}")
            }
        };

        self.history.push(HistoryEntry {
            role: Role::Assistant,
            content: reply.clone(),
        });
        reply
    }

    /// Starts a new conversation on a fresh thread.
    pub async fn reset(&mut self) {
        self.agent.clear_thread(&self.thread_id()).await;
        self.thread_number += 1;
        self.history.clear();
        self.dream_session_seen = false;
    }

    /// The last words of the persona.
    #[inline]
    pub fn farewell(&self) -> &'static str {
        self.persona.farewell(self.dream_session_seen)
    }
}

/// Whether a tool output of `turn` is a JSON object flagging a dream session.
pub fn reports_dream_session(turn: &Turn) -> bool {
    turn.tool_outputs().any(|(_, output)| {
        serde_json::from_str::<Value>(output)
            .ok()
            .and_then(|value| value.get("session_de_reve").and_then(Value::as_bool))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use pier_core::TurnMessage;
    use pier_model::ErrorKind;
    use pier_test_model::{PresetResponse, ScriptedModelProvider};
    use serde_json::json;

    use super::*;

    fn tool_turn(output: &str) -> Turn {
        Turn {
            reply: String::new(),
            messages: vec![TurnMessage::Tool {
                id: "call_1".to_owned(),
                name: "get_surf_conditions".to_owned(),
                arguments: json!({"location": "La Torche"}),
                output: output.to_owned(),
            }],
        }
    }

    #[test]
    fn test_reports_dream_session() {
        assert!(reports_dream_session(&tool_turn(
            r#"{"lieu": "La Torche", "session_de_reve": true}"#
        )));
        assert!(!reports_dream_session(&tool_turn(
            r#"{"lieu": "La Torche", "session_de_reve": false}"#
        )));
        assert!(!reports_dream_session(&tool_turn(
            "Le spot dit \"session_de_reve\": true mais ce n'est pas du JSON"
        )));
        assert!(!reports_dream_session(&tool_turn(r#"["session_de_reve", true]"#)));
        assert!(!reports_dream_session(&Turn::default()));
    }

    #[tokio::test]
    async fn test_send_and_reset() {
        let provider = ScriptedModelProvider::new();
        provider
            .push_response(PresetResponse::tool_call(
                "call_1",
                "get_user_location",
                json!({}),
            ))
            .push_response(PresetResponse::text("Brest. Il pleut, évidemment."))
            .push_response(PresetResponse::text("*Soupir* Ouais."));

        let mut session = SessionBuilder::new(Persona::Sunny, provider.clone())
            .with_user_id("1")
            .build()
            .unwrap();
        assert_eq!(session.thread_id(), "thread_1");

        let reply = session.send("Je suis où ?").await;
        assert_eq!(reply, "Brest. Il pleut, évidemment.");
        assert_eq!(session.send("merci").await, "*Soupir* Ouais.");
        assert_eq!(
            session
                .history()
                .iter()
                .map(|entry| (entry.role, entry.content.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (Role::User, "Je suis où ?"),
                (Role::Assistant, "Brest. Il pleut, évidemment."),
                (Role::User, "merci"),
                (Role::Assistant, "*Soupir* Ouais."),
            ]
        );

        let tools = provider.requests()[0]
            .tools
            .iter()
            .map(|tool| tool.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            tools,
            ["get_user_location", "get_weather_for_location", "get_surf_conditions"]
        );

        session.reset().await;
        assert_eq!(session.thread_id(), "thread_2");
        assert!(session.history().is_empty());
        assert!(session.agent().conversation("thread_1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_recorded() {
        let provider = ScriptedModelProvider::new();
        provider.push_failure(ErrorKind::Moderated);

        let mut session = SessionBuilder::new(Persona::Bacchus, provider)
            .build()
            .unwrap();
        let reply = session.send("Un vin pour des huîtres ?").await;
        assert!(reply.starts_with("Erreur : "), "{reply}");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].content, reply);
        assert_eq!(session.farewell(), "Bonne dégustation ! À bientôt !");
    }

    #[test]
    fn test_knowledge_persona_needs_a_knowledge_base() {
        let result =
            SessionBuilder::new(Persona::SunnyKnowledge, ScriptedModelProvider::new()).build();
        assert!(matches!(
            result,
            Err(SessionError::MissingKnowledgeBase(Persona::SunnyKnowledge))
        ));
    }
}
