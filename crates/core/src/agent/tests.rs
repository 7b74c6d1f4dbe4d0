use std::sync::{Arc, Mutex};
use std::time::Duration;

use pier_model::{ErrorKind, ModelMessage};
use pier_test_model::{PresetResponse, ScriptedModelProvider};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Error as ToolError, ToolContext, ToolResult};
use crate::{
    AgentBuilder, AgentError, InMemoryCheckpointer, RunConfig, Tool,
    TranscriptSource, TurnMessage,
};

static NO_PARAMS: Value = Value::Null;

struct UserLocation;

impl Tool for UserLocation {
    type Input = Value;

    fn name(&self) -> &str {
        "get_user_location"
    }

    fn description(&self) -> &str {
        "Retrieve user information based on user ID."
    }

    fn parameter_schema(&self) -> &Value {
        &NO_PARAMS
    }

    fn execute(
        &self,
        _input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let city = if ctx.user_id == "1" { "Brest" } else { "Rennes" };
        std::future::ready(Ok(city.to_owned()))
    }
}

#[derive(Deserialize)]
struct CityInput {
    city: String,
}

struct BrokenBarometer;

impl Tool for BrokenBarometer {
    type Input = CityInput;

    fn name(&self) -> &str {
        "get_weather_for_location"
    }

    fn description(&self) -> &str {
        "Get weather for a given city."
    }

    fn parameter_schema(&self) -> &Value {
        &NO_PARAMS
    }

    fn execute(
        &self,
        input: Self::Input,
        _ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        std::future::ready(Err(ToolError::execution_error()
            .with_reason(format!("no barometer in {}", input.city))))
    }
}

fn config(thread_id: &str) -> RunConfig {
    RunConfig::new(thread_id, "1")
}

#[tokio::test(start_paused = true)]
async fn test_simple_message() {
    let provider = ScriptedModelProvider::new();
    provider.push_response(PresetResponse::text("Salut. Tu veux quoi ?"));

    let deltas = Arc::new(Mutex::new(String::new()));
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_system_prompt("Tu es Sunny.")
        .on_transcript({
            let deltas = Arc::clone(&deltas);
            move |text, source| {
                assert_eq!(source, TranscriptSource::Assistant);
                deltas.lock().unwrap().push_str(text);
            }
        })
        .build();

    let turn = agent.invoke("Bonjour", &config("thread_1")).await.unwrap();
    assert_eq!(turn.reply, "Salut. Tu veux quoi ?");
    assert_eq!(*deltas.lock().unwrap(), turn.reply);
    assert_eq!(
        turn.messages,
        vec![
            TurnMessage::User {
                content: "Bonjour".to_owned()
            },
            TurnMessage::Assistant {
                content: "Salut. Tu veux quoi ?".to_owned()
            },
        ]
    );

    let requests = provider.requests();
    assert_eq!(
        requests[0].messages,
        vec![
            ModelMessage::System("Tu es Sunny.".to_owned()),
            ModelMessage::User("Bonjour".to_owned()),
        ]
    );
    assert!(requests[0].tools.is_empty());

    let saved = agent.conversation("thread_1").await.unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.items()[1].transcript(), "Salut. Tu veux quoi ?");
}

#[tokio::test(start_paused = true)]
async fn test_tool_calls_loop_back_to_the_model() {
    let provider = ScriptedModelProvider::new();
    provider
        .push_response(
            PresetResponse::tool_call("call_1", "get_user_location", json!({}))
                .and_tool_call(
                    "call_2",
                    "get_weather_for_location",
                    json!({"city": "Brest"}),
                )
                .and_tool_call("call_3", "get_horoscope", json!({})),
        )
        .push_response(PresetResponse::text("Brest. Il pleut, évidemment."));

    let tool_calls = Arc::new(Mutex::new(vec![]));
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(UserLocation)
        .with_tool(BrokenBarometer)
        .on_transcript({
            let tool_calls = Arc::clone(&tool_calls);
            move |text, source| {
                if source == TranscriptSource::ToolCall {
                    tool_calls.lock().unwrap().push(text.to_owned());
                }
            }
        })
        .build();

    let turn = agent.invoke("Où suis-je ?", &config("thread_1")).await.unwrap();
    assert_eq!(turn.reply, "Brest. Il pleut, évidemment.");
    assert_eq!(
        *tool_calls.lock().unwrap(),
        ["get_user_location", "get_weather_for_location", "get_horoscope"]
    );

    let outputs: Vec<_> = turn.tool_outputs().collect();
    assert_eq!(outputs[0], ("get_user_location", "Brest"));
    assert_eq!(
        outputs[1],
        ("get_weather_for_location", "Error: no barometer in Brest")
    );
    assert_eq!(outputs[2], ("get_horoscope", "Error: unknown tool `get_horoscope`"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let names: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["get_user_location", "get_weather_for_location"]);

    // user, assistant tool calls, then one result per call id in order.
    let second = &requests[1].messages;
    assert_eq!(second.len(), 5);
    assert!(matches!(second[1], ModelMessage::Opaque(_)));
    let ids: Vec<_> = second[2..]
        .iter()
        .map(|msg| match msg {
            ModelMessage::Tool(result) => result.id.as_str(),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(ids, ["call_1", "call_2", "call_3"]);
}

#[tokio::test(start_paused = true)]
async fn test_threads_remember_and_stay_isolated() {
    let provider = ScriptedModelProvider::new();
    for reply in ["Salut Erwan.", "Tu t'appelles Erwan.", "Aucune idée."] {
        provider.push_response(PresetResponse::text(reply));
    }
    let checkpointer = InMemoryCheckpointer::new();
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_checkpointer(checkpointer.clone())
        .build();

    agent.invoke("Je suis Erwan", &config("thread_1")).await.unwrap();
    agent.invoke("Mon nom ?", &config("thread_1")).await.unwrap();
    agent.invoke("Mon nom ?", &config("thread_2")).await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests[1].messages.len(), 3);
    assert!(matches!(requests[1].messages[1], ModelMessage::Opaque(_)));
    assert_eq!(requests[1].messages[2].text(), Some("Mon nom ?"));
    assert_eq!(requests[2].messages.len(), 1);
    assert_eq!(checkpointer.thread_count(), 2);

    agent.clear_thread("thread_1").await;
    assert!(agent.conversation("thread_1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cleared_threads_release_their_lock() {
    let mut provider = ScriptedModelProvider::new();
    provider.set_delay(Duration::from_millis(20));
    provider
        .push_response(PresetResponse::text("Un."))
        .push_response(PresetResponse::text("Deux."))
        .push_response(PresetResponse::text("Trois."));
    let agent = AgentBuilder::with_model_provider(provider).build();
    let lock_count = || agent.inner.thread_locks.lock().unwrap().len();

    agent.invoke("premier", &config("thread_1")).await.unwrap();
    agent.invoke("second", &config("thread_2")).await.unwrap();
    assert_eq!(lock_count(), 2);

    agent.clear_thread("thread_1").await;
    assert_eq!(lock_count(), 1);
    agent.clear_thread("thread_9").await;
    assert_eq!(lock_count(), 1);

    let config_2 = config("thread_2");
    let (turn, ()) = tokio::join!(
        agent.invoke("encore", &config_2),
        agent.clear_thread("thread_2"),
    );
    assert_eq!(turn.unwrap().reply, "Trois.");
    assert_eq!(lock_count(), 0);
    assert!(agent.conversation("thread_2").await.is_none());
}

#[tokio::test]
async fn test_failed_turn_is_not_saved() {
    let provider = ScriptedModelProvider::new();
    provider
        .push_response(PresetResponse::text("Ouais."))
        .push_failure(ErrorKind::Moderated);
    let agent = AgentBuilder::with_model_provider(provider).build();

    agent.invoke("Salut", &config("thread_1")).await.unwrap();
    let err = agent
        .invoke("Dis un gros mot", &config("thread_1"))
        .await
        .unwrap_err();
    assert!(matches!(&err, AgentError::Model(e) if e.kind() == ErrorKind::Moderated));

    let saved = agent.conversation("thread_1").await.unwrap();
    assert_eq!(saved.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_retried_transparently() {
    let provider = ScriptedModelProvider::new();
    provider
        .push_failure(ErrorKind::RateLimitExceeded)
        .push_response(PresetResponse::text("Pfff. Oui ?"));
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_max_retry_time(Duration::from_secs(5))
        .build();

    let turn = agent.invoke("Allô", &config("thread_1")).await.unwrap();
    assert_eq!(turn.reply, "Pfff. Oui ?");
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_step_limit() {
    let provider = ScriptedModelProvider::new();
    for i in 0..3 {
        provider.push_response(PresetResponse::tool_call(
            &format!("call_{i}"),
            "get_user_location",
            json!({}),
        ));
    }
    let agent = AgentBuilder::with_model_provider(provider)
        .with_tool(UserLocation)
        .with_max_steps(2)
        .build();

    let err = agent.invoke("Boucle", &config("thread_1")).await.unwrap_err();
    assert!(matches!(err, AgentError::StepLimitExceeded(2)));
    assert!(agent.conversation("thread_1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_same_thread_invocations_are_serialized() {
    let mut provider = ScriptedModelProvider::new();
    provider.set_delay(Duration::from_millis(20));
    provider
        .push_response(PresetResponse::text("Un."))
        .push_response(PresetResponse::text("Deux."));
    let agent = AgentBuilder::with_model_provider(provider.clone()).build();

    let cfg = config("thread_1");
    let (first, second) = tokio::join!(
        agent.invoke("premier", &cfg),
        agent.invoke("second", &cfg),
    );
    first.unwrap();
    second.unwrap();

    let requests = provider.requests();
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(agent.conversation("thread_1").await.unwrap().len(), 4);
}
