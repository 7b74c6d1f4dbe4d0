use std::sync::Arc;

use mockito::{Matcher, Server};
use pier::tools::{Endpoints, Toolbox};
use pier::{Persona, Role, SessionBuilder};
use pier_model::ModelMessage;
use pier_rag::{HashEmbedder, KnowledgeBase, VectorDb};
use pier_test_model::{PresetResponse, ScriptedModelProvider};
use serde_json::{Value, json};

async fn mock_surf_spot(server: &mut Server, wave_height: f64) {
    server
        .mock("GET", "/v1/search")
        .match_query(Matcher::Any)
        .with_body(
            json!({"results": [{"name": "La Torche", "latitude": 47.84, "longitude": -4.35}]})
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/v1/forecast")
        .match_query(Matcher::Any)
        .with_body(json!({"current": {"wind_speed_10m": 8.0, "wind_gusts_10m": 14.0}}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/v1/marine")
        .match_query(Matcher::Any)
        .with_body(
            json!({"current": {"wave_height": wave_height, "wave_period": 12.0, "sea_surface_temperature": 13.5}})
                .to_string(),
        )
        .create_async()
        .await;
}

fn tool_outputs(provider: &ScriptedModelProvider) -> Vec<String> {
    provider
        .requests()
        .last()
        .map(|request| {
            request
                .messages
                .iter()
                .filter_map(|msg| match msg {
                    ModelMessage::Tool(result) => Some(result.content.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_sunny_spots_a_dream_session() {
    let mut server = Server::new_async().await;
    mock_surf_spot(&mut server, 1.5).await;

    let provider = ScriptedModelProvider::new();
    provider
        .push_response(PresetResponse::tool_call(
            "call_1",
            "get_surf_conditions",
            json!({"location": "La Torche"}),
        ))
        .push_response(PresetResponse::text(
            "1.5m à 12s, 8 km/h de vent. Arrête de me parler et file à l'eau.",
        ));

    let mut session = SessionBuilder::new(Persona::Sunny, provider.clone())
        .with_toolbox(Toolbox::new(Endpoints::all(&server.url())))
        .build()
        .unwrap();
    assert!(!session.dream_session_seen());

    let reply = session.send("Ça donne quoi à La Torche ?").await;
    assert!(reply.starts_with("1.5m à 12s"));
    assert!(session.dream_session_seen());
    assert_eq!(
        session.farewell(),
        "Tu es encore là à me dire au revoir ? Je t'ai dit que c'était parfait, BOUGE TES FESSES !"
    );

    let outputs = tool_outputs(&provider);
    assert_eq!(outputs.len(), 1);
    let report: Value = serde_json::from_str(&outputs[0]).unwrap();
    assert_eq!(report["vagues"], "1.5m");
    assert_eq!(report["temperature_eau"], "13.5°C");

    session.reset().await;
    assert!(!session.dream_session_seen());
}

#[tokio::test]
async fn test_flat_sea_is_no_dream() {
    let mut server = Server::new_async().await;
    mock_surf_spot(&mut server, 0.4).await;

    let provider = ScriptedModelProvider::new();
    provider
        .push_response(PresetResponse::tool_call(
            "call_1",
            "get_surf_conditions",
            json!({"location": "La Torche"}),
        ))
        .push_response(PresetResponse::text("0.40m. C'est un lac, va plutôt t'acheter un pédalo."));

    let mut session = SessionBuilder::new(Persona::Sunny, provider)
        .with_toolbox(Toolbox::new(Endpoints::all(&server.url())))
        .build()
        .unwrap();
    session.send("Des vagues ?").await;
    assert!(!session.dream_session_seen());
}

#[tokio::test]
async fn test_sunny_searches_the_knowledge_base() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("spots.txt");
    std::fs::write(
        &corpus,
        "La Torche est un beach break puissant qui sature au-delà de 2m.",
    )
    .unwrap();

    let db = VectorDb::open(dir.path().join("db")).unwrap();
    let knowledge = KnowledgeBase::new(
        db.get_or_create_collection("surf_rag").unwrap(),
        Arc::new(HashEmbedder::default()),
    );
    assert_eq!(knowledge.initialize(&[&corpus]).await.unwrap(), 1);

    let provider = ScriptedModelProvider::new();
    provider
        .push_response(PresetResponse::tool_call(
            "call_1",
            "search_surf_knowledge",
            json!({"query": "La Torche beach break"}),
        ))
        .push_response(PresetResponse::text("Beach break puissant, sature au-delà de 2m."));

    let mut session = SessionBuilder::new(Persona::SunnyKnowledge, provider.clone())
        .with_toolbox(Toolbox::default().with_knowledge_base(knowledge))
        .build()
        .unwrap();
    session.send("C'est comment La Torche ?").await;

    let outputs = tool_outputs(&provider);
    assert_eq!(
        outputs,
        vec![
            "[Source : spots.txt]\nLa Torche est un beach break puissant qui sature au-delà de 2m."
                .to_owned()
        ]
    );
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_bacchus_searches_prices() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/html/")
        .match_query(Matcher::UrlEncoded(
            "q".into(),
            "Sancerre 2022 prix achat Loire".into(),
        ))
        .with_body(
            r#"<div class="result"><a class="result__a" href="https://caviste.example/sancerre">Sancerre 2022</a><a class="result__snippet">18,90 € la bouteille</a></div>"#,
        )
        .create_async()
        .await;

    let provider = ScriptedModelProvider::new();
    provider
        .push_response(PresetResponse::tool_call(
            "call_1",
            "search_wine_prices",
            json!({"wine_name": "Sancerre 2022", "region": "Loire"}),
        ))
        .push_response(PresetResponse::text("Comptez autour de 19 €."));

    let mut session = SessionBuilder::new(Persona::Bacchus, provider.clone())
        .with_toolbox(Toolbox::new(Endpoints::all(&server.url())))
        .build()
        .unwrap();
    assert_eq!(session.send("Combien coûte un Sancerre 2022 ?").await, "Comptez autour de 19 €.");

    assert_eq!(
        tool_outputs(&provider),
        vec![
            "Prix et disponibilités pour Sancerre 2022 :\n\n1. Sancerre 2022\n   18,90 € la bouteille\n   Source: https://caviste.example/sancerre\n\n"
                .to_owned()
        ]
    );
    search.assert_async().await;
}
