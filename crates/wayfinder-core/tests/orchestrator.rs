mod common;

use common::{
    assemble, chennai, harness, BrokenSpeech, CountingEmbedder, OnePageEncyclopedia, PanickingGenerator,
    ScriptedGenerator,
};
use std::sync::Arc;
use wayfinder_core::orchestrator::{
    Plan, Source, StepOutput, Tool, APOLOGY, GREETING_ANSWER, NOT_IMPLEMENTED, UNSYNTHESIZED_ANSWER,
};
use wayfinder_core::retrieval::Provenance;
use wayfinder_core::session::{Role, MAX_SESSION_TURNS};

const MARINA_PLAN: &str = r#"{"steps": [
    {"tool": "retrieve", "input": "Marina Beach", "params": {"k": 3}},
    {"tool": "summarize", "input": "retrieved context", "params": {"style": "map_pin"}}
]}"#;

fn evidence_ids(sources: &[Source]) -> Vec<String> {
    sources
        .iter()
        .filter_map(|s| match s {
            Source::Evidence(e) => Some(e.id.clone()),
            Source::Cited(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn marina_beach_with_model_plan() {
    let h = harness(
        ScriptedGenerator::new(
            Some(MARINA_PLAN),
            Some(r#"{"answer": "Marina Beach is the longest urban beach.", "sources": ["p_marina"], "confidence": 0.8}"#),
        ),
        None,
        chennai(),
    );
    let response = h
        .assistant
        .orchestrator
        .handle("tell me about Marina Beach", Some("u1"), Some("c1"))
        .await;

    let plan = response.plan.clone().unwrap();
    assert_eq!(plan.steps.iter().map(|s| s.tool).collect::<Vec<_>>(), vec![Tool::Retrieve, Tool::Summarize]);

    match &response.execution[0].result {
        StepOutput::Retrieved(items) => assert_eq!(items[0].id, "p_marina"),
        other => panic!("expected retrieval, got {:?}", other),
    }
    let summarize = &response.execution[1];
    assert!(summarize.step.input.starts_with('['));
    assert!(summarize.step.input.contains("p_marina"));
    assert!(matches!(summarize.result, StepOutput::Summary(_)));

    assert_eq!(response.answer, "Marina Beach is the longest urban beach.");
    assert!(evidence_ids(&response.sources).contains(&"p_marina".to_string()));
    assert!((response.confidence - 0.8).abs() < 1e-6);
    assert!(response.audio_url.as_deref().unwrap().starts_with("/static/"));
    assert_eq!(h.speech.calls(), 1);
}

#[tokio::test]
async fn marina_beach_without_a_model_uses_fallbacks() {
    let h = harness(ScriptedGenerator::new(None, None), None, chennai());
    let response = h
        .assistant
        .orchestrator
        .handle("tell me about Marina Beach", None, None)
        .await;

    assert_eq!(response.plan, Some(Plan::fallback("tell me about Marina Beach")));
    match &response.execution[0].result {
        StepOutput::Retrieved(items) => assert_eq!(items[0].id, "p_marina"),
        other => panic!("expected retrieval, got {:?}", other),
    }
    assert!(matches!(response.execution[1].result, StepOutput::Summary(_)));

    assert_eq!(response.answer, UNSYNTHESIZED_ANSWER);
    assert_eq!(evidence_ids(&response.sources)[0], "p_marina");
    assert!((response.confidence - 0.1).abs() < 1e-6);
}

#[tokio::test]
async fn greeting_skips_execution() {
    let h = harness(
        ScriptedGenerator::new(Some(r#"{"steps": []}"#), Some(r#"{"answer": "Hello! How can I help you today?"}"#)),
        None,
        chennai(),
    );
    let response = h.assistant.orchestrator.handle("hi", None, Some("greet")).await;

    assert_eq!(response.plan, Some(Plan::empty()));
    assert!(response.execution.is_empty());
    assert!(response.sources.is_empty());
    assert_eq!(response.answer, GREETING_ANSWER);
    assert_eq!(response.confidence, 0.0);
    assert_eq!(h.embedder.calls(), 0);
    assert!(h.assistant.index.is_empty());
}

#[tokio::test]
async fn unsafe_plan_is_never_executed() {
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [{"tool": "retrieve", "input": "x", "params": {"cmd": "DROP TABLE places"}}]}"#),
            Some(r#"{"answer": "ok"}"#),
        ),
        None,
        chennai(),
    );
    let response = h.assistant.orchestrator.handle("beaches", None, None).await;
    assert_eq!(response.plan, Some(Plan::fallback("beaches")));
    assert!(response.execution.iter().all(|r| !r.step.params.contains_key("cmd")));
}

#[tokio::test]
async fn unimplemented_tool_does_not_stop_the_plan() {
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [
                {"tool": "translate", "input": "hello", "params": {"to": "ta"}},
                {"tool": "retrieve", "input": "temple", "params": {}}
            ]}"#),
            Some(r#"{"answer": "ok"}"#),
        ),
        None,
        chennai(),
    );
    let response = h.assistant.orchestrator.handle("temple", None, None).await;
    assert_eq!(response.execution.len(), 2);
    assert_eq!(
        serde_json::to_value(&response.execution[0].result).unwrap(),
        serde_json::json!({ "error": NOT_IMPLEMENTED })
    );
    assert!(matches!(response.execution[1].result, StepOutput::Retrieved(_)));
}

#[tokio::test]
async fn explicit_tts_step_supplies_the_audio() {
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [{"tool": "tts", "input": "Vanakkam", "params": {"voice": "male_ta"}}]}"#),
            Some(r#"{"answer": "Vanakkam!"}"#),
        ),
        None,
        chennai(),
    );
    let response = h.assistant.orchestrator.handle("say hello in tamil", None, None).await;
    let record = match &response.execution[0].result {
        StepOutput::Speech(record) => record.clone(),
        other => panic!("expected speech, got {:?}", other),
    };
    assert_eq!(record.voice, "male_ta");
    assert_eq!(response.audio_url, Some(record.audio_url));
    assert_eq!(h.speech.calls(), 1);
    assert!(h.audio_dir.path().read_dir().unwrap().count() >= 1);
}

#[tokio::test]
async fn low_confidence_appends_one_external_result() {
    let encyclopedia = Arc::new(OnePageEncyclopedia::new("Fort St. George", "The first English fortress in India."));
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [{"tool": "retrieve", "input": "colonial fortress history", "params": {"k": 2}}]}"#),
            Some(r#"{"answer": "It is a fort."}"#),
        ),
        Some(encyclopedia.clone()),
        chennai(),
    );
    let response = h.assistant.orchestrator.handle("colonial fortress history", None, None).await;
    let items = match &response.execution[0].result {
        StepOutput::Retrieved(items) => items.clone(),
        other => panic!("expected retrieval, got {:?}", other),
    };
    assert_eq!(items.len(), 3);
    let external: Vec<_> = items.iter().filter(|i| i.provenance == Provenance::External).collect();
    assert_eq!(external.len(), 1);
    assert_eq!(items[2].id, "wiki::Fort St. George");
    assert_eq!(items[2].score, 0.5);
    assert_eq!(items[2].image_url.as_deref(), Some("https://upload.example/Fort_St._George.jpg"));
}

#[tokio::test]
async fn embed_step_is_remembered_by_the_session() {
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [{"tool": "embed", "input": "quiet beaches", "params": {}}]}"#),
            Some(r#"{"answer": "noted"}"#),
        ),
        None,
        chennai(),
    );
    h.assistant.orchestrator.handle("quiet beaches", None, Some("emb")).await;
    let session = h.assistant.sessions.acquire("emb").await;
    assert!(session.embedding().is_some_and(|e| e.len() == 256));
}

#[tokio::test]
async fn history_is_bounded_across_requests() {
    let h = harness(
        ScriptedGenerator::new(Some(r#"{"steps": []}"#), Some(r#"{"answer": "hey"}"#)),
        None,
        chennai(),
    );
    for i in 0..7 {
        h.assistant
            .orchestrator
            .handle(&format!("hi {}", i), Some("u9"), None)
            .await;
    }
    let history = h.assistant.sessions.history("user:u9").await;
    assert_eq!(history.len(), MAX_SESSION_TURNS);
    assert_eq!(history[0].text, "hi 2");
    assert_eq!(history.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn concurrent_requests_on_one_conversation_keep_turn_order() {
    let h = harness(
        ScriptedGenerator::new(Some(r#"{"steps": []}"#), Some(r#"{"answer": "hey"}"#)),
        None,
        chennai(),
    );
    let orchestrator = Arc::clone(&h.assistant.orchestrator);
    let mut tasks = Vec::new();
    for i in 0..4 {
        let o = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move {
            o.handle_guarded(format!("msg {}", i), None, Some("shared".to_string())).await
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap().answer, "hey");
    }
    let history = h.assistant.sessions.history("shared").await;
    assert_eq!(history.len(), 8);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

#[tokio::test]
async fn summarize_sees_every_earlier_retrieval_in_plan_order() {
    let h = harness(
        ScriptedGenerator::new(
            Some(r#"{"steps": [
                {"tool": "retrieve", "input": "Kapaleeshwarar Temple", "params": {"k": 1}},
                {"tool": "retrieve", "input": "Guindy National Park", "params": {"k": 1}},
                {"tool": "summarize", "input": "retrieved context", "params": {}}
            ]}"#),
            Some(r#"{"answer": "A temple and a park."}"#),
        ),
        None,
        chennai(),
    );
    let response = h
        .assistant
        .orchestrator
        .handle("temple then park", None, None)
        .await;

    assert_eq!(response.execution.len(), 3);
    let summarize = &response.execution[2];
    assert_eq!(summarize.step.tool, Tool::Summarize);
    let fed: serde_json::Value = serde_json::from_str(&summarize.step.input).unwrap();
    let ids: Vec<&str> = fed
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["p_kapaleeswarar", "p_guindy"]);
}

#[tokio::test]
async fn failed_answer_speech_still_returns_the_answer() {
    let audio_dir = tempfile::tempdir().unwrap();
    let assistant = assemble(
        Arc::new(CountingEmbedder::new()),
        Arc::new(ScriptedGenerator::new(
            Some(MARINA_PLAN),
            Some(r#"{"answer": "Marina Beach is the longest urban beach.", "sources": ["p_marina"], "confidence": 0.8}"#),
        )),
        Arc::new(BrokenSpeech),
        None,
        chennai(),
        audio_dir.path(),
    );
    let response = assistant
        .orchestrator
        .handle("tell me about Marina Beach", None, Some("quiet"))
        .await;

    assert_eq!(response.answer, "Marina Beach is the longest urban beach.");
    assert_eq!(evidence_ids(&response.sources), vec!["p_marina".to_string()]);
    assert!((response.confidence - 0.8).abs() < 1e-6);
    assert!(response.audio_url.is_none());
    assert_eq!(audio_dir.path().read_dir().unwrap().count(), 0);
}

#[tokio::test]
async fn panic_inside_the_pipeline_becomes_the_apology() {
    let audio_dir = tempfile::tempdir().unwrap();
    let assistant = assemble(
        Arc::new(CountingEmbedder::new()),
        Arc::new(PanickingGenerator),
        Arc::new(BrokenSpeech),
        None,
        chennai(),
        audio_dir.path(),
    );
    let response = Arc::clone(&assistant.orchestrator)
        .handle_guarded("tell me about Marina Beach".to_string(), None, Some("boom".to_string()))
        .await;

    assert_eq!(response.answer, APOLOGY);
    assert!(response.sources.is_empty());
    assert_eq!(response.confidence, 0.0);
    assert!(response.audio_url.is_none());

    let history = assistant.sessions.history("boom").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}
