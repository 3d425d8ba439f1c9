//! Narrator turn orchestration against a scripted completion service

mod common;

use common::{anchored_transcript, narrative_json, ScriptedCompletion, Step, NARRATION};
use std::sync::Arc;
use std::time::Duration;
use story_context::completion::CompletionPurpose;
use story_context::config::Config;
use story_context::context::{Role, Transcript, Turn};
use story_context::narrative::{CharacterInfo, CreativityLevel, StoryInfo};
use story_context::narrator::{ContinueRequest, OpeningRequest, SummaryRequest};
use story_context::{ContextError, Narrator};

fn config() -> Config {
    let mut config = Config::default();
    config.retry.base_backoff_ms = 0;
    config
}

fn narrator(service: Arc<ScriptedCompletion>) -> Narrator {
    Narrator::new(&config(), service).unwrap()
}

fn story() -> StoryInfo {
    StoryInfo {
        title: "Pride and Prejudice".to_string(),
        author: "Jane Austen".to_string(),
    }
}

fn character() -> CharacterInfo {
    CharacterInfo {
        name: "Elizabeth".to_string(),
        personality_traits: vec!["witty".to_string(), "proud".to_string()],
    }
}

fn turn_request(history: Transcript, input: &str) -> ContinueRequest {
    ContinueRequest {
        story: story(),
        character: character(),
        conversation_history: history,
        player_input: input.to_string(),
        creativity_level: CreativityLevel::default(),
        memory_context: Vec::new(),
        world_state: Default::default(),
        relationships: Vec::new(),
        session_id: None,
    }
}

#[tokio::test]
async fn test_turn_extends_transcript() {
    let service = Arc::new(ScriptedCompletion::new(vec![]));
    let narrator = narrator(service.clone());
    let history = anchored_transcript(50, 6, 40);

    let result = narrator
        .continue_conversation(turn_request(history.clone(), "I ask Jane about Mr. Bingley"))
        .await
        .unwrap();

    assert_eq!(result.transcript.len(), history.len() + 2);
    assert_eq!(&result.transcript.turns()[..history.len()], history.turns());
    let appended = &result.transcript.turns()[history.len()..];
    assert_eq!(appended[0], Turn::user("I ask Jane about Mr. Bingley"));
    assert_eq!(appended[1].role, Role::Assistant);
    assert_eq!(appended[1].content, NARRATION);

    assert_eq!(result.response.response, NARRATION);
    assert_eq!(result.response.suggested_actions.len(), 2);
    assert_eq!(result.response.memory_updates.len(), 1);
    assert_eq!(
        result.response.world_state_updates.current_location.as_deref(),
        Some("Longbourn parlour")
    );
    assert_eq!(result.tokens_used, 1500);
    assert_eq!(result.usage.input_tokens, 1200);
    assert_eq!(result.usage.output_tokens, 300);
    assert!(result.usage.costs.total_cost > 0.0);
    assert!(!result.context_usage.compression_occurred);
    assert_eq!(result.context_usage.messages_in_history, history.len());

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].purpose, CompletionPurpose::Narrative);
    assert!(requests[0].json_response);
    assert_eq!(requests[0].temperature, 0.7);
    assert_eq!(requests[0].messages.len(), history.len() + 2);
    assert!(requests[0].messages[0].content.contains("Pride and Prejudice"));
}

#[tokio::test]
async fn test_creativity_level_sets_temperature() {
    for (level, expected) in [
        (CreativityLevel::StoryFocused, 0.5),
        (CreativityLevel::OpenWorld, 0.9),
    ] {
        let service = Arc::new(ScriptedCompletion::new(vec![]));
        let narrator = narrator(service.clone());
        let mut request = turn_request(Transcript::new(), "I walk to Meryton");
        request.creativity_level = level;

        narrator.continue_conversation(request).await.unwrap();
        assert_eq!(service.requests()[0].temperature, expected);
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Api(503), Step::Timeout]));
    let narrator = narrator(service.clone());

    let result = narrator
        .continue_conversation(turn_request(Transcript::new(), "I open the letter"))
        .await
        .unwrap();

    assert_eq!(result.response.response, NARRATION);
    assert_eq!(service.requests().len(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Api(400)]));
    let narrator = narrator(service.clone());

    let err = narrator
        .continue_conversation(turn_request(Transcript::new(), "I open the letter"))
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::Completion(_)));
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let service = Arc::new(ScriptedCompletion::new(vec![
        Step::Api(502),
        Step::Api(502),
        Step::Api(502),
        Step::Reply(narrative_json(NARRATION)),
    ]));
    let narrator = narrator(service.clone());

    let err = narrator
        .continue_conversation(turn_request(Transcript::new(), "I open the letter"))
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::Completion(_)));
    assert_eq!(service.requests().len(), 3);
}

#[tokio::test]
async fn test_empty_input_rejected_before_any_call() {
    let service = Arc::new(ScriptedCompletion::new(vec![]));
    let narrator = narrator(service.clone());

    let err = narrator
        .continue_conversation(turn_request(Transcript::new(), "   "))
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::Validation(_)));
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn test_concurrent_turn_on_same_session_is_rejected() {
    let service = Arc::new(ScriptedCompletion::new(vec![]).with_delay(Duration::from_millis(100)));
    let narrator = narrator(service.clone());

    let mut first = turn_request(Transcript::new(), "I dance with Mr. Darcy");
    first.session_id = Some("longbourn".to_string());
    let mut second = turn_request(Transcript::new(), "I leave the ballroom");
    second.session_id = Some("longbourn".to_string());

    let (a, b) = futures::join!(
        narrator.continue_conversation(first),
        narrator.continue_conversation(second)
    );

    assert!(a.is_ok());
    assert!(matches!(b, Err(ContextError::SessionBusy(ref id)) if id == "longbourn"));
    assert_eq!(service.requests().len(), 1);
    assert!(!narrator.sessions().is_busy("longbourn"));
}

#[tokio::test]
async fn test_different_sessions_run_concurrently() {
    let service = Arc::new(ScriptedCompletion::new(vec![]).with_delay(Duration::from_millis(50)));
    let narrator = narrator(service.clone());

    let mut first = turn_request(Transcript::new(), "I dance with Mr. Darcy");
    first.session_id = Some("longbourn".to_string());
    let mut second = turn_request(Transcript::new(), "I walk to Pemberley");
    second.session_id = Some("pemberley".to_string());

    let (a, b) = futures::join!(
        narrator.continue_conversation(first),
        narrator.continue_conversation(second)
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(service.requests().len(), 2);
}

#[tokio::test]
async fn test_non_json_output_falls_back_to_text() {
    let prose = "Elizabeth walks briskly across the muddy fields toward Netherfield, her \
        petticoats six inches deep in mud and her cheeks glowing from the exercise.";
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Reply(prose.to_string())]));
    let narrator = narrator(service);

    let result = narrator
        .continue_conversation(turn_request(Transcript::new(), "I walk to Netherfield"))
        .await
        .unwrap();

    assert_eq!(result.response.response, prose);
    assert_eq!(result.response.suggested_actions.len(), 3);
    assert!(result.response.memory_updates.is_empty());
    assert_eq!(result.transcript.turns()[1].content, prose);
}

#[tokio::test]
async fn test_short_narration_replaced_by_story_fallback() {
    let reply = serde_json::json!({"response": "Ok.", "suggested_actions": []}).to_string();
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Reply(reply)]));
    let narrator = narrator(service);

    let result = narrator
        .continue_conversation(turn_request(Transcript::new(), "Hello"))
        .await
        .unwrap();

    assert!(result.response.response.contains("Elizabeth"));
    assert!(result.response.response.contains("Jane Austen"));
    assert_eq!(result.response.suggested_actions.len(), 3);
}

#[tokio::test]
async fn test_opening_scene_fills_defaults() {
    let reply = serde_json::json!({"narration": NARRATION}).to_string();
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Reply(reply)]));
    let narrator = narrator(service.clone());

    let result = narrator
        .opening_scene(OpeningRequest {
            story: story(),
            character: character(),
            creativity_level: CreativityLevel::StoryFocused,
        })
        .await
        .unwrap();

    assert_eq!(result.response.response, NARRATION);
    assert_eq!(result.transcript.len(), 1);
    assert_eq!(result.transcript.turns()[0].role, Role::Assistant);
    assert_eq!(result.response.memory_updates.len(), 1);
    assert_eq!(result.response.memory_updates[0].id.as_deref(), Some("opening"));
    assert!(result.response.memory_updates[0].timestamp.is_some());
    assert_eq!(
        result.response.world_state_updates.current_location.as_deref(),
        Some("Opening scene of Pride and Prejudice")
    );
    assert_eq!(result.response.suggested_actions.len(), 3);

    let requests = service.requests_for(CompletionPurpose::OpeningScene);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, 1200);
    assert_eq!(requests[0].temperature, 0.5);
}

#[tokio::test]
async fn test_summary_uses_completion() {
    let service = Arc::new(ScriptedCompletion::replying(
        "  Elizabeth's wit carried her from Longbourn to Pemberley.  ",
    ));
    let narrator = narrator(service.clone());

    let result = narrator
        .story_summary(SummaryRequest {
            story: story(),
            character: character(),
            conversation_history: anchored_transcript(50, 10, 20),
            memory_events: Vec::new(),
        })
        .await
        .unwrap();

    assert!(!result.fallback);
    assert_eq!(result.summary, "Elizabeth's wit carried her from Longbourn to Pemberley.");
    assert_eq!(result.tokens_used, 1500);

    let requests = service.requests_for(CompletionPurpose::StorySummary);
    assert_eq!(requests.len(), 1);
    assert!(requests[0].messages[1].content.contains("The adventure ended like this"));
}

#[tokio::test]
async fn test_summary_failure_returns_fallback() {
    let service = Arc::new(ScriptedCompletion::new(vec![Step::Api(500)]));
    let narrator = narrator(service.clone());

    let result = narrator
        .story_summary(SummaryRequest {
            story: story(),
            character: character(),
            conversation_history: Transcript::new(),
            memory_events: Vec::new(),
        })
        .await
        .unwrap();

    assert!(result.fallback);
    assert!(result
        .summary
        .starts_with("Elizabeth completed their adventure in Pride and Prejudice."));
    assert_eq!(result.tokens_used, 0);
    assert_eq!(result.usage.costs.total_cost, 0.0);
    // summaries are not retried
    assert_eq!(service.requests().len(), 1);
}

#[test]
fn test_missing_title_rejected() {
    let service = Arc::new(ScriptedCompletion::new(vec![]));
    let narrator = narrator(service);
    let mut request = turn_request(Transcript::new(), "Hello");
    request.story.title = String::new();

    let result = tokio_test::block_on(narrator.continue_conversation(request));
    tokio_test::assert_err!(result);
}
