use async_trait::async_trait;
use dialogarena::backend::{Backend, BackendError};
use dialogarena::prompt::Prompt;
use dialogarena::{
    Arena, ArenaConfig, ConfigError, ModerationPeriod, RetryPolicy, StopReason, MODERATOR_NAME,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

const STORE_DIALOG: &str = r#"{
    "global_framing": "A furniture store on a quiet afternoon.",
    "speakers": [
        {
            "name": "Seller",
            "role_before": "Greet the customer.",
            "role_at_transition": "Introduce the new sofa line.",
            "role_after_transition": "Help close the sale.",
            "transition_turn": 2,
            "max_tokens": 100
        },
        {
            "name": "Shopper",
            "role_desc": "You want a lamp.",
            "role_desc_in_transition_turn": "You notice the sofas.",
            "role_desc_after_transition_turn": "Decide on a sofa.",
            "transition_turn": 2,
            "visual_ref_primary": "lamp.jpg",
            "visual_ref_secondary": "sofa.jpg"
        }
    ],
    "moderator": {
        "role": "You watch a conversation in a furniture store.",
        "terminal_condition": "Has the shopper made a final decision? Answer yes or no.",
        "max_tokens": 10
    },
    "run": {
        "max_steps": 6,
        "moderation_period": "turn",
        "retry": { "max_attempts": 2, "min_backoff_ms": 0, "max_backoff_ms": 0, "multiplier_ms": 0 }
    },
    "backend": { "model": "gpt-4o", "temperature": 0.2 }
}"#;

struct MockBackend {
    line: String,
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl Backend for MockBackend {
    async fn query(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.line.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn mock(line: &str) -> Arc<MockBackend> {
    Arc::new(MockBackend {
        line: line.to_string(),
        prompts: Mutex::new(Vec::new()),
    })
}

#[test]
fn test_aliases_and_defaults_are_accepted() {
    let config = ArenaConfig::from_json_str(STORE_DIALOG).unwrap();

    assert_eq!(
        config.global_prompt.as_deref(),
        Some("A furniture store on a quiet afternoon.")
    );
    assert_eq!(config.speakers[0].role_desc, "Greet the customer.");
    assert_eq!(config.speakers[0].max_tokens, Some(100));
    assert_eq!(
        config.speakers[1].second_visual_path.as_deref(),
        Some(std::path::Path::new("sofa.jpg"))
    );
    assert_eq!(config.moderator.transition_turn, 1);
    assert_eq!(config.run.moderation_period, ModerationPeriod::Turn);
    assert_eq!(config.run.retry, RetryPolicy::no_backoff(2));
    assert_eq!(config.backend.model, "gpt-4o");
    assert_eq!(config.backend.max_tokens, 256);
    assert!(config.backend.merge_other_agents_as_one_user);
}

#[test]
fn test_from_path_reads_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(STORE_DIALOG.as_bytes()).unwrap();

    let config = ArenaConfig::from_path(file.path()).unwrap();

    assert_eq!(config.speakers.len(), 2);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let err = ArenaConfig::from_path("/no/such/dialog.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_config_round_trips_through_json() {
    let config = ArenaConfig::from_json_str(STORE_DIALOG).unwrap();
    let json = config.to_json_string().unwrap();
    assert_eq!(ArenaConfig::from_json_str(&json).unwrap(), config);
}

#[tokio::test]
async fn test_arena_from_config_runs_with_mock_backends() {
    let config = ArenaConfig::from_json_str(STORE_DIALOG).unwrap();
    let seller = mock("Welcome!");
    let shopper = mock("Just looking.");
    let judge = mock("no");
    let mut requested = Vec::new();

    let mut arena = Arena::from_config(&config, |name, max_tokens| {
        requested.push((name.to_string(), max_tokens));
        let backend: Arc<dyn Backend> = match name {
            "Seller" => seller.clone(),
            "Shopper" => shopper.clone(),
            _ => judge.clone(),
        };
        Ok(backend)
    })
    .unwrap();

    assert_eq!(
        requested,
        vec![
            ("Seller".to_string(), Some(100)),
            ("Shopper".to_string(), None),
            (MODERATOR_NAME.to_string(), Some(10)),
        ]
    );
    assert_eq!(arena.max_steps(), 6);
    assert_eq!(arena.moderation_period(), ModerationPeriod::Turn);
    assert_eq!(arena.speakers()[1].retry_policy(), &RetryPolicy::no_backoff(2));

    let outcome = arena.run().await;

    assert_eq!(outcome.stop_reason, StopReason::StepBudgetExhausted);
    assert_eq!(outcome.transcript.len(), 6);
    assert_eq!(judge.prompts.lock().unwrap().len(), 6);
    assert!(seller.prompts.lock().unwrap()[0]
        .system_text()
        .starts_with("A furniture store on a quiet afternoon.\n\nYour name: Seller"));
}

#[test]
fn test_invalid_actor_config_fails_arena_construction() {
    let broken = STORE_DIALOG.replacen("\"transition_turn\": 2", "\"transition_turn\": -1", 1);
    let config = ArenaConfig::from_json_str(&broken).unwrap();

    let err = Arena::from_config(&config, |_, _| Ok(mock("x") as Arc<dyn Backend>)).unwrap_err();

    assert_eq!(err, ConfigError::InvalidTransitionTurn(-1));
}

#[test]
fn test_reserved_speaker_name_fails_arena_construction() {
    let broken = STORE_DIALOG.replacen("\"name\": \"Seller\"", "\"name\": \"System\"", 1);
    let config = ArenaConfig::from_json_str(&broken).unwrap();

    let err = Arena::from_config(&config, |_, _| Ok(mock("x") as Arc<dyn Backend>)).unwrap_err();

    assert_eq!(err, ConfigError::ReservedName("System".to_string()));
}

#[test]
fn test_invalid_retry_policy_is_rejected() {
    let broken = STORE_DIALOG.replacen("\"max_attempts\": 2", "\"max_attempts\": 0", 1);
    let config = ArenaConfig::from_json_str(&broken).unwrap();

    let err = Arena::from_config(&config, |_, _| Ok(mock("x") as Arc<dyn Backend>)).unwrap_err();

    assert!(matches!(err, ConfigError::InvalidRetryPolicy(_)));
}

#[test]
fn test_openai_arena_requires_api_key() {
    let mut config = ArenaConfig::from_json_str(STORE_DIALOG).unwrap();
    config.backend.api_key_env = "DIALOGARENA_TEST_UNSET_KEY".to_string();

    let err = Arena::from_config_openai(&config).unwrap_err();

    assert_eq!(
        err,
        ConfigError::MissingApiKey("DIALOGARENA_TEST_UNSET_KEY".to_string())
    );
}

#[test]
fn test_openai_arena_builds_with_api_key() {
    std::env::set_var("DIALOGARENA_TEST_PRESENT_KEY", "sk-test");
    let mut config = ArenaConfig::from_json_str(STORE_DIALOG).unwrap();
    config.backend.api_key_env = "DIALOGARENA_TEST_PRESENT_KEY".to_string();

    let arena = Arena::from_config_openai(&config).unwrap();

    assert_eq!(arena.speakers().len(), 2);
    assert_eq!(arena.moderator().backend().model_name(), "gpt-4o");
}
