use async_trait::async_trait;
use dialogarena::backend::{Backend, BackendError};
use dialogarena::prompt::{Prompt, Segment};
use dialogarena::{
    Actor, ActorConfig, ConfigError, Dispatch, RetryPolicy, RoleFraming, Sentinel, Transcript,
    TransitionPhase, SYSTEM_NAME,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct MockBackend {
    response: String,
    prompts: Mutex<Vec<Prompt>>,
    was_reset: AtomicBool,
}

impl MockBackend {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
            was_reset: AtomicBool::new(false),
        })
    }

    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn query(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }

    fn reset(&self) {
        self.was_reset.store(true, Ordering::SeqCst);
    }
}

/// Fails the first `failures` calls, then answers.
struct FlakyBackend {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyBackend {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn query(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(format!("rate limited (call {})", call + 1).into())
        } else {
            Ok("Finally here.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

fn framing(transition_turn: i64) -> RoleFraming {
    RoleFraming::new(
        "BEFORE: browse lamps",
        "AT: notice the sofa",
        "AFTER: decide",
        transition_turn,
    )
    .unwrap()
}

#[tokio::test]
async fn test_act_returns_cleaned_response() {
    let backend = MockBackend::new("Seller: Welcome to the store!<EOS>");
    let seller = Actor::speaking("Seller", framing(3), backend.clone()).unwrap();

    let line = seller
        .act(&Transcript::new(), &Sentinel::generate(), Dispatch::Inline)
        .await;

    assert_eq!(line, "Welcome to the store!");
    assert_eq!(backend.prompts().len(), 1);
}

#[tokio::test]
async fn test_act_degrades_to_sentinel_after_exact_attempts() {
    let backend = FlakyBackend::new(usize::MAX);
    let shopper = Actor::speaking("Shopper", framing(3), backend.clone())
        .unwrap()
        .with_retry_policy(RetryPolicy::no_backoff(4));
    let sentinel = Sentinel::generate();

    let line = shopper
        .act(&Transcript::new(), &sentinel, Dispatch::Inline)
        .await;

    assert!(sentinel.matches(&line));
    assert_eq!(backend.calls(), 4);
}

#[tokio::test]
async fn test_act_recovers_within_retry_budget() {
    let backend = FlakyBackend::new(2);
    let shopper = Actor::speaking("Shopper", framing(3), backend.clone())
        .unwrap()
        .with_retry_policy(RetryPolicy::no_backoff(3));

    let line = shopper
        .act(&Transcript::new(), &Sentinel::generate(), Dispatch::Inline)
        .await;

    assert_eq!(line, "Finally here.");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_spawned_dispatch_matches_inline() {
    let backend = MockBackend::new("[Seller]: Hello there");
    let seller = Actor::speaking("Seller", framing(3), backend.clone()).unwrap();
    let sentinel = Sentinel::generate();
    let transcript = Transcript::new();

    let inline = seller.act(&transcript, &sentinel, Dispatch::Inline).await;
    let spawned = seller.act(&transcript, &sentinel, Dispatch::Spawned).await;

    assert_eq!(inline, "Hello there");
    assert_eq!(inline, spawned);
    assert_eq!(backend.prompts().len(), 2);
}

#[tokio::test]
async fn test_spawned_dispatch_degrades_too() {
    let backend = FlakyBackend::new(usize::MAX);
    let seller = Actor::speaking("Seller", framing(3), backend.clone())
        .unwrap()
        .with_retry_policy(RetryPolicy::no_backoff(2));
    let sentinel = Sentinel::generate();

    let line = seller
        .act(&Transcript::new(), &sentinel, Dispatch::Spawned)
        .await;

    assert!(sentinel.matches(&line));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_prompt_contains_history_and_speak_request() {
    let backend = MockBackend::new("ok");
    let shopper = Actor::speaking("Shopper", framing(3), backend).unwrap();

    let mut transcript = Transcript::new();
    transcript.append(SYSTEM_NAME, "The doors open.");
    transcript.append("Seller", "Good morning!");

    let prompt = shopper.prompt_for(&transcript, None).await;

    assert_eq!(prompt.agent_name, "Shopper");
    assert_eq!(
        prompt.segments,
        vec![
            Segment::new(
                SYSTEM_NAME,
                "You are Shopper.\n\nYour role: BEFORE: browse lamps"
            ),
            Segment::new(SYSTEM_NAME, "The doors open."),
            Segment::new("Seller", "Good morning!<EOS>"),
            Segment::new(SYSTEM_NAME, "Now you speak, Shopper.<EOS>"),
        ]
    );
}

#[tokio::test]
async fn test_prompt_switches_framing_at_transition() {
    let backend = MockBackend::new("ok");
    let shopper = Actor::speaking("Shopper", framing(2), backend).unwrap();
    let mut transcript = Transcript::new();

    let mut phases = Vec::new();
    for i in 0..5 {
        let prompt = shopper.prompt_for(&transcript, None).await;
        phases.push(prompt.phase);
        match prompt.phase {
            TransitionPhase::Before => assert!(prompt.system_text().contains("BEFORE")),
            TransitionPhase::At => assert!(prompt.system_text().contains("AT: notice")),
            TransitionPhase::After => assert!(prompt.system_text().contains("AFTER")),
        }
        transcript.append(if i % 2 == 0 { "Seller" } else { "Shopper" }, "line");
    }

    // T = 2: L = 2, 3 before; L = 4, 5 at; L = 6 after
    assert_eq!(
        phases,
        vec![
            TransitionPhase::Before,
            TransitionPhase::Before,
            TransitionPhase::At,
            TransitionPhase::At,
            TransitionPhase::After,
        ]
    );
}

#[tokio::test]
async fn test_global_prompt_leads_the_framing() {
    let backend = MockBackend::new("ok");
    let seller = Actor::speaking("Seller", framing(3), backend)
        .unwrap()
        .with_global_prompt("A shoe store downtown.");

    let prompt = seller.prompt_for(&Transcript::new(), None).await;

    assert_eq!(
        prompt.system_text(),
        "A shoe store downtown.\n\nYour name: Seller\n\nYour role: BEFORE: browse lamps"
    );
}

#[tokio::test]
async fn test_visual_reference_follows_phase() {
    let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    image.write_all(b"not really a png").unwrap();

    let framing = framing(1).with_visuals(Some(image.path().to_path_buf()), None);
    let shopper = Actor::speaking("Shopper", framing, MockBackend::new("ok")).unwrap();
    let mut transcript = Transcript::new();

    // T = 1: even an empty transcript gives L = 2 = 2T
    let at = shopper.prompt_for(&transcript, None).await;
    assert_eq!(at.phase, TransitionPhase::At);
    assert!(at.image.is_none());

    let framing = RoleFraming::new("b", "a", "c", 2)
        .unwrap()
        .with_visuals(Some(image.path().to_path_buf()), None);
    let shopper = Actor::speaking("Shopper", framing, MockBackend::new("ok")).unwrap();
    let before = shopper.prompt_for(&transcript, None).await;
    let attachment = before.image.expect("primary visual attached before transition");
    assert_eq!(attachment.media_type, "image/png");
    assert!(attachment.data_url().starts_with("data:image/png;base64,"));

    transcript.append("Seller", "one");
    transcript.append("Shopper", "two");
    let after_switch = shopper.prompt_for(&transcript, None).await;
    assert_eq!(after_switch.phase, TransitionPhase::At);
    assert!(after_switch.image.is_none());
}

#[tokio::test]
async fn test_missing_visual_file_is_skipped() {
    let framing = framing(5).with_visuals(Some("/definitely/not/here.jpg".into()), None);
    let shopper = Actor::speaking("Shopper", framing, MockBackend::new("ok")).unwrap();

    let prompt = shopper.prompt_for(&Transcript::new(), None).await;

    assert_eq!(prompt.phase, TransitionPhase::Before);
    assert!(prompt.image.is_none());
}

#[test]
fn test_reserved_and_empty_names_are_rejected() {
    let err = Actor::speaking(SYSTEM_NAME, framing(1), MockBackend::new("ok")).unwrap_err();
    assert_eq!(err, ConfigError::ReservedName(SYSTEM_NAME.to_string()));

    let err = Actor::speaking("   ", framing(1), MockBackend::new("ok")).unwrap_err();
    assert_eq!(err, ConfigError::EmptyName);
}

#[test]
fn test_from_config_validates_transition_turn() {
    let config = ActorConfig {
        name: "Seller".to_string(),
        role_desc: "a".to_string(),
        role_desc_in_transition_turn: "b".to_string(),
        role_desc_after_transition_turn: "c".to_string(),
        transition_turn: 0,
        global_prompt: None,
        visual_path: None,
        second_visual_path: None,
        max_tokens: None,
    };

    let err = Actor::from_config(&config, MockBackend::new("ok")).unwrap_err();
    assert_eq!(err, ConfigError::InvalidTransitionTurn(0));
}

#[test]
fn test_to_config_round_trips() {
    let config = ActorConfig {
        name: "Shopper".to_string(),
        role_desc: "Browse.".to_string(),
        role_desc_in_transition_turn: "Notice.".to_string(),
        role_desc_after_transition_turn: "Decide.".to_string(),
        transition_turn: 4,
        global_prompt: Some("A mall.".to_string()),
        visual_path: Some("lamp.jpg".into()),
        second_visual_path: Some("sofa.jpg".into()),
        max_tokens: None,
    };

    let actor = Actor::from_config(&config, MockBackend::new("ok")).unwrap();
    assert_eq!(actor.to_config(), config);
}

#[test]
fn test_reset_clears_backend_state() {
    let backend = MockBackend::new("ok");
    let actor = Actor::speaking("Seller", framing(1), backend.clone()).unwrap();

    actor.reset();

    assert!(backend.was_reset.load(Ordering::SeqCst));
}
