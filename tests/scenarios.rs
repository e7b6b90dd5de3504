//! Facade-level scenarios driven against a mock server: S-B (partial →
//! final reconciliation), S-C (speaker change), S-D (adaptive window),
//! S-F (ignored speaker), and a property-3 (turn id uniqueness) check
//! under the `fixed` policy.

mod common;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::Mutex as AsyncMutex;

use voice_rt_core::auth::StaticAuthProvider;
use voice_rt_core::bus::{RtEvent, RtEventKind};
use voice_rt_core::config::{Preset, RtConfig, RT_URL_ENV_VAR};
use voice_rt_core::facade::VoiceAgent;
use voice_rt_core::types::FocusMode;

use common::{recv_text, send_text, MockServer};

/// `SPEECHMATICS_RT_URL` is process-global; serialize every test in this
/// file so they don't race setting it for each other's `VoiceAgent::connect`.
static ENV_GUARD: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

fn word_json(text: &str, start: f64, end: f64, is_final: bool, speaker: &str, punct: Option<&str>) -> String {
    let punct_json = match punct {
        Some(p) => format!("\"{p}\""),
        None => "null".to_string(),
    };
    format!(
        r#"{{"text":"{text}","start_time":{start},"end_time":{end},"confidence":0.9,"is_final":{is_final},"speaker_id":"{speaker}","punctuation":{punct_json},"language":"en"}}"#
    )
}

async fn connect_agent(config: RtConfig, endpoint: &str) -> VoiceAgent {
    std::env::set_var(RT_URL_ENV_VAR, endpoint);
    let auth = Arc::new(StaticAuthProvider::new("test-token"));
    VoiceAgent::connect(config, auth, None).await.expect("connect")
}

fn recording_listener() -> (Arc<StdMutex<Vec<RtEvent>>>, impl Fn(&RtEvent) + Send + Sync + 'static) {
    let events = Arc::new(StdMutex::new(Vec::new()));
    let captured = events.clone();
    let listener = move |event: &RtEvent| {
        captured.lock().expect("event log mutex poisoned").push(event.clone());
    };
    (events, listener)
}

#[tokio::test]
async fn partial_then_final_reconciles_into_one_segment() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await; // StartRecognition

        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s1"}"#).await;
        // Give the caller a beat to register bus listeners before the
        // data frames start flowing.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let partial1 = word_json("Welcome", 0.36, 0.92, false, "S1", None);
        send_text(
            &mut ws,
            &format!(r#"{{"message":"AddPartialTranscript","results":[{partial1}]}}"#),
        )
        .await;

        let partial2 = word_json("Welcome to", 0.36, 1.6, false, "S1", None);
        send_text(
            &mut ws,
            &format!(r#"{{"message":"AddPartialTranscript","results":[{partial2}]}}"#),
        )
        .await;

        let fin = word_json("Welcome to Speechmatics.", 0.36, 1.32, true, "S1", Some("."));
        send_text(
            &mut ws,
            &format!(r#"{{"message":"AddTranscript","results":[{fin}]}}"#),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let config = RtConfig::preset(Preset::Adaptive);
    let agent = connect_agent(config, &endpoint).await;

    let (partial_events, partial_listener) = recording_listener();
    let (final_events, final_listener) = recording_listener();
    agent.on(RtEventKind::AddPartialSegment, partial_listener).await;
    agent.on(RtEventKind::AddSegment, final_listener).await;

    // Let the driver task drain all the scripted frames.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let partials = partial_events.lock().unwrap();
    assert!(!partials.is_empty(), "expected at least one partial segment emission");
    if let RtEvent::AddPartialSegment { segment } = partials.last().unwrap() {
        assert_eq!(segment.text, "Welcome to");
    } else {
        panic!("wrong event kind recorded");
    }

    let finals = final_events.lock().unwrap();
    assert_eq!(finals.len(), 1, "exactly one final segment after reconciliation");
    if let RtEvent::AddSegment { segment } = &finals[0] {
        assert_eq!(segment.text, "Welcome to Speechmatics.");
        assert!(segment.words.as_ref().unwrap().iter().all(|w| w.is_final));
    } else {
        panic!("wrong event kind recorded");
    }
}

#[tokio::test]
async fn speaker_change_emits_two_ordered_final_segments() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await;
        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s2"}"#).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let w1 = word_json("hello", 0.0, 0.4, true, "S1", None);
        let w2 = word_json("hi", 0.5, 0.8, true, "S2", None);
        send_text(
            &mut ws,
            &format!(r#"{{"message":"AddTranscript","results":[{w1},{w2}]}}"#),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let config = RtConfig::preset(Preset::Adaptive);
    let agent = connect_agent(config, &endpoint).await;

    let (final_events, final_listener) = recording_listener();
    agent.on(RtEventKind::AddSegment, final_listener).await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let finals = final_events.lock().unwrap();
    assert_eq!(finals.len(), 2);
    let speakers: Vec<&str> = finals
        .iter()
        .map(|e| match e {
            RtEvent::AddSegment { segment } => segment.speaker_id.as_str(),
            _ => panic!("wrong event kind"),
        })
        .collect();
    assert!(speakers.contains(&"S1"));
    assert!(speakers.contains(&"S2"));
    for event in finals.iter() {
        if let RtEvent::AddSegment { segment } = event {
            match segment.speaker_id.as_str() {
                "S1" => assert_eq!(segment.text, "hello"),
                "S2" => assert_eq!(segment.text, "hi"),
                other => panic!("unexpected speaker {other}"),
            }
        }
    }
}

#[tokio::test]
async fn ignored_speaker_never_produces_a_segment() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await;
        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s3"}"#).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let w1 = word_json("a", 0.0, 0.2, true, "S1", None);
        let w2 = word_json("b", 0.3, 0.5, true, "S2", None);
        let w3 = word_json("c", 0.6, 0.8, true, "S3", None);
        send_text(
            &mut ws,
            &format!(r#"{{"message":"AddTranscript","results":[{w1},{w2},{w3}]}}"#),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let mut config = RtConfig::preset(Preset::Adaptive);
    config.focus.mode = FocusMode::Ignore;
    config.focus.ignore_speakers.insert("S3".to_string());

    let agent = connect_agent(config, &endpoint).await;

    let (final_events, final_listener) = recording_listener();
    agent.on(RtEventKind::AddSegment, final_listener).await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let finals = final_events.lock().unwrap();
    for event in finals.iter() {
        if let RtEvent::AddSegment { segment } = event {
            assert_ne!(segment.speaker_id, "S3");
        }
    }
    let speakers: Vec<&str> = finals
        .iter()
        .map(|e| match e {
            RtEvent::AddSegment { segment } => segment.speaker_id.as_str(),
            _ => panic!("wrong event kind"),
        })
        .collect();
    assert!(speakers.contains(&"S1"));
    assert!(speakers.contains(&"S2"));
    assert!(!speakers.contains(&"S3"));
}

/// S-D: under the `adaptive` policy, a word arriving after the first
/// 50ms ceiling tick but still within the prediction window `d` cancels
/// the pending turn close — the window must actually gate on elapsed
/// time, not on the tick that happens to observe it.
#[tokio::test]
async fn adaptive_word_within_window_cancels_pending_turn() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await;
        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s5"}"#).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // No prior segment -> d = silence_trigger(0.2) + delta(0.15) for
        // "no trailing punctuation" = 0.35s, comfortably more than one
        // 50ms ceiling tick.
        send_text(&mut ws, r#"{"message":"EndOfUtterance"}"#).await;

        // Arrives ~150ms later: past the first few ticks, still inside
        // the 350ms window.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let w = word_json("still", 1.0, 1.2, true, "S1", None);
        send_text(&mut ws, &format!(r#"{{"message":"AddTranscript","results":[{w}]}}"#)).await;

        tokio::time::sleep(Duration::from_millis(600)).await;
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let config = RtConfig::preset(Preset::Adaptive);
    let agent = connect_agent(config, &endpoint).await;

    let (turn_events, turn_listener) = recording_listener();
    agent.on(RtEventKind::EndOfTurn, turn_listener).await;

    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(
        turn_events.lock().unwrap().is_empty(),
        "a word arriving within the prediction window must cancel the close, not just delay it"
    );
}

/// S-D: with no cancelling word, the adaptive policy finalizes the turn
/// once the computed window `d` has elapsed, emitting exactly one
/// `EndOfTurn` with `turn_id: 0`.
#[tokio::test]
async fn adaptive_closes_turn_after_window_elapses_with_no_new_word() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await;
        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s6"}"#).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        send_text(&mut ws, r#"{"message":"EndOfUtterance"}"#).await;

        tokio::time::sleep(Duration::from_millis(700)).await;
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let config = RtConfig::preset(Preset::Adaptive);
    let agent = connect_agent(config, &endpoint).await;

    let (turn_events, turn_listener) = recording_listener();
    agent.on(RtEventKind::EndOfTurn, turn_listener).await;

    tokio::time::sleep(Duration::from_millis(900)).await;

    let events = turn_events.lock().unwrap();
    assert_eq!(events.len(), 1, "exactly one EndOfTurn once the window elapses");
    assert!(matches!(events[0], RtEvent::EndOfTurn { turn_id: 0 }));
}

#[tokio::test]
async fn external_policy_only_closes_turns_on_explicit_finalize() {
    let _guard = ENV_GUARD.lock().await;

    let server = MockServer::bind().await;
    let (endpoint, _script) = server.spawn_script(|mut ws| async move {
        let _ = recv_text(&mut ws).await;
        send_text(&mut ws, r#"{"message":"RecognitionStarted","id":"s4"}"#).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..3 {
            send_text(&mut ws, r#"{"message":"EndOfUtterance"}"#).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let _ = recv_text(&mut ws).await; // EndOfStream, sent by finalize()
        send_text(&mut ws, r#"{"message":"EndOfTranscript"}"#).await;
        common::close(&mut ws).await;
    });

    let config = RtConfig::preset(Preset::External);
    let agent = connect_agent(config, &endpoint).await;

    let (turn_events, turn_listener) = recording_listener();
    agent.on(RtEventKind::EndOfTurn, turn_listener).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(turn_events.lock().unwrap().is_empty(), "external policy must not close on its own");

    agent.finalize(true).await.expect("finalize");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = turn_events.lock().unwrap();
    assert_eq!(events.len(), 1, "exactly one EndOfTurn after explicit finalize");
    assert!(matches!(events[0], RtEvent::EndOfTurn { turn_id: 0 }));
}
