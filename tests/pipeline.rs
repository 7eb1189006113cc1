//! Pipeline Integration Tests
//!
//! End-to-end runs of the orchestrator against scripted stage adapters.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_test::assert_ok;

use common::{Behavior, Harness, MockImage, MockPlanner, MockPlayback, BRIEF, VIDEO_URI};
use visionary::adapters::{AdapterError, GeminiClient};
use visionary::config::ResolvedConfig;
use visionary::core::{Orchestrator, RejectReason, Stages, SubmitOutcome};
use visionary::credentials::StaticCredential;
use visionary::domain::{LogEntry, LogSource, RunState, Severity};

fn messages(outcome: &SubmitOutcome) -> Vec<(LogSource, String)> {
    outcome
        .snapshot()
        .unwrap()
        .log
        .iter()
        .map(|e| (e.source, e.message.clone()))
        .collect()
}

#[tokio::test]
async fn test_successful_run_visits_states_in_order() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Complete);
    assert_eq!(
        snapshot.visited_states(),
        vec![
            RunState::Idle,
            RunState::Planning,
            RunState::SynthesizingImage,
            RunState::SynthesizingVideo,
            RunState::Complete,
        ]
    );
    assert!(snapshot.failure.is_none());
    assert!(snapshot.finished_at.is_some());
}

#[tokio::test]
async fn test_harbor_brief_produces_all_artifacts() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    let plan = snapshot.plan.as_ref().unwrap();
    assert_eq!(snapshot.brief.as_deref(), Some(BRIEF));
    assert!(snapshot.artifacts.image().is_some_and(|i| !i.is_empty()));
    assert_eq!(
        snapshot.artifacts.video_reference().map(|l| l.as_str()),
        Some(VIDEO_URI)
    );
    assert!(snapshot.artifacts.playable_video().is_some());

    // each stage consumed the prompt meant for it
    assert_eq!(harness.image.last_prompt().as_deref(), Some(plan.visual_prompt.as_str()));
    assert_eq!(
        harness.backend().last_prompt().as_deref(),
        Some(plan.motion_prompt.as_str())
    );
    assert_eq!(harness.backend().submits(), 1);
    assert_eq!(harness.backend().refreshes(), 3);

    assert!(snapshot.log.len() >= 7);
    let log = messages(&outcome);
    assert_eq!(log[0], (LogSource::User, "New brief submitted".to_string()));
    assert_eq!(snapshot.log.entries()[0].details.as_deref(), Some(BRIEF));
    assert!(log.contains(&(LogSource::Planner, "Production plan created".to_string())));
    assert!(log.contains(&(LogSource::ImageDept, "Asset acquired".to_string())));
    assert!(log.contains(&(LogSource::VideoDept, "Rendering complete".to_string())));
    assert!(log.contains(&(LogSource::Planner, "Production complete".to_string())));
    assert_eq!(
        log.last().unwrap(),
        &(LogSource::VideoDept, "Playback ready".to_string())
    );
    assert!(snapshot.log.iter().all(|e| e.severity == Severity::Info));
}

#[tokio::test]
async fn test_log_details_follow_conventions() {
    let harness = Harness::new();
    let outcome = harness.orchestrator().submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    let details = |message: &str| {
        snapshot
            .log
            .iter()
            .find(|e| e.message == message)
            .and_then(|e| e.details.clone())
            .unwrap()
    };

    assert_eq!(details("Analyzing brief..."), "Reasoning with mock-planner");
    assert!(details("Production plan created").starts_with("Goal: A calm establishing shot"));
    assert!(details("Production plan created").ends_with("..."));
    assert_eq!(details("Commissioning assets..."), "Model: mock-image");
    assert_eq!(details("Asset acquired"), "6 bytes (image/jpeg)");
    assert_eq!(details("Initializing motion job..."), "Model: mock-video");
    assert_eq!(
        details("Applying motion vectors"),
        snapshot.plan.as_ref().unwrap().motion_prompt
    );
    assert_eq!(details("Rendering complete"), VIDEO_URI);
}

#[tokio::test]
async fn test_log_timestamps_never_decrease() {
    let harness = Harness::new();
    let outcome = harness.orchestrator().submit(BRIEF).await;
    let entries = outcome.snapshot().unwrap().log.entries();

    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_planning_failure_skips_later_stages() {
    let harness = Harness {
        planner: Arc::new(MockPlanner::new(Behavior::Fail(|| {
            AdapterError::IncompletePlan("motionPrompt")
        }))),
        ..Harness::new()
    };

    let outcome = harness.orchestrator().submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(
        snapshot.visited_states(),
        vec![RunState::Idle, RunState::Planning, RunState::Failed]
    );
    assert_eq!(harness.image.calls(), 0);
    assert_eq!(harness.backend().submits(), 0);
    assert_eq!(harness.playback.calls(), 0);
    assert!(snapshot.plan.is_none());

    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::Planner);
    assert_eq!(last.severity, Severity::Error);
    assert_eq!(last.message, "Planning failed");
    assert_eq!(last.details.as_deref(), Some("Plan is missing field 'motionPrompt'"));
    assert_eq!(snapshot.log.from_source(LogSource::ImageDept).count(), 0);
}

#[tokio::test]
async fn test_image_failure_skips_video() {
    let harness = Harness {
        image: Arc::new(MockImage::new(Behavior::Fail(|| AdapterError::NoImage))),
        ..Harness::new()
    };

    let outcome = harness.orchestrator().submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Failed);
    assert!(snapshot.plan.is_some());
    assert!(snapshot.artifacts.image().is_none());
    assert_eq!(harness.backend().submits(), 0);

    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::ImageDept);
    assert_eq!(last.message, "Image synthesis failed");
    assert_eq!(snapshot.log.from_source(LogSource::VideoDept).count(), 0);
}

#[tokio::test]
async fn test_empty_image_payload_fails_run() {
    let harness = Harness {
        image: Arc::new(MockImage::empty()),
        ..Harness::new()
    };

    let outcome = harness.orchestrator().submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(harness.backend().submits(), 0);
    assert_eq!(
        snapshot.log.last().unwrap().details.as_deref(),
        Some("No image payload returned")
    );
}

#[tokio::test]
async fn test_empty_brief_rejected() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    for brief in ["", "   ", "\n\t"] {
        let outcome = orchestrator.submit(brief).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::EmptyBrief)
        ));
    }

    assert_eq!(orchestrator.state(), RunState::Idle);
    assert!(orchestrator.snapshot().log.is_empty());
    assert_eq!(harness.planner.calls(), 0);
}

#[tokio::test]
async fn test_submit_during_active_run_is_ignored() {
    let gate = Arc::new(Notify::new());
    let harness = Harness {
        planner: Arc::new(MockPlanner::gated(gate.clone())),
        ..Harness::new()
    };
    let orchestrator = harness.orchestrator();
    let mut rx = orchestrator.subscribe();

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit("first brief").await }
    });

    assert_ok!(rx.wait_for(|s| s.state == RunState::Planning).await);
    let log_before = orchestrator.snapshot().log.len();

    let second = orchestrator.submit("second brief").await;
    assert!(matches!(
        second,
        SubmitOutcome::Rejected(RejectReason::RunInFlight(RunState::Planning))
    ));

    let current = orchestrator.snapshot();
    assert_eq!(current.brief.as_deref(), Some("first brief"));
    assert_eq!(current.log.len(), log_before);

    gate.notify_one();
    let first = assert_ok!(first.await);
    assert_eq!(first.snapshot().unwrap().state, RunState::Complete);
    assert_eq!(harness.planner.calls(), 1);
}

#[tokio::test]
async fn test_playback_failure_still_completes() {
    let harness = Harness {
        playback: Arc::new(MockPlayback::new(Behavior::Fail(|| AdapterError::Api {
            status: 404,
            message: "file expired".to_string(),
        }))),
        ..Harness::new()
    };

    let outcome = harness.orchestrator().submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Complete);
    assert!(snapshot.failure.is_none());
    assert!(snapshot.artifacts.video_reference().is_some());
    assert!(snapshot.artifacts.playable_video().is_none());

    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::VideoDept);
    assert_eq!(last.severity, Severity::Warning);
    assert_eq!(last.message, "Error fetching video");
    assert!(last.details.as_deref().unwrap().contains("file expired"));
}

#[tokio::test]
async fn test_stage_panic_becomes_critical_failure() {
    let harness = Harness {
        planner: Arc::new(MockPlanner::new(Behavior::Panic)),
        ..Harness::new()
    };
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Failed);
    assert!(snapshot.failure.as_deref().unwrap().starts_with("Critical failure"));

    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::Planner);
    assert_eq!(last.severity, Severity::Error);
    assert_eq!(last.message, "Critical failure");

    // the orchestrator is usable again
    assert!(orchestrator.state().accepts_submission());
}

#[tokio::test]
async fn test_panic_after_caller_gives_up_still_fails_run() {
    let gate = Arc::new(Notify::new());
    let harness = Harness {
        planner: Arc::new(MockPlanner::gated_with(gate.clone(), Behavior::Panic)),
        ..Harness::new()
    };
    let orchestrator = harness.orchestrator();
    let mut rx = orchestrator.subscribe();

    // the caller stops waiting while the planner is still blocked
    let abandoned = tokio::time::timeout(Duration::from_millis(50), orchestrator.submit(BRIEF)).await;
    assert!(abandoned.is_err());
    assert_eq!(orchestrator.state(), RunState::Planning);

    gate.notify_one();
    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.state == RunState::Failed),
    )
    .await;
    assert_ok!(assert_ok!(settled));

    let snapshot = orchestrator.snapshot();
    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::Planner);
    assert_eq!(last.severity, Severity::Error);
    assert_eq!(last.message, "Critical failure");
    assert!(orchestrator.state().accepts_submission());
}

#[tokio::test]
async fn test_missing_credential_fails_with_auth_error() {
    let config = ResolvedConfig::with_home(std::env::temp_dir().join("visionary-it"));
    let client = GeminiClient::new(&config, Arc::new(StaticCredential::absent()));
    let orchestrator = Orchestrator::new(Stages::gemini(client, config.video.poll_policy()));

    let outcome = orchestrator.submit(BRIEF).await;
    let snapshot = outcome.snapshot().unwrap();

    assert_eq!(snapshot.state, RunState::Failed);
    assert!(snapshot.artifacts.image().is_none());

    let last = snapshot.log.last().unwrap();
    assert_eq!(last.source, LogSource::Planner);
    assert_eq!(last.message, "Planning failed");
    assert_eq!(last.details.as_deref(), Some("No API key configured"));
    assert_eq!(
        snapshot.failure.as_deref(),
        Some("Planning failed: No API key configured")
    );
}

#[tokio::test]
async fn test_resubmit_after_failure_starts_fresh_run() {
    let harness = Harness {
        planner: Arc::new(MockPlanner::new(Behavior::FailOnce(|| AdapterError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }))),
        ..Harness::new()
    };
    let orchestrator = harness.orchestrator();

    let first = orchestrator.submit("first brief").await;
    let first = first.snapshot().unwrap();
    assert_eq!(first.state, RunState::Failed);

    let second = orchestrator.submit("second brief").await;
    let second = second.snapshot().unwrap();

    assert_eq!(second.state, RunState::Complete);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.brief.as_deref(), Some("second brief"));
    assert!(second.failure.is_none());
    assert_eq!(second.visited_states()[0], RunState::Idle);

    // the new log starts with the new brief and carries nothing from the failed run
    let entries = second.log.entries();
    assert_eq!(entries[0].details.as_deref(), Some("second brief"));
    assert!(entries.iter().all(|e| e.severity != Severity::Error));
    assert_eq!(harness.planner.calls(), 2);
}

#[tokio::test]
async fn test_observed_log_entries_never_change() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let mut rx = orchestrator.subscribe();

    let watcher = tokio::spawn(async move {
        let mut seen: Vec<(Vec<LogEntry>, RunState)> = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update();
            seen.push((snapshot.log.entries().to_vec(), snapshot.state));
            let finished = snapshot.state.is_terminal()
                && snapshot.log.last().map(|e| e.message.as_str()) == Some("Playback ready");
            if finished {
                break;
            }
        }
        seen
    });

    let outcome = orchestrator.submit(BRIEF).await;
    let final_log = outcome.snapshot().unwrap().log.entries().to_vec();

    let seen = assert_ok!(watcher.await);
    assert!(!seen.is_empty());

    // every earlier view is a prefix of the final log, ids and contents alike
    for (entries, _) in &seen {
        assert!(entries.len() <= final_log.len());
        assert_eq!(entries.as_slice(), &final_log[..entries.len()]);
    }

    let order = |state: RunState| match state {
        RunState::Idle => 0,
        RunState::Planning => 1,
        RunState::SynthesizingImage => 2,
        RunState::SynthesizingVideo => 3,
        RunState::Complete | RunState::Failed => 4,
    };
    assert!(seen.windows(2).all(|w| order(w[0].1) <= order(w[1].1)));
}
