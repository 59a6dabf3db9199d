//! End-to-end behavior of a single coaching session driven through
//! `SessionOrchestrator` with scripted reasoning and recording channels.

mod common;

use common::*;
use coachline::channels::{ChannelKind, NotificationChannel};
use coachline::error::SessionError;
use coachline::session::{
    BatchOutcome, BatchReport, FinalFlush, IngestOutcome, SessionOrchestrator, SessionPhase,
};
use coachline::transcript::{ParticipantJoin, TranscriptEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    journal: Journal,
    gateway: Arc<ScriptedGateway>,
    direct: Arc<RecordingChannel>,
    threaded: Arc<RecordingChannel>,
    broadcast: Arc<RecordingChannel>,
}

impl Harness {
    fn new(gateway: impl FnOnce(&Journal) -> ScriptedGateway) -> Self {
        let journal = journal();
        Self {
            gateway: Arc::new(gateway(&journal)),
            direct: Arc::new(RecordingChannel::new(ChannelKind::Direct, &journal)),
            threaded: Arc::new(RecordingChannel::new(ChannelKind::Threaded, &journal)),
            broadcast: Arc::new(RecordingChannel::new(ChannelKind::Broadcast, &journal)),
            journal,
        }
    }

    fn with_failing_broadcast(mut self) -> Self {
        self.broadcast =
            Arc::new(RecordingChannel::new(ChannelKind::Broadcast, &self.journal).failing());
        self
    }

    fn session(&self, id: &str, batch_size: usize, kinds: &[ChannelKind]) -> SessionOrchestrator {
        let channels: Vec<Arc<dyn NotificationChannel>> = kinds
            .iter()
            .map(|kind| -> Arc<dyn NotificationChannel> {
                match kind {
                    ChannelKind::Direct => self.direct.clone(),
                    ChannelKind::Threaded => self.threaded.clone(),
                    ChannelKind::Broadcast => self.broadcast.clone(),
                }
            })
            .collect();
        SessionOrchestrator::new(
            session_config(id, batch_size, kinds),
            self.gateway.clone(),
            channels,
        )
    }
}

fn analyzed(outcome: IngestOutcome) -> BatchReport {
    match outcome {
        IngestOutcome::Analyzed(report) => report,
        other => panic!("expected an analyzed batch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_batch_of_host_speech_delivers_one_nudge_per_channel() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_script([Step::Direct(directive_for("p9", "Prospect"))])
    });
    let session = harness.session(
        "bot-e2e",
        6,
        &[ChannelKind::Direct, ChannelKind::Threaded],
    );

    for i in 0..5 {
        let outcome = session.ingest(host_event(&format!("line {i}"))).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Buffered { buffered } if buffered == i + 1));
    }
    let report = analyzed(session.ingest(host_event("line 5")).await.unwrap());

    assert_eq!(report.batch_number, 1);
    assert_eq!(report.messages_analyzed, 6);
    match report.outcome {
        BatchOutcome::Delivered {
            nudge_number,
            directive,
            deliveries,
        } => {
            assert_eq!(nudge_number, 1);
            assert_eq!(directive.target_participant_id, "p1");
            assert_eq!(deliveries.len(), 2);
            assert!(deliveries.iter().all(|d| d.is_delivered()));
        }
        other => panic!("expected delivery, got {other:?}"),
    }

    let calls = harness.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].text.lines().count(), 6);
    assert!(calls[0].text.starts_with("Dana: line 0"));

    let direct = harness.direct.posts();
    let threaded = harness.threaded.posts();
    assert_eq!(direct.len(), 1);
    assert_eq!(threaded.len(), 1);
    assert_eq!(direct[0].recipient_id, "p1");
    assert_eq!(direct[0].handle, None);
    assert_eq!(threaded[0].handle.as_deref(), Some("bot-e2e-thread-1"));
    assert_eq!(harness.broadcast.posts().len(), 0);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(snapshot.nudge_count, 1);
    assert_eq!(snapshot.batches_analyzed, 1);
    assert_eq!(snapshot.buffered_events, 0);

    let stop = session.stop().await.unwrap();
    assert_eq!(stop.total_nudges, 1);
    assert_eq!(stop.final_flush, FinalFlush::Skipped);
    assert_eq!(stop.closed.len(), 2);
    assert_eq!(harness.threaded.ends(), vec![Some("bot-e2e-thread-1".to_string())]);
    assert_eq!(harness.direct.ends(), vec![None]);
    assert_eq!(harness.gateway.forgotten(), vec!["bot-e2e".to_string()]);
}

#[tokio::test]
async fn test_directive_is_readdressed_to_host() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal)
            .with_script([Step::Direct(directive_for("someone-else", "Prospect"))])
    });
    let session = harness.session("bot-target", 2, &[ChannelKind::Direct]);

    session.ingest(guest_event("what does it cost?")).await.unwrap();
    let report = analyzed(session.ingest(host_event("let me check")).await.unwrap());

    match report.outcome {
        BatchOutcome::Delivered { directive, .. } => {
            assert_eq!(directive.target_participant_id, "p1");
            assert_eq!(directive.target_participant_name, "Dana");
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(harness.direct.posts()[0].recipient_id, "p1");
}

#[tokio::test]
async fn test_one_failing_channel_does_not_block_the_others() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_script([Step::Direct(directive_for("p1", "Dana"))])
    })
    .with_failing_broadcast();
    let session = harness.session(
        "bot-partial",
        1,
        &[
            ChannelKind::Direct,
            ChannelKind::Threaded,
            ChannelKind::Broadcast,
        ],
    );

    let report = analyzed(session.ingest(host_event("hello")).await.unwrap());
    let BatchOutcome::Delivered { deliveries, .. } = report.outcome else {
        panic!("expected delivery");
    };

    let delivered: Vec<ChannelKind> = deliveries
        .iter()
        .filter(|d| d.is_delivered())
        .map(|d| d.channel)
        .collect();
    assert_eq!(delivered, vec![ChannelKind::Direct, ChannelKind::Threaded]);

    let failed = deliveries
        .iter()
        .find(|d| d.channel == ChannelKind::Broadcast)
        .unwrap();
    assert!(failed.error.as_deref().unwrap().contains("service unavailable"));

    assert_eq!(harness.direct.posts().len(), 1);
    assert_eq!(harness.threaded.posts().len(), 1);
    assert_eq!(session.snapshot().await.nudge_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_never_overlaps_analyze_calls() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_delay(Duration::from_millis(5))
    });
    let session = Arc::new(harness.session("bot-serial", 1, &[ChannelKind::Direct]));
    session.ingest(host_event("opening")).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            session.ingest(guest_event(&format!("question {i}"))).await
        }));
    }
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, IngestOutcome::Analyzed(_)));
    }

    let calls = harness.gateway.calls();
    assert_eq!(calls.len(), 21);
    assert_eq!(harness.gateway.max_in_flight(), 1);
    let numbers: Vec<u32> = calls.iter().map(|c| c.context.batch_number).collect();
    assert_eq!(numbers, (1..=21).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_stop_flushes_partial_batch_before_closing_threads() {
    let harness = Harness::new(ScriptedGateway::new);
    let session = harness.session(
        "bot-flush",
        6,
        &[ChannelKind::Direct, ChannelKind::Threaded],
    );

    for text in ["one", "two", "three"] {
        session.ingest(host_event(text)).await.unwrap();
    }
    assert!(harness.gateway.calls().is_empty());

    let report = session.stop().await.unwrap();
    assert_eq!(report.final_flush, FinalFlush::Completed);
    assert_eq!(report.batches_analyzed, 1);

    let calls = harness.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].context.final_batch);
    assert_eq!(calls[0].text.lines().count(), 3);

    let journal = entries(&harness.journal);
    let analyze_at = journal.iter().position(|e| e == "analyze:1").unwrap();
    let first_end = journal.iter().position(|e| e.starts_with("end:")).unwrap();
    assert!(analyze_at < first_end, "journal: {journal:?}");
    assert_eq!(journal.iter().filter(|e| e.starts_with("end:")).count(), 2);
}

#[tokio::test]
async fn test_ingest_after_stop_is_rejected_without_buffering() {
    let harness = Harness::new(ScriptedGateway::new);
    let session = harness.session("bot-late", 6, &[ChannelKind::Direct]);

    session.ingest(host_event("one")).await.unwrap();
    session.ingest(host_event("two")).await.unwrap();
    session.stop().await.unwrap();

    let err = session.ingest(host_event("too late")).await.unwrap_err();
    assert!(matches!(err, SessionError::Ended { .. }));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Ended);
    assert_eq!(snapshot.buffered_events, 0);
    assert_eq!(session.recent_history(10).await.len(), 2);
    assert_eq!(harness.gateway.calls().len(), 1);

    assert!(matches!(
        session.stop().await.unwrap_err(),
        SessionError::Ended { .. }
    ));
}

#[tokio::test]
async fn test_stop_without_events_sends_nothing() {
    let harness = Harness::new(ScriptedGateway::new);
    let session = harness.session(
        "bot-empty",
        6,
        &[
            ChannelKind::Direct,
            ChannelKind::Threaded,
            ChannelKind::Broadcast,
        ],
    );

    let report = session.stop().await.unwrap();
    assert_eq!(report.final_flush, FinalFlush::Skipped);
    assert!(report.closed.is_empty());
    assert_eq!(report.total_nudges, 0);
    assert!(harness.gateway.calls().is_empty());
    assert!(entries(&harness.journal).is_empty());
}

#[tokio::test]
async fn test_reasoning_failure_drops_batch_without_retry() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_script([
            Step::Fail("bad json".to_string()),
            Step::Direct(directive_for("p1", "Dana")),
        ])
    });
    let session = harness.session("bot-fail", 2, &[ChannelKind::Direct]);

    session.ingest(host_event("a")).await.unwrap();
    let first = analyzed(session.ingest(host_event("b")).await.unwrap());
    match first.outcome {
        BatchOutcome::ReasoningFailed { error } => assert!(error.contains("bad json")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(harness.gateway.calls().len(), 1);
    assert!(harness.direct.posts().is_empty());

    session.ingest(host_event("c")).await.unwrap();
    let second = analyzed(session.ingest(host_event("d")).await.unwrap());
    assert!(matches!(
        second.outcome,
        BatchOutcome::Delivered { nudge_number: 1, .. }
    ));

    let calls = harness.gateway.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].text.contains("Dana: c"));
    assert!(!calls[1].text.contains("Dana: a"));
}

#[tokio::test]
async fn test_directive_before_host_is_known_is_discarded() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_script([Step::Direct(directive_for("p9", "Prospect"))])
    });
    let session = harness.session(
        "bot-nohost",
        2,
        &[ChannelKind::Direct, ChannelKind::Threaded],
    );

    session.ingest(guest_event("hi")).await.unwrap();
    let report = analyzed(session.ingest(guest_event("anyone there?")).await.unwrap());
    assert!(matches!(report.outcome, BatchOutcome::DirectiveDiscarded));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert_eq!(snapshot.nudge_count, 0);
    assert!(snapshot.host.is_none());

    let stop = session.stop().await.unwrap();
    assert!(stop.closed.is_empty());
    assert!(entries(&harness.journal)
        .iter()
        .all(|e| e.starts_with("analyze:")));
}

#[tokio::test]
async fn test_participant_join_resolves_host_and_opens_threads() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_script([Step::Direct(directive_for("p9", "Prospect"))])
    });
    let session = harness.session(
        "bot-join",
        2,
        &[ChannelKind::Direct, ChannelKind::Threaded],
    );

    let host = ParticipantJoin {
        participant_id: "p1".to_string(),
        participant_name: "Dana".to_string(),
        is_host: true,
    };
    assert!(session.participant_joined(&host).await.unwrap());
    assert!(!session.participant_joined(&host).await.unwrap());

    session.ingest(guest_event("hi")).await.unwrap();
    let report = analyzed(session.ingest(guest_event("pricing?")).await.unwrap());
    assert!(matches!(report.outcome, BatchOutcome::Delivered { .. }));

    assert_eq!(harness.threaded.starts(), 1);
    assert_eq!(harness.direct.starts(), 1);
    assert_eq!(harness.direct.posts()[0].recipient_id, "p1");
    assert_eq!(
        harness.threaded.posts()[0].handle.as_deref(),
        Some("bot-join-thread-1")
    );

    let journal = entries(&harness.journal);
    let started = journal.iter().position(|e| e == "start:threaded").unwrap();
    let analyzed_at = journal.iter().position(|e| e == "analyze:1").unwrap();
    assert!(started < analyzed_at);
}

fn single_channel_session(
    harness: &Harness,
    config: coachline::session::SessionConfig,
) -> Arc<SessionOrchestrator> {
    Arc::new(SessionOrchestrator::new(
        config,
        harness.gateway.clone(),
        vec![harness.direct.clone() as Arc<dyn NotificationChannel>],
    ))
}

#[tokio::test]
async fn test_stop_timeout_lets_in_flight_analysis_finish() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_delay(Duration::from_millis(300))
    });
    let session = single_channel_session(
        &harness,
        session_config("bot-slow", 1, &[ChannelKind::Direct])
            .with_stop_timeout(Duration::from_millis(50)),
    );

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.ingest(host_event("hello")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let report = session.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(report.final_flush, FinalFlush::Skipped);
    assert_eq!(harness.direct.ends().len(), 1);

    // The analyze call was not cancelled and still reports back.
    let report = analyzed(pending.await.unwrap().unwrap());
    assert!(matches!(report.outcome, BatchOutcome::NoAction));

    let gateway = harness.gateway.clone();
    wait_until(move || !gateway.forgotten().is_empty()).await;
    assert_eq!(harness.gateway.calls().len(), 1);
}

#[tokio::test]
async fn test_stop_timeout_defers_partial_batch_behind_in_flight_call() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal)
            .with_delay(Duration::from_millis(300))
            .with_script([Step::Nothing, Step::Direct(directive_for("p1", "Dana"))])
    });
    let session = single_channel_session(
        &harness,
        session_config("bot-defer", 2, &[ChannelKind::Direct])
            .with_stop_timeout(Duration::from_millis(50)),
    );

    session.ingest(host_event("a")).await.unwrap();
    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.ingest(host_event("b")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let outcome = session.ingest(host_event("c")).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Buffered { buffered: 1 }));

    let report = session.stop().await.unwrap();
    assert_eq!(report.final_flush, FinalFlush::Deferred);
    assert!(matches!(
        analyzed(pending.await.unwrap().unwrap()).outcome,
        BatchOutcome::NoAction
    ));

    let gateway = harness.gateway.clone();
    wait_until(move || !gateway.forgotten().is_empty()).await;

    let calls = harness.gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].text, "Dana: c");
    assert!(calls[1].context.final_batch);
    assert_eq!(harness.gateway.max_in_flight(), 1);

    // The late directive is dropped rather than posted after the summary.
    assert!(harness.direct.posts().is_empty());
    assert_eq!(session.snapshot().await.nudge_count, 0);
    let journal = entries(&harness.journal);
    let ended = journal.iter().position(|e| e == "end:direct").unwrap();
    let flushed = journal.iter().position(|e| e == "analyze:2").unwrap();
    assert!(ended < flushed, "journal: {journal:?}");
}

#[tokio::test]
async fn test_stop_waits_for_pending_delivery_before_closing() {
    let journal = journal();
    let gateway = Arc::new(
        ScriptedGateway::new(&journal).with_script([Step::Direct(directive_for("p1", "Dana"))]),
    );
    let direct = Arc::new(
        RecordingChannel::new(ChannelKind::Direct, &journal)
            .with_post_delay(Duration::from_millis(200)),
    );
    let threaded = Arc::new(RecordingChannel::new(ChannelKind::Threaded, &journal));
    let session = Arc::new(SessionOrchestrator::new(
        session_config(
            "bot-join-point",
            2,
            &[ChannelKind::Direct, ChannelKind::Threaded],
        ),
        gateway,
        vec![
            direct.clone() as Arc<dyn NotificationChannel>,
            threaded.clone() as Arc<dyn NotificationChannel>,
        ],
    ));

    session.ingest(host_event("a")).await.unwrap();
    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.ingest(host_event("b")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(direct.posts().is_empty());

    let report = session.stop().await.unwrap();
    assert_eq!(report.total_nudges, 1);
    assert_eq!(report.closed.len(), 2);

    let journal = entries(&journal);
    let first_end = journal.iter().position(|e| e.starts_with("end:")).unwrap();
    for channel in ["post:direct", "post:threaded"] {
        let posted = journal.iter().position(|e| e == channel).unwrap();
        assert!(posted < first_end, "journal: {journal:?}");
    }

    let BatchOutcome::Delivered { deliveries, .. } =
        analyzed(pending.await.unwrap().unwrap()).outcome
    else {
        panic!("expected delivery");
    };
    assert!(deliveries.iter().all(|d| d.is_delivered()));
}

#[tokio::test]
async fn test_queued_batches_hold_back_further_ingest() {
    let harness = Harness::new(|journal| {
        ScriptedGateway::new(journal).with_delay(Duration::from_millis(300))
    });
    let session = single_channel_session(
        &harness,
        session_config("bot-queue", 1, &[ChannelKind::Direct]).with_max_pending_batches(1),
    );
    let ingest = |event: TranscriptEvent| {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.ingest(event).await })
    };

    let first = ingest(host_event("a"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = ingest(guest_event("b"));
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(!second.is_finished());
    assert_eq!(session.recent_history(10).await.len(), 1);

    assert!(matches!(first.await.unwrap().unwrap(), IngestOutcome::Analyzed(_)));
    assert!(matches!(second.await.unwrap().unwrap(), IngestOutcome::Analyzed(_)));
    assert_eq!(harness.gateway.calls().len(), 2);
    assert_eq!(harness.gateway.max_in_flight(), 1);

    // Callers still waiting for room when the session stops are turned away.
    let third = ingest(guest_event("c"));
    tokio::time::sleep(Duration::from_millis(30)).await;
    let fourth = ingest(guest_event("d"));
    tokio::time::sleep(Duration::from_millis(30)).await;

    session.stop().await.unwrap();
    assert!(matches!(
        fourth.await.unwrap(),
        Err(SessionError::Ended { .. })
    ));
    assert!(matches!(third.await.unwrap().unwrap(), IngestOutcome::Analyzed(_)));

    let texts: Vec<String> = session
        .recent_history(10)
        .await
        .into_iter()
        .map(|e| e.text)
        .collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
}
