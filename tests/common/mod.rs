//! Scripted reasoning gateway and recording channels shared by the
//! integration tests. Both write into one journal so tests can assert on
//! the relative order of analyze calls and channel traffic.

#![allow(dead_code)]

use async_trait::async_trait;
use coachline::channels::{
    Ack, ChannelError, ChannelKind, NotificationChannel, NudgeReply, SessionSummary, ThreadHandle,
    ThreadInfo,
};
use coachline::config::CoachingConfig;
use coachline::reasoning::{
    AnalysisContext, CoachingDirective, Decision, ReasoningError, ReasoningGateway,
};
use coachline::session::SessionConfig;
use coachline::transcript::TranscriptEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Poll `done` until it holds, failing the test after five seconds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached in time");
}

pub fn host_event(text: &str) -> TranscriptEvent {
    TranscriptEvent::new("p1", "Dana", true, text)
}

pub fn guest_event(text: &str) -> TranscriptEvent {
    TranscriptEvent::new("p9", "Prospect", false, text)
}

pub fn directive_for(participant_id: &str, name: &str) -> CoachingDirective {
    CoachingDirective {
        target_participant_id: participant_id.to_string(),
        target_participant_name: name.to_string(),
        message: "Ask about their budget".to_string(),
        reason: "missed_discovery".to_string(),
    }
}

pub fn session_config(id: &str, batch_size: usize, channels: &[ChannelKind]) -> SessionConfig {
    SessionConfig::new(id, &CoachingConfig::default())
        .with_batch_size(batch_size)
        .with_channels(channels.iter().copied())
        .with_stop_timeout(Duration::from_secs(5))
}

#[derive(Debug, Clone)]
pub enum Step {
    Nothing,
    Direct(CoachingDirective),
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct AnalyzeCall {
    pub text: String,
    pub context: AnalysisContext,
}

/// Replays a script of decisions, then answers "no action".
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<AnalyzeCall>>,
    forgotten: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    journal: Journal,
}

impl ScriptedGateway {
    pub fn new(journal: &Journal) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            forgotten: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            journal: Arc::clone(journal),
        }
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<AnalyzeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningGateway for ScriptedGateway {
    async fn analyze(
        &self,
        batch_text: &str,
        context: &AnalysisContext,
    ) -> Result<Decision, ReasoningError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.journal
            .lock()
            .unwrap()
            .push(format!("analyze:{}", context.batch_number));
        self.calls.lock().unwrap().push(AnalyzeCall {
            text: batch_text.to_string(),
            context: context.clone(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Nothing);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Step::Nothing => Ok(Decision::NoAction),
            Step::Direct(directive) => Ok(Decision::Directive(directive)),
            Step::Fail(message) => Err(ReasoningError::Malformed(message)),
        }
    }

    async fn forget(&self, session_id: &str) {
        self.forgotten.lock().unwrap().push(session_id.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct PostedReply {
    pub handle: Option<String>,
    pub recipient_id: String,
    pub message: String,
}

/// Channel double that records every call.
pub struct RecordingChannel {
    kind: ChannelKind,
    threaded: bool,
    fail_posts: bool,
    post_delay: Duration,
    starts: AtomicUsize,
    posts: Mutex<Vec<PostedReply>>,
    ends: Mutex<Vec<Option<String>>>,
    journal: Journal,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind, journal: &Journal) -> Self {
        Self {
            kind,
            threaded: kind == ChannelKind::Threaded,
            fail_posts: false,
            post_delay: Duration::ZERO,
            starts: AtomicUsize::new(0),
            posts: Mutex::new(Vec::new()),
            ends: Mutex::new(Vec::new()),
            journal: Arc::clone(journal),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// Posts settle only after `delay`; the journal entry is written then.
    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<PostedReply> {
        self.posts.lock().unwrap().clone()
    }

    pub fn ends(&self) -> Vec<Option<String>> {
        self.ends.lock().unwrap().clone()
    }

    fn log(&self, what: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", what, self.kind));
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn requires_thread(&self) -> bool {
        self.threaded
    }

    async fn start_thread(&self, info: &ThreadInfo) -> Result<Option<ThreadHandle>, ChannelError> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        self.log("start");
        if self.threaded {
            Ok(Some(ThreadHandle(format!("{}-thread-{}", info.session_id, n))))
        } else {
            Ok(None)
        }
    }

    async fn post_reply(
        &self,
        handle: Option<&ThreadHandle>,
        reply: &NudgeReply,
    ) -> Result<Ack, ChannelError> {
        if !self.post_delay.is_zero() {
            tokio::time::sleep(self.post_delay).await;
        }
        self.log("post");
        if self.fail_posts {
            return Err(ChannelError::Rejected {
                channel: self.kind,
                message: "service unavailable".to_string(),
            });
        }
        self.posts.lock().unwrap().push(PostedReply {
            handle: handle.map(|h| h.as_str().to_string()),
            recipient_id: reply.recipient.participant_id.clone(),
            message: reply.message.clone(),
        });
        Ok(Ack::single(Some(format!("msg-{}", reply.batch_number))))
    }

    async fn end_thread(
        &self,
        handle: Option<&ThreadHandle>,
        _summary: &SessionSummary,
    ) -> Result<Ack, ChannelError> {
        self.log("end");
        self.ends
            .lock()
            .unwrap()
            .push(handle.map(|h| h.as_str().to_string()));
        Ok(Ack::single(None))
    }
}
