//! Session orchestrator.
//!
//! Owns one session's state and a background worker that executes jobs in
//! the order they were queued: thread opening on host resolution, then every
//! batch analysis. The queue is only written while the state lock is held,
//! so jobs line up in the order batches were cut and `analyze` is never
//! called twice at once for the same session.
//!
//! Every ingest takes an admission permit first, and a cut batch carries its
//! permit until analyzed, so at most `max_pending_batches` batches wait in
//! the queue and further callers are held back.
//!
//! Stop flushes the partial batch as a final job, closes the queue, waits
//! for the worker to drain (bounded by the stop timeout) and only then sends
//! the end-of-session summaries. An in-flight `analyze` is never cancelled:
//! on timeout the worker finishes its queue detached, and a directive it
//! produces after the threads closed is discarded.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{SessionPhase, SessionSnapshot, SessionState};
use super::{
    BatchOutcome, BatchReport, DeliveryReport, FinalFlush, IngestOutcome, SessionConfig, StopReport,
};
use crate::channels::{
    ChannelKind, NotificationChannel, NudgeReply, SessionSummary, ThreadHandle, ThreadInfo,
};
use crate::error::{SessionError, SessionResult};
use crate::reasoning::{AnalysisContext, CoachingDirective, Decision, ReasoningGateway};
use crate::transcript::{Batch, HostIdentity, ParticipantJoin, TranscriptEvent};

enum Job {
    OpenThreads(ThreadInfo),
    Analyze {
        batch: Batch,
        /// Host known when the batch was cut
        host: Option<HostIdentity>,
        final_batch: bool,
        done: Option<oneshot::Sender<BatchReport>>,
        /// Released once the batch is analyzed
        permit: Option<OwnedSemaphorePermit>,
    },
}

struct Guarded {
    session: SessionState,
    /// Dropped on stop so the worker exits once drained
    jobs: Option<mpsc::UnboundedSender<Job>>,
}

impl Guarded {
    fn enqueue(&mut self, job: Job) -> bool {
        match &self.jobs {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }
}

struct SessionCore {
    config: SessionConfig,
    gateway: Arc<dyn ReasoningGateway>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    state: Mutex<Guarded>,
    /// Closed on stop so waiting callers fail fast
    admission: Arc<Semaphore>,
}

pub struct SessionOrchestrator {
    core: Arc<SessionCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionOrchestrator {
    /// Create the session and spawn its analysis worker.
    pub fn new(
        config: SessionConfig,
        gateway: Arc<dyn ReasoningGateway>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::new(SessionCore {
            state: Mutex::new(Guarded {
                session: SessionState::new(config.batch_size, config.history_limit),
                jobs: Some(tx),
            }),
            admission: Arc::new(Semaphore::new(config.max_pending_batches.max(1))),
            config,
            gateway,
            channels,
        });

        let worker = tokio::spawn(SessionCore::run_worker(Arc::clone(&core), rx));
        info!(
            "Session {} created with channels {:?}",
            core.config.session_id, core.config.enabled_channels
        );

        Self {
            core,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.core.config.session_id
    }

    /// Append one transcript event. When it completes a batch, waits for
    /// that batch's analysis and dispatch to settle.
    pub async fn ingest(&self, event: TranscriptEvent) -> SessionResult<IngestOutcome> {
        let permit = Arc::clone(&self.core.admission)
            .acquire_owned()
            .await
            .map_err(|_| SessionError::ended(self.session_id()))?;

        let pending = {
            let mut guarded = self.core.state.lock().await;
            if guarded.session.phase == SessionPhase::Ended {
                warn!(
                    "Dropping transcript event for ended session {}",
                    self.session_id()
                );
                return Err(SessionError::ended(self.session_id()));
            }

            guarded.session.record(event.clone());
            if event.is_host && guarded.session.host.is_none() {
                self.core
                    .resolve_host(&mut guarded, HostIdentity::from(&event));
            }

            if !guarded.session.batcher.ingest(event) {
                return Ok(IngestOutcome::Buffered {
                    buffered: guarded.session.batcher.buffered(),
                });
            }

            let batch = guarded.session.batcher.take_batch();
            let host = guarded.session.host.clone();
            let (done, pending) = oneshot::channel();
            guarded.enqueue(Job::Analyze {
                batch,
                host,
                final_batch: false,
                done: Some(done),
                permit: Some(permit),
            });
            pending
        };

        match pending.await {
            Ok(report) => Ok(IngestOutcome::Analyzed(report)),
            Err(_) => {
                warn!(
                    "Analysis worker for session {} stopped before reporting",
                    self.session_id()
                );
                Ok(IngestOutcome::Abandoned)
            }
        }
    }

    /// Explicit participant-joined signal. Returns true if it resolved the host.
    pub async fn participant_joined(&self, join: &ParticipantJoin) -> SessionResult<bool> {
        let mut guarded = self.core.state.lock().await;
        if guarded.session.phase == SessionPhase::Ended {
            return Err(SessionError::ended(self.session_id()));
        }
        if !join.is_host || guarded.session.host.is_some() {
            debug!(
                "Participant {} joined session {}",
                join.participant_name,
                self.session_id()
            );
            return Ok(false);
        }

        self.core.resolve_host(&mut guarded, HostIdentity::from(join));
        Ok(true)
    }

    pub async fn recent_history(&self, n: usize) -> Vec<TranscriptEvent> {
        self.core.state.lock().await.session.recent(n)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guarded = self.core.state.lock().await;
        let session = &guarded.session;
        let config = &self.core.config;

        let mut open_threads: Vec<ChannelKind> = session.threads.keys().copied().collect();
        open_threads.sort();

        SessionSnapshot {
            session_id: config.session_id.clone(),
            phase: session.phase,
            meeting_url: config.meeting_url.clone(),
            meeting_title: config.meeting_title.clone(),
            host: session.host.clone(),
            nudge_count: session.nudge_count,
            batches_analyzed: session.batches_analyzed,
            buffered_events: session.batcher.buffered(),
            started_at: session.started_at,
            duration_seconds: session.duration_seconds(),
            enabled_channels: config.enabled_channels.iter().copied().collect(),
            open_threads,
        }
    }

    /// End the session: final flush, drain, then close every thread.
    pub async fn stop(&self) -> SessionResult<StopReport> {
        let flushing = {
            let mut guarded = self.core.state.lock().await;
            if guarded.session.phase == SessionPhase::Ended {
                return Err(SessionError::ended(self.session_id()));
            }
            guarded.session.phase = SessionPhase::Ended;
            self.core.admission.close();

            let partial = guarded.session.batcher.take_batch();
            let flushing = !partial.is_empty();
            if flushing {
                let host = guarded.session.host.clone();
                guarded.enqueue(Job::Analyze {
                    batch: partial,
                    host,
                    final_batch: true,
                    done: None,
                    permit: None,
                });
            }
            guarded.jobs = None;
            flushing
        };

        info!(
            "Stopping session {} (final flush: {})",
            self.session_id(),
            flushing
        );

        let drained = self.drain_worker().await;
        let final_flush = match (flushing, drained) {
            (false, _) => FinalFlush::Skipped,
            (true, true) => FinalFlush::Completed,
            (true, false) => {
                warn!(
                    "Session {} final batch will be analyzed after its threads close; \
                     any directive from it is discarded",
                    self.session_id()
                );
                FinalFlush::Deferred
            }
        };

        let closed = self.core.close_threads().await;
        if drained {
            self.core.gateway.forget(self.session_id()).await;
        }

        let guarded = self.core.state.lock().await;
        let report = StopReport {
            session_id: self.session_id().to_string(),
            duration_minutes: guarded.session.duration_minutes(),
            total_nudges: guarded.session.nudge_count,
            batches_analyzed: guarded.session.batches_analyzed,
            final_flush,
            closed,
        };

        info!(
            "Session {} ended after {} min with {} nudges",
            report.session_id, report.duration_minutes, report.total_nudges
        );
        Ok(report)
    }

    /// Wait for queued jobs up to the stop timeout. Returns false when the
    /// worker was left to finish on its own; it then releases the reasoning
    /// memory itself once drained.
    async fn drain_worker(&self) -> bool {
        let Some(mut worker) = self.worker.lock().await.take() else {
            return true;
        };

        match tokio::time::timeout(self.core.config.stop_timeout, &mut worker).await {
            Ok(result) => {
                if let Err(e) = result {
                    error!(
                        "Analysis worker for session {} failed: {}",
                        self.session_id(),
                        e
                    );
                }
                true
            }
            Err(_) => {
                warn!(
                    "Session {} analysis did not finish within {}s; closing threads while it completes",
                    self.session_id(),
                    self.core.config.stop_timeout.as_secs()
                );
                let core = Arc::clone(&self.core);
                tokio::spawn(async move {
                    if let Err(e) = worker.await {
                        error!(
                            "Analysis worker for session {} failed: {}",
                            core.config.session_id, e
                        );
                    }
                    core.gateway.forget(&core.config.session_id).await;
                    debug!(
                        "Detached analysis for session {} finished",
                        core.config.session_id
                    );
                });
                false
            }
        }
    }
}

impl SessionCore {
    async fn run_worker(core: Arc<SessionCore>, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            match job {
                Job::OpenThreads(info) => core.open_threads(&info).await,
                Job::Analyze {
                    batch,
                    host,
                    final_batch,
                    done,
                    permit,
                } => {
                    let report = core.analyze_batch(batch, host, final_batch).await;
                    drop(permit);
                    if let Some(done) = done {
                        let _ = done.send(report);
                    }
                }
            }
        }
        debug!("Analysis worker for session {} drained", core.config.session_id);
    }

    /// Idle → Active. Caller holds the state lock.
    fn resolve_host(&self, guarded: &mut Guarded, host: HostIdentity) {
        info!(
            "Session {} host resolved: {} ({})",
            self.config.session_id, host.name, host.participant_id
        );
        let info = self.thread_info(&host, guarded.session.started_at);
        guarded.session.host = Some(host);
        guarded.session.phase = SessionPhase::Active;
        guarded.enqueue(Job::OpenThreads(info));
    }

    fn thread_info(&self, host: &HostIdentity, start_time: chrono::DateTime<Utc>) -> ThreadInfo {
        ThreadInfo {
            session_id: self.config.session_id.clone(),
            member: host.clone(),
            meeting_title: self.config.meeting_title.clone(),
            platform: self.config.platform.clone(),
            bot_type: self.config.bot_type.clone(),
            start_time,
        }
    }

    /// Announce the session on every channel not yet opened.
    async fn open_threads(&self, info: &ThreadInfo) {
        let pending: Vec<Arc<dyn NotificationChannel>> = {
            let mut guarded = self.state.lock().await;
            let session = &mut guarded.session;
            self.channels
                .iter()
                .filter(|channel| {
                    let kind = channel.kind();
                    !session.threads.contains_key(&kind) && session.opened.insert(kind)
                })
                .cloned()
                .collect()
        };

        let starts = pending.iter().map(|channel| async move {
            (channel.kind(), channel.start_thread(info).await)
        });
        let results = join_all(starts).await;

        let mut guarded = self.state.lock().await;
        for (kind, result) in results {
            match result {
                Ok(Some(handle)) => {
                    debug!(
                        "Session {} opened {} thread {}",
                        self.config.session_id,
                        kind,
                        handle.as_str()
                    );
                    guarded.session.threads.insert(kind, handle);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Session {} failed to start {} channel: {}",
                    self.config.session_id, kind, e
                ),
            }
        }
    }

    async fn analyze_batch(
        &self,
        batch: Batch,
        host: Option<HostIdentity>,
        final_batch: bool,
    ) -> BatchReport {
        let messages_analyzed = batch.len();
        let context = {
            let mut guarded = self.state.lock().await;
            guarded.session.batches_analyzed += 1;
            AnalysisContext {
                session_id: self.config.session_id.clone(),
                meeting_title: self.config.meeting_title.clone(),
                host: host.clone(),
                nudge_count: guarded.session.nudge_count,
                batch_number: guarded.session.batches_analyzed,
                final_batch,
            }
        };
        let batch_number = context.batch_number;
        let report = |outcome| BatchReport {
            batch_number,
            messages_analyzed,
            outcome,
        };

        let decision = match self.gateway.analyze(&batch.text(), &context).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    "Reasoning failed for batch {} of session {}; batch dropped: {}",
                    batch_number, self.config.session_id, e
                );
                return report(BatchOutcome::ReasoningFailed {
                    error: e.to_string(),
                });
            }
        };

        let directive = match decision {
            Decision::NoAction => {
                debug!(
                    "Batch {} of session {}: no action",
                    batch_number, self.config.session_id
                );
                return report(BatchOutcome::NoAction);
            }
            Decision::Directive(directive) => directive,
        };

        let Some(host) = host else {
            info!(
                "Discarding directive for session {}: host not resolved",
                self.config.session_id
            );
            return report(BatchOutcome::DirectiveDiscarded);
        };

        if directive.target_participant_id != host.participant_id {
            debug!(
                "Directive named {} ({}); delivering to host {} instead",
                directive.target_participant_name, directive.target_participant_id, host.name
            );
        }
        let directive = directive.addressed_to(&host);

        let nudge_number = {
            let mut guarded = self.state.lock().await;
            if guarded.session.closed {
                None
            } else {
                guarded.session.nudge_count += 1;
                Some(guarded.session.nudge_count)
            }
        };
        let Some(nudge_number) = nudge_number else {
            warn!(
                "Discarding directive for session {}: threads already closed",
                self.config.session_id
            );
            return report(BatchOutcome::DirectiveDiscarded);
        };
        info!(
            "Session {} nudge #{} ({}): {}",
            self.config.session_id, nudge_number, directive.reason, directive.message
        );

        let deliveries = self
            .dispatch(&directive, &host, batch_number, messages_analyzed)
            .await;

        report(BatchOutcome::Delivered {
            nudge_number,
            directive,
            deliveries,
        })
    }

    /// Fan a directive out to every channel and wait for all of them.
    async fn dispatch(
        &self,
        directive: &CoachingDirective,
        host: &HostIdentity,
        batch_number: u32,
        messages_analyzed: usize,
    ) -> Vec<DeliveryReport> {
        let reply = NudgeReply {
            session_id: self.config.session_id.clone(),
            recipient: host.clone(),
            reason: directive.reason.clone(),
            message: directive.message.clone(),
            timestamp: Utc::now(),
            batch_number,
            messages_analyzed,
        };
        let handles: HashMap<ChannelKind, ThreadHandle> =
            self.state.lock().await.session.threads.clone();

        let sends = self.channels.iter().map(|channel| {
            let handle = handles.get(&channel.kind()).cloned();
            self.deliver(channel.as_ref(), handle, &reply)
        });
        let deliveries = join_all(sends).await;

        let delivered = deliveries.iter().filter(|d| d.is_delivered()).count();
        info!(
            "Session {} nudge delivered on {}/{} channels",
            self.config.session_id,
            delivered,
            deliveries.len()
        );
        deliveries
    }

    async fn deliver(
        &self,
        channel: &dyn NotificationChannel,
        mut handle: Option<ThreadHandle>,
        reply: &NudgeReply,
    ) -> DeliveryReport {
        let kind = channel.kind();

        if channel.requires_thread() && handle.is_none() {
            let info = {
                let mut guarded = self.state.lock().await;
                guarded.session.opened.insert(kind);
                self.thread_info(&reply.recipient, guarded.session.started_at)
            };
            match channel.start_thread(&info).await {
                Ok(Some(opened)) => {
                    self.state
                        .lock()
                        .await
                        .session
                        .threads
                        .insert(kind, opened.clone());
                    handle = Some(opened);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Session {} could not open {} thread for nudge: {}",
                        self.config.session_id, kind, e
                    );
                    return failed(kind, e.to_string());
                }
            }
        }

        match channel.post_reply(handle.as_ref(), reply).await {
            Ok(ack) => DeliveryReport {
                channel: kind,
                ack: Some(ack),
                error: None,
            },
            Err(e) => {
                warn!(
                    "Session {} nudge failed on {} channel: {}",
                    self.config.session_id, kind, e
                );
                failed(kind, e.to_string())
            }
        }
    }

    /// Send the wrap-up to every channel that was opened for this session.
    async fn close_threads(&self) -> Vec<DeliveryReport> {
        let (targets, summary) = {
            let mut guarded = self.state.lock().await;
            guarded.session.closed = true;
            let session = &guarded.session;
            let Some(host) = session.host.clone() else {
                return Vec::new();
            };

            let targets: Vec<(Arc<dyn NotificationChannel>, Option<ThreadHandle>)> = self
                .channels
                .iter()
                .filter_map(|channel| {
                    let kind = channel.kind();
                    if channel.requires_thread() {
                        session
                            .threads
                            .get(&kind)
                            .map(|handle| (Arc::clone(channel), Some(handle.clone())))
                    } else if session.opened.contains(&kind) {
                        Some((Arc::clone(channel), None))
                    } else {
                        None
                    }
                })
                .collect();

            let summary = SessionSummary {
                session_id: self.config.session_id.clone(),
                recipient: host,
                duration_minutes: session.duration_minutes(),
                total_nudges: session.nudge_count,
                end_time: Utc::now(),
            };
            (targets, summary)
        };

        let summary = &summary;
        let ends = targets.iter().map(|(channel, handle)| async move {
            let kind = channel.kind();
            match channel.end_thread(handle.as_ref(), summary).await {
                Ok(ack) => DeliveryReport {
                    channel: kind,
                    ack: Some(ack),
                    error: None,
                },
                Err(e) => {
                    warn!(
                        "Session {} failed to close {} channel: {}",
                        self.config.session_id, kind, e
                    );
                    failed(kind, e.to_string())
                }
            }
        });
        join_all(ends).await
    }
}

fn failed(channel: ChannelKind, error: String) -> DeliveryReport {
    DeliveryReport {
        channel,
        ack: None,
        error: Some(error),
    }
}
