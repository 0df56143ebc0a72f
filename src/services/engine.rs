//! Game engine task coordinating the round state machine, the result source, timers and the
//! settle animator.
//!
//! Everything mutable lives inside a single tokio task. Discrete events (intents, result
//! completions, timer expiries) arrive on one channel and animation frames on an interval, so
//! each event is applied atomically. Every deferred callback carries the round id it was armed
//! for and is dropped when that round is no longer current.

use std::{sync::Arc, time::Duration};

use futures::future::AbortHandle;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, warn};

use crate::{
    config::GameConfig,
    services::result_source::{FetchError, ResultSource},
    state::{
        animator::{AnimatorEvent, CoinPose, FrameInput, SettleAnimator, SpinStart},
        batch::BatchRun,
        coin::CoinSide,
        history::{HistoryEntry, HistoryLog},
        messages::{FAILURE_MESSAGE, TIMEOUT_MESSAGE},
        round::{Round, RoundError, RoundId, RoundStateMachine, RoundStatus, SettleMode},
    },
};

const PRESENTATION_CAPACITY: usize = 256;

/// Errors returned to callers of the engine handle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The state machine rejected the intent.
    #[error(transparent)]
    Round(#[from] RoundError),
    /// A batch run already owns the coin.
    #[error("a batch run is already in progress")]
    BatchRunning,
    /// The engine task is gone.
    #[error("game engine stopped")]
    Stopped,
}

/// Cue for the presentation layer to play a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    /// A round started.
    Toss,
    /// The coin hit the table.
    Landing,
}

/// Outputs fanned out to presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    /// The live round changed.
    RoundUpdated(Round),
    /// The batch run changed.
    BatchUpdated(BatchRun),
    /// The coin started its final settle.
    Landing {
        /// Landing round.
        round_id: RoundId,
    },
    /// The coin locked onto a side.
    Settled {
        /// Final side.
        side: CoinSide,
        /// Settled round.
        round_id: RoundId,
    },
    /// Coin pose for the latest frame.
    Pose(CoinPose),
    /// Sound to play.
    Sound(SoundCue),
    /// A settled round was recorded.
    HistoryAppended(HistoryEntry),
}

/// Consistent view of the round and the batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Live round.
    pub round: Round,
    /// Batch run state.
    pub batch: BatchRun,
}

/// Discrete events processed by the engine task.
#[derive(Debug)]
enum EngineEvent {
    StartRound {
        choice: CoinSide,
        reply: oneshot::Sender<Result<GameSnapshot, EngineError>>,
    },
    StartBatch {
        choice: CoinSide,
        count: u32,
        reply: oneshot::Sender<Result<GameSnapshot, EngineError>>,
    },
    StopBatch {
        reply: oneshot::Sender<GameSnapshot>,
    },
    ResultArrived {
        round_id: RoundId,
        result: Result<CoinSide, FetchError>,
    },
    RequestTimedOut {
        round_id: RoundId,
    },
    MessageExpired {
        round_id: RoundId,
    },
    LandingCueDue {
        round_id: RoundId,
    },
    Shutdown,
}

/// Cloneable handle used by the HTTP layer and tests to drive the engine.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::UnboundedSender<EngineEvent>,
    snapshot: watch::Receiver<GameSnapshot>,
    history: watch::Receiver<Arc<Vec<HistoryEntry>>>,
    presentation: broadcast::Sender<PresentationEvent>,
}

impl EngineHandle {
    /// Start a round betting on `choice`.
    pub async fn start_round(&self, choice: CoinSide) -> Result<GameSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::StartRound { choice, reply })?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Start a batch of `count` silent rounds betting on `choice`.
    pub async fn start_batch(
        &self,
        choice: CoinSide,
        count: u32,
    ) -> Result<GameSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::StartBatch {
            choice,
            count,
            reply,
        })?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Stop chaining batch rounds; the current round finishes normally.
    pub async fn stop_batch(&self) -> Result<GameSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::StopBatch { reply })?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshot changes.
    pub fn watch_snapshot(&self) -> watch::Receiver<GameSnapshot> {
        self.snapshot.clone()
    }

    /// Latest history, most recent first.
    pub fn history(&self) -> Arc<Vec<HistoryEntry>> {
        self.history.borrow().clone()
    }

    /// Watch history changes.
    pub fn watch_history(&self) -> watch::Receiver<Arc<Vec<HistoryEntry>>> {
        self.history.clone()
    }

    /// Subscribe to presentation events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.presentation.subscribe()
    }

    /// Ask the engine to stop, cancelling any outstanding fetch and timers.
    pub fn shutdown(&self) {
        let _ = self.events.send(EngineEvent::Shutdown);
    }

    fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.events.send(event).map_err(|_| EngineError::Stopped)
    }
}

/// Spawned sleep that is aborted when dropped or replaced.
struct ScopedTimer(JoinHandle<()>);

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Result source call issued for a round.
struct PendingFetch {
    round_id: RoundId,
    abort: AbortHandle,
}

/// State owned by the engine task.
pub struct GameEngine {
    config: GameConfig,
    source: Arc<dyn ResultSource>,
    machine: RoundStateMachine,
    animator: SettleAnimator,
    batch: BatchRun,
    history: HistoryLog,
    rng: StdRng,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    events_tx: mpsc::WeakUnboundedSender<EngineEvent>,
    snapshot_tx: watch::Sender<GameSnapshot>,
    history_tx: watch::Sender<Arc<Vec<HistoryEntry>>>,
    presentation: broadcast::Sender<PresentationEvent>,
    pending_fetch: Option<PendingFetch>,
    request_timer: Option<ScopedTimer>,
    message_timer: Option<ScopedTimer>,
    landing_timer: Option<ScopedTimer>,
    was_spinning: bool,
}

impl GameEngine {
    /// Spawn the engine task, returning a handle and the task's join handle.
    pub fn spawn(
        config: GameConfig,
        source: Arc<dyn ResultSource>,
        history: HistoryLog,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (engine, handle) = Self::new(config, source, history);
        let task = tokio::spawn(engine.run());
        (handle, task)
    }

    fn new(
        config: GameConfig,
        source: Arc<dyn ResultSource>,
        history: HistoryLog,
    ) -> (Self, EngineHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = RoundStateMachine::new();
        let batch = BatchRun::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(GameSnapshot {
            round: machine.round().clone(),
            batch,
        });
        let (history_tx, history_rx) = watch::channel(Arc::new(history.to_vec()));
        let (presentation, _) = broadcast::channel(PRESENTATION_CAPACITY);

        let handle = EngineHandle {
            events: events_tx.clone(),
            snapshot: snapshot_rx,
            history: history_rx,
            presentation: presentation.clone(),
        };

        let engine = Self {
            animator: SettleAnimator::new(config.animator.clone()),
            config,
            source,
            machine,
            batch,
            history,
            rng: StdRng::from_rng(&mut rand::rng()),
            events_rx,
            events_tx: events_tx.downgrade(),
            snapshot_tx,
            history_tx,
            presentation,
            pending_fetch: None,
            request_timer: None,
            message_timer: None,
            landing_timer: None,
            was_spinning: false,
        };

        (engine, handle)
    }

    /// Drive the engine until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let mut frames = interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(EngineEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                now = frames.tick() => {
                    let dt = now.saturating_duration_since(last_frame);
                    last_frame = now;
                    self.on_frame(dt);
                }
            }
        }

        self.cancel_outstanding();
        info!(round_id = self.machine.round_id(), "game engine stopped");
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StartRound { choice, reply } => {
                let result = self.on_start_round(choice);
                let _ = reply.send(result);
            }
            EngineEvent::StartBatch {
                choice,
                count,
                reply,
            } => {
                let result = self.on_start_batch(choice, count);
                let _ = reply.send(result);
            }
            EngineEvent::StopBatch { reply } => {
                if self.batch.running {
                    info!(remaining = self.batch.remaining, "batch run stopped");
                }
                self.batch.stop();
                self.publish_batch();
                let _ = reply.send(self.snapshot());
            }
            EngineEvent::ResultArrived { round_id, result } => self.on_result(round_id, result),
            EngineEvent::RequestTimedOut { round_id } => self.on_request_timeout(round_id),
            EngineEvent::MessageExpired { round_id } => {
                match self.machine.expire_message(round_id) {
                    Ok(()) => self.publish_round(),
                    Err(err) => debug!(round_id, error = %err, "ignoring message expiry"),
                }
            }
            EngineEvent::LandingCueDue { round_id } => {
                if self.machine.round_id() == round_id {
                    self.emit(PresentationEvent::Sound(SoundCue::Landing));
                }
            }
            EngineEvent::Shutdown => {}
        }
    }

    fn on_start_round(&mut self, choice: CoinSide) -> Result<GameSnapshot, EngineError> {
        if self.batch.running {
            return Err(EngineError::BatchRunning);
        }
        self.begin_round(choice)?;
        Ok(self.snapshot())
    }

    fn on_start_batch(&mut self, choice: CoinSide, count: u32) -> Result<GameSnapshot, EngineError> {
        if self.batch.running {
            return Err(EngineError::BatchRunning);
        }
        self.begin_round(choice)?;

        let count = self.batch.begin(choice, count, self.config.batch_max);
        info!(%choice, count, "batch run started");
        self.publish_batch();
        Ok(self.snapshot())
    }

    /// Allocate a new round, cancel whatever the previous one left behind and issue its fetch.
    fn begin_round(&mut self, choice: CoinSide) -> Result<RoundId, RoundError> {
        let round_id = self.machine.start_round(choice)?;

        self.message_timer = None;
        self.landing_timer = None;
        self.request_timer = None;
        if let Some(previous) = self.pending_fetch.take() {
            debug!(round_id = previous.round_id, "cancelling superseded result fetch");
            previous.abort.abort();
        }

        let (abort, registration) = AbortHandle::new_pair();
        let fetch = self.source.fetch_result(registration);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(EngineEvent::ResultArrived { round_id, result });
            }
        });
        self.pending_fetch = Some(PendingFetch { round_id, abort });
        self.request_timer = Some(self.arm(
            self.config.request_timeout,
            EngineEvent::RequestTimedOut { round_id },
        ));

        self.animator
            .reset(round_id, SpinStart::random(&mut self.rng));
        info!(round_id, %choice, "round started");
        self.emit(PresentationEvent::Sound(SoundCue::Toss));
        self.publish_round();
        Ok(round_id)
    }

    fn on_result(&mut self, round_id: RoundId, result: Result<CoinSide, FetchError>) {
        let is_current = self
            .pending_fetch
            .as_ref()
            .is_some_and(|pending| pending.round_id == round_id);
        if !is_current {
            debug!(round_id, ?result, "discarding result from superseded fetch");
            return;
        }
        self.pending_fetch = None;
        self.request_timer = None;

        match result {
            Ok(side) => match self.machine.resolve(round_id, side) {
                Ok(()) => {
                    debug!(round_id, %side, "result resolved");
                    self.publish_round();
                }
                Err(err) => debug!(round_id, error = %err, "discarding result"),
            },
            Err(FetchError::Cancelled) => debug!(round_id, "result fetch cancelled"),
            Err(err @ FetchError::Failed(_)) => {
                warn!(round_id, error = %err, "result source failed");
                self.fail_round(round_id, FAILURE_MESSAGE);
            }
        }
    }

    fn on_request_timeout(&mut self, round_id: RoundId) {
        if let Some(pending) = self
            .pending_fetch
            .take_if(|pending| pending.round_id == round_id)
        {
            pending.abort.abort();
        }
        self.request_timer = None;

        let round = self.machine.round();
        if round.is_live(round_id) && round.is_awaiting_result {
            warn!(round_id, timeout = ?self.config.request_timeout, "result fetch timed out");
            self.fail_round(round_id, TIMEOUT_MESSAGE);
        }
    }

    fn fail_round(&mut self, round_id: RoundId, message: &str) {
        if let Err(err) = self.machine.fail(round_id, message) {
            debug!(round_id, error = %err, "ignoring failure for settled round");
            return;
        }

        if self.batch.running {
            warn!(round_id, "stopping batch run after failed round");
            self.batch.stop();
            self.publish_batch();
        }
        self.message_timer = Some(self.arm(
            self.config.message_duration,
            EngineEvent::MessageExpired { round_id },
        ));
        self.publish_round();
    }

    fn on_frame(&mut self, dt: Duration) {
        let round = self.machine.round();
        let frame = FrameInput {
            round_id: round.round_id,
            spinning: round.status == RoundStatus::InProgress,
            target: round.resolved_side,
        };

        let events = self.animator.tick(dt, frame);
        if frame.spinning || self.was_spinning {
            self.emit(PresentationEvent::Pose(self.animator.pose()));
        }
        self.was_spinning = frame.spinning;

        for event in events {
            match event {
                AnimatorEvent::Landing { round_id } => self.on_landing(round_id),
                AnimatorEvent::Settled { side, round_id } => self.on_settled(side, round_id),
            }
        }
    }

    fn on_landing(&mut self, round_id: RoundId) {
        self.emit(PresentationEvent::Landing { round_id });
        self.landing_timer = Some(self.arm(
            self.config.landing_cue_delay,
            EngineEvent::LandingCueDue { round_id },
        ));
    }

    fn on_settled(&mut self, side: CoinSide, round_id: RoundId) {
        self.emit(PresentationEvent::Settled { side, round_id });

        let mode = if self.batch.running {
            SettleMode::Silent
        } else {
            SettleMode::Announce
        };
        let settled = match self
            .machine
            .report_settled(side, round_id, mode, &mut self.rng)
        {
            Ok(settled) => settled,
            Err(err) => {
                debug!(round_id, error = %err, "ignoring settle report");
                return;
            }
        };
        info!(round_id, %side, outcome = ?settled.outcome, "round settled");

        let entry = HistoryEntry::from_settled(&settled);
        self.history.push(entry.clone());
        self.history_tx.send_replace(Arc::new(self.history.to_vec()));
        self.emit(PresentationEvent::HistoryAppended(entry));

        match mode {
            SettleMode::Announce => {
                self.message_timer = Some(self.arm(
                    self.config.message_duration,
                    EngineEvent::MessageExpired { round_id },
                ));
                self.publish_round();
            }
            SettleMode::Silent => {
                self.publish_round();
                if let Some(choice) = self.batch.next_round() {
                    if let Err(err) = self.begin_round(choice) {
                        warn!(error = %err, "could not chain batch round");
                        self.batch.stop();
                    }
                } else {
                    info!("batch run finished");
                }
                self.publish_batch();
            }
        }
    }

    fn arm(&self, delay: Duration, event: EngineEvent) -> ScopedTimer {
        let events = self.events_tx.clone();
        ScopedTimer(tokio::spawn(async move {
            sleep(delay).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(event);
            }
        }))
    }

    fn cancel_outstanding(&mut self) {
        if let Some(pending) = self.pending_fetch.take() {
            pending.abort.abort();
        }
        self.request_timer = None;
        self.message_timer = None;
        self.landing_timer = None;
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            round: self.machine.round().clone(),
            batch: self.batch,
        }
    }

    fn publish_round(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
        self.emit(PresentationEvent::RoundUpdated(self.machine.round().clone()));
    }

    fn publish_batch(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
        self.emit(PresentationEvent::BatchUpdated(self.batch));
    }

    fn emit(&self, event: PresentationEvent) {
        let _ = self.presentation.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use futures::{
        FutureExt,
        future::{AbortRegistration, Abortable, BoxFuture},
    };
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    use super::*;
    use crate::state::coin::Outcome;

    /// One scripted answer of the test source.
    struct Step {
        delay: Duration,
        result: Result<CoinSide, FetchError>,
        honor_cancel: bool,
    }

    fn answer(delay_ms: u64, result: Result<CoinSide, FetchError>) -> Step {
        Step {
            delay: Duration::from_millis(delay_ms),
            result,
            honor_cancel: true,
        }
    }

    /// Source replaying a fixed list of answers and counting cancellations.
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        cancelled: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                cancelled: Arc::default(),
            })
        }

        fn cancelled(&self) -> usize {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    impl ResultSource for ScriptedSource {
        fn fetch_result(
            &self,
            cancel: AbortRegistration,
        ) -> BoxFuture<'static, Result<CoinSide, FetchError>> {
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step {
                delay: Duration::from_secs(3_600),
                result: Ok(CoinSide::Heads),
                honor_cancel: true,
            });

            if !step.honor_cancel {
                return async move {
                    sleep(step.delay).await;
                    step.result
                }
                .boxed();
            }

            let cancelled = self.cancelled.clone();
            let result = step.result;
            Abortable::new(sleep(step.delay), cancel)
                .map(move |outcome| match outcome {
                    Ok(()) => result,
                    Err(_) => {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                        Err(FetchError::Cancelled)
                    }
                })
                .boxed()
        }
    }

    fn spawn(source: Arc<ScriptedSource>) -> EngineHandle {
        let (handle, _task) = GameEngine::spawn(GameConfig::default(), source, HistoryLog::new(50));
        handle
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<PresentationEvent>,
        mut predicate: impl FnMut(&PresentationEvent) -> bool,
    ) -> PresentationEvent {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("engine stopped"),
            }
        }
    }

    /// Everything still buffered, skipping over lag gaps.
    fn drain(rx: &mut broadcast::Receiver<PresentationEvent>) -> Vec<PresentationEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            }
        }
    }

    async fn wait_status(handle: &EngineHandle, status: RoundStatus) -> GameSnapshot {
        handle
            .watch_snapshot()
            .wait_for(|snapshot| snapshot.round.status == status)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn round_settles_on_resolved_side_after_min_spin() {
        let handle = spawn(ScriptedSource::new(vec![answer(100, Ok(CoinSide::Tails))]));
        let mut rx = handle.subscribe();
        let started = Instant::now();

        let snapshot = handle.start_round(CoinSide::Heads).await.unwrap();
        assert_eq!(snapshot.round.round_id, 1);
        assert_eq!(snapshot.round.status, RoundStatus::InProgress);
        assert!(snapshot.round.is_awaiting_result);

        let settled = next_matching(&mut rx, |e| matches!(e, PresentationEvent::Settled { .. })).await;
        assert_eq!(
            settled,
            PresentationEvent::Settled {
                side: CoinSide::Tails,
                round_id: 1
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(900));

        let snapshot = wait_status(&handle, RoundStatus::Message).await;
        assert_eq!(snapshot.round.resolved_side, Some(CoinSide::Tails));
        assert!(snapshot.round.message.is_some());

        let history = handle.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, Outcome::Lose);

        sleep(Duration::from_millis(2_600)).await;
        assert_eq!(handle.snapshot().round.status, RoundStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_timeout_after_result_keeps_round_alive() {
        let source = ScriptedSource::new(vec![answer(10_000, Ok(CoinSide::Heads))]);
        let (mut engine, handle) = GameEngine::new(GameConfig::default(), source, HistoryLog::new(50));
        let (reply, _reply_rx) = oneshot::channel();
        engine.handle(EngineEvent::StartRound {
            choice: CoinSide::Heads,
            reply,
        });

        engine.handle(EngineEvent::ResultArrived {
            round_id: 1,
            result: Ok(CoinSide::Tails),
        });
        engine.handle(EngineEvent::RequestTimedOut { round_id: 1 });

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.round.status, RoundStatus::InProgress);
        assert_eq!(snapshot.round.resolved_side, Some(CoinSide::Tails));
        assert!(!snapshot.round.is_awaiting_result);
        assert!(snapshot.round.message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn landing_cue_follows_landing() {
        let handle = spawn(ScriptedSource::new(vec![answer(50, Ok(CoinSide::Heads))]));
        let mut rx = handle.subscribe();
        handle.start_round(CoinSide::Heads).await.unwrap();

        next_matching(&mut rx, |e| matches!(e, PresentationEvent::Landing { round_id: 1 })).await;
        let landed = Instant::now();
        next_matching(&mut rx, |e| {
            matches!(e, PresentationEvent::Sound(SoundCue::Landing))
        })
        .await;

        assert!(landed.elapsed() >= Duration::from_millis(690));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_start_while_in_progress() {
        let handle = spawn(ScriptedSource::new(vec![answer(100, Ok(CoinSide::Heads))]));
        handle.start_round(CoinSide::Heads).await.unwrap();

        let err = handle.start_round(CoinSide::Tails).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Round(RoundError::InvalidTransition(_))
        ));
        assert_eq!(handle.snapshot().round.round_id, 1);
        assert_eq!(handle.snapshot().round.player_choice, Some(CoinSide::Heads));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_round_and_cancels_fetch() {
        let source = ScriptedSource::new(vec![answer(20_000, Ok(CoinSide::Heads))]);
        let handle = spawn(source.clone());
        let mut rx = handle.subscribe();
        let started = Instant::now();

        handle.start_round(CoinSide::Heads).await.unwrap();
        let snapshot = wait_status(&handle, RoundStatus::Message).await;
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert_eq!(snapshot.round.message.as_deref(), Some(TIMEOUT_MESSAGE));
        assert!(!snapshot.round.is_awaiting_result);

        wait_status(&handle, RoundStatus::Idle).await;
        assert_eq!(source.cancelled(), 1);
        assert!(handle.history().is_empty());

        assert!(!drain(&mut rx).iter().any(|event| matches!(
            event,
            PresentationEvent::Settled { .. } | PresentationEvent::Landing { .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_shows_failure_message() {
        let failure = Err(FetchError::Failed("oracle offline".into()));
        let handle = spawn(ScriptedSource::new(vec![answer(100, failure)]));

        handle.start_round(CoinSide::Tails).await.unwrap();
        let snapshot = wait_status(&handle, RoundStatus::Message).await;

        assert_eq!(snapshot.round.message.as_deref(), Some(FAILURE_MESSAGE));
        assert!(handle.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_from_replaced_round_is_ignored() {
        let stubborn = Step {
            delay: Duration::from_secs(10),
            result: Ok(CoinSide::Tails),
            honor_cancel: false,
        };
        let handle = spawn(ScriptedSource::new(vec![
            stubborn,
            answer(5_000, Ok(CoinSide::Heads)),
        ]));

        handle.start_round(CoinSide::Heads).await.unwrap();
        wait_status(&handle, RoundStatus::Message).await;

        sleep(Duration::from_millis(500)).await;
        handle.start_round(CoinSide::Heads).await.unwrap();

        // Round 1's result lands around t = 10s while round 2 still waits for its own.
        sleep(Duration::from_millis(2_000)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.round.round_id, 2);
        assert_eq!(snapshot.round.status, RoundStatus::InProgress);
        assert_eq!(snapshot.round.resolved_side, None);
        assert!(snapshot.round.is_awaiting_result);

        let snapshot = wait_status(&handle, RoundStatus::Message).await;
        assert_eq!(snapshot.round.round_id, 2);
        assert_eq!(snapshot.round.resolved_side, Some(CoinSide::Heads));
        assert_eq!(handle.history()[0].result, CoinSide::Heads);
    }

    #[tokio::test(start_paused = true)]
    async fn message_timer_of_previous_round_is_dropped() {
        let handle = spawn(ScriptedSource::new(vec![
            answer(50, Ok(CoinSide::Heads)),
            answer(50, Ok(CoinSide::Heads)),
        ]));

        handle.start_round(CoinSide::Heads).await.unwrap();
        wait_status(&handle, RoundStatus::Message).await;

        sleep(Duration::from_millis(2_000)).await;
        let snapshot = handle.start_round(CoinSide::Tails).await.unwrap();
        assert_eq!(snapshot.round.round_id, 2);

        // Past the point where round 1's message would have expired.
        sleep(Duration::from_millis(600)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.round.round_id, 2);
        assert_eq!(snapshot.round.status, RoundStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_records_every_round_silently() {
        let handle = spawn(ScriptedSource::new(vec![
            answer(50, Ok(CoinSide::Heads)),
            answer(50, Ok(CoinSide::Tails)),
            answer(50, Ok(CoinSide::Heads)),
        ]));
        let mut rx = handle.subscribe();

        let snapshot = handle.start_batch(CoinSide::Heads, 3).await.unwrap();
        assert!(snapshot.batch.running);
        assert_eq!(snapshot.batch.remaining, 2);

        let snapshot = handle
            .watch_snapshot()
            .wait_for(|s| !s.batch.running)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.batch.remaining, 0);
        assert_eq!(snapshot.round.status, RoundStatus::Idle);
        assert_eq!(snapshot.round.round_id, 3);

        let history = handle.history();
        let rounds: Vec<RoundId> = history.iter().map(|e| e.round_id).collect();
        assert_eq!(rounds, vec![3, 2, 1]);
        assert_eq!(history[1].outcome, Outcome::Lose);

        assert!(!drain(&mut rx).iter().any(|event| matches!(
            event,
            PresentationEvent::RoundUpdated(round) if round.status == RoundStatus::Message
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_size_is_clamped() {
        let handle = spawn(ScriptedSource::new(Vec::new()));
        let snapshot = handle.start_batch(CoinSide::Tails, 500).await.unwrap();
        assert_eq!(snapshot.batch.remaining, 49);

        let err = handle.start_batch(CoinSide::Tails, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::BatchRunning));
        let err = handle.start_round(CoinSide::Tails).await.unwrap_err();
        assert!(matches!(err, EngineError::BatchRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_batch_finishes_current_round_with_message() {
        let handle = spawn(ScriptedSource::new(
            (0..5).map(|_| answer(50, Ok(CoinSide::Heads))).collect(),
        ));
        handle.start_batch(CoinSide::Heads, 5).await.unwrap();

        handle
            .watch_history()
            .wait_for(|history| history.len() == 1)
            .await
            .unwrap();
        let snapshot = handle.stop_batch().await.unwrap();
        assert!(!snapshot.batch.running);
        assert_eq!(snapshot.round.round_id, 2);
        assert_eq!(snapshot.round.status, RoundStatus::InProgress);

        let snapshot = wait_status(&handle, RoundStatus::Message).await;
        assert_eq!(snapshot.round.round_id, 2);
        wait_status(&handle, RoundStatus::Idle).await;

        assert_eq!(handle.history().len(), 2);
        assert_eq!(handle.snapshot().round.round_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_round_stops_batch() {
        let handle = spawn(ScriptedSource::new(vec![
            answer(50, Ok(CoinSide::Heads)),
            answer(50, Err(FetchError::Failed("boom".into()))),
        ]));
        handle.start_batch(CoinSide::Heads, 5).await.unwrap();

        let snapshot = wait_status(&handle, RoundStatus::Message).await;
        assert_eq!(snapshot.round.round_id, 2);
        assert_eq!(snapshot.round.message.as_deref(), Some(FAILURE_MESSAGE));
        assert!(!snapshot.batch.running);
        assert_eq!(handle.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_stops_on_shutdown() {
        let source = ScriptedSource::new(vec![answer(60_000, Ok(CoinSide::Heads))]);
        let (handle, task) =
            GameEngine::spawn(GameConfig::default(), source.clone(), HistoryLog::new(5));
        handle.start_round(CoinSide::Heads).await.unwrap();

        handle.shutdown();
        task.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(source.cancelled(), 1);
        assert!(matches!(
            handle.start_round(CoinSide::Heads).await,
            Err(EngineError::Stopped)
        ));
    }
}
