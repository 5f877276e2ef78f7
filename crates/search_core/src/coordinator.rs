//! Search coordinator.
//!
//! [`SearchEngine`] owns the evaluation pipeline, the shared cache and the
//! current search session (tree plus builder thread). The caller only ever
//! reads the tree: it blocks in [`SearchEngine::choose_move`] until the
//! builder has searched deep enough, the time budget runs out or the search is
//! stopped, then answers with the best move known.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::builder::{BuilderProgress, BuilderStatus, FrontierExpander, SharedTree};
use crate::cache::{CacheStats, EvalCache};
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::ordering::{ordered_moves, position_key, PositionKey};
use crate::pipeline::EvalPipeline;
use crate::rules::{BatchEvaluator, GameRules};
use crate::time_control::TimeControl;
use crate::tree::{RootChoice, SearchTree};

/// Where the answer of a `choose_move` call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveSource {
    /// Alpha-beta over the search tree.
    Search,
    /// Best cached score among the root's children.
    CacheFallback,
    /// Uniformly random legal move.
    RandomFallback,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport<M> {
    pub best_move: M,
    /// Value of the move from the maximizing side's point of view, if known.
    pub score: Option<f32>,
    /// Plies searched, at most the requested depth (0 for fallbacks)
    pub depth: usize,
    /// Nodes visited by the final alpha-beta pass
    pub nodes: u64,
    /// False if the search stopped at a pending node
    pub resolved: bool,
    pub source: MoveSource,
    pub elapsed: Duration,
}

/// Engine counters, serializable for logging or a host's `info` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub tree_nodes: usize,
    pub pending_leaves: usize,
    /// Plies expanded below the current root
    pub depth: usize,
    pub batches_submitted: u64,
    pub positions_submitted: u64,
    /// Batches and positions applied to the current tree
    pub batches_applied: u64,
    pub positions_applied: u64,
    /// False once the evaluator worker has exited
    pub evaluator_running: bool,
    pub cache: CacheStats,
}

impl EngineStats {
    pub fn to_json(&self) -> Result<String, SearchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A root choice with the work behind it.
struct Searched<M> {
    choice: RootChoice<M>,
    /// Nodes visited by the alpha-beta pass
    nodes: u64,
    /// Plies expanded below the root when the choice was made
    depth: usize,
}

/// Stops the engine from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    searching: Arc<AtomicBool>,
    clock: TimeControl,
}

impl StopHandle {
    /// Clear the searching flag and wake a blocked `choose_move`.
    ///
    /// Cooperative: an evaluator call already in progress finishes first.
    pub fn stop(&self) {
        self.searching.store(false, Ordering::Release);
        self.clock.stop();
    }
}

/// A tree, its builder and the key of the position at its root.
struct Session<R: GameRules> {
    tree: SharedTree<R>,
    progress: Arc<BuilderProgress>,
    root_key: PositionKey,
    worker: Option<JoinHandle<FrontierExpander<R>>>,
    parked: Option<FrontierExpander<R>>,
    failed: bool,
}

impl<R: GameRules> Session<R> {
    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Wait for the builder thread and keep the builder for a later restart.
    fn park(&mut self) -> Result<(), SearchError> {
        if let Some(worker) = self.worker.take() {
            let builder = worker
                .join()
                .map_err(|_| SearchError::WorkerPanicked("tree-builder"))?;
            self.parked = Some(builder);
        }
        Ok(())
    }
}

/// Game tree search driven by a batched evaluator on a worker thread.
pub struct SearchEngine<R: GameRules> {
    rules: Arc<R>,
    config: EngineConfig,
    cache: Arc<EvalCache>,
    pipeline: EvalPipeline<R::Input>,
    searching: Arc<AtomicBool>,
    clock: TimeControl,
    status_tx: Sender<BuilderStatus>,
    status_rx: Receiver<BuilderStatus>,
    session: Option<Session<R>>,
}

impl<R: GameRules> SearchEngine<R> {
    /// Validate `config` and start the evaluation pipeline.
    pub fn new<E>(rules: R, evaluator: E, config: EngineConfig) -> Result<Self, SearchError>
    where
        E: BatchEvaluator<Input = R::Input>,
    {
        config.validate()?;
        let pipeline =
            EvalPipeline::spawn(evaluator, config.max_eval_retries, config.retry_backoff())?;
        let (status_tx, status_rx) = mpsc::channel();
        info!(
            batch_size = config.batch_size,
            max_depth = config.max_depth,
            "Search engine started"
        );

        Ok(Self {
            rules: Arc::new(rules),
            cache: Arc::new(EvalCache::new(config.cache)),
            config,
            pipeline,
            searching: Arc::new(AtomicBool::new(false)),
            clock: TimeControl::default(),
            status_tx,
            status_rx,
            session: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn cache(&self) -> &Arc<EvalCache> {
        &self.cache
    }

    /// Pick a move for `position`.
    ///
    /// Blocks until the tree is searched `min_depth` plies deep with no
    /// pending node on the principal path, until `time_budget` runs out or
    /// until the search is stopped. `min_depth` is clamped to `1..=max_depth`.
    pub fn choose_move(
        &mut self,
        position: &R::Position,
        min_depth: usize,
        time_budget: Option<Duration>,
    ) -> Result<R::Move, SearchError> {
        self.choose_move_report(position, min_depth, time_budget)
            .map(|report| report.best_move)
    }

    /// [`choose_move`](Self::choose_move) with the search details.
    pub fn choose_move_report(
        &mut self,
        position: &R::Position,
        min_depth: usize,
        time_budget: Option<Duration>,
    ) -> Result<MoveReport<R::Move>, SearchError> {
        self.clock.set_limit(time_budget);
        self.clock.start();

        let legal = self.rules.legal_moves(position);
        if legal.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }

        if !self.evaluator_alive() {
            return self.fallback(position, legal);
        }

        let key = position_key(self.rules.as_ref(), position);
        self.begin(position, key)?;

        let depth = min_depth.clamp(1, self.config.max_depth);
        match self.wait_for_search(depth) {
            Ok(Some(Searched {
                choice,
                nodes,
                depth: reached,
            })) => {
                let resolved = choice.resolved && reached >= depth;
                debug!(
                    depth,
                    reached,
                    nodes,
                    value = choice.value,
                    resolved,
                    "Search chose move"
                );
                Ok(MoveReport {
                    best_move: choice.mv,
                    score: Some(choice.value),
                    depth: depth.min(reached),
                    nodes,
                    resolved,
                    source: MoveSource::Search,
                    elapsed: self.clock.elapsed(),
                })
            }
            Ok(None) => {
                info!("Search produced no move in time, falling back");
                self.fallback(position, legal)
            }
            Err(e) => {
                warn!("Search aborted, falling back: {}", e);
                self.fallback(position, legal)
            }
        }
    }

    /// False once the evaluator worker has exited. The first call after
    /// that joins the worker and logs how it ended.
    fn evaluator_alive(&mut self) -> bool {
        if self.pipeline.is_running() {
            return true;
        }
        if let Err(e) = self.pipeline.shutdown() {
            error!("Evaluator lost, answering from fallbacks: {}", e);
        }
        false
    }

    /// Reuse the current session for `key` or start a fresh one.
    fn begin(&mut self, position: &R::Position, key: PositionKey) -> Result<(), SearchError> {
        self.poll_status();
        let reusable = self
            .session
            .as_ref()
            .is_some_and(|s| s.root_key == key && !s.failed);
        if !reusable {
            if self.session.is_some() {
                debug!("Root position changed, discarding tree");
            }
            self.discard_session()?;
            self.session = Some(self.fresh_session(position.clone(), key));
        }
        self.start_builder()
    }

    fn fresh_session(&self, position: R::Position, key: PositionKey) -> Session<R> {
        let maximizing = self.rules.is_maximizing(&position);
        let tree = Arc::new(RwLock::new(SearchTree::new(position, key.clone(), maximizing)));
        let builder = FrontierExpander::new(
            Arc::clone(&self.rules),
            Arc::clone(&tree),
            Arc::clone(&self.cache),
            self.pipeline.client(),
            self.status_tx.clone(),
            &self.config,
        );
        Session {
            tree,
            progress: builder.progress(),
            root_key: key,
            worker: None,
            parked: Some(builder),
            failed: false,
        }
    }

    /// Set the searching flag and run the parked builder, if it has work left.
    fn start_builder(&mut self) -> Result<(), SearchError> {
        self.searching.store(true, Ordering::Release);
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.is_running() {
            return Ok(());
        }
        session.park()?;
        if let Some(builder) = session.parked.take() {
            if builder.is_complete() {
                session.parked = Some(builder);
            } else {
                session.worker = Some(builder.spawn(Arc::clone(&self.searching))?);
            }
        }
        Ok(())
    }

    /// Stop the builder thread and wait for it.
    fn park_builder(&mut self) -> Result<(), SearchError> {
        self.searching.store(false, Ordering::Release);
        match self.session.as_mut() {
            Some(session) => session.park(),
            None => Ok(()),
        }
    }

    fn discard_session(&mut self) -> Result<(), SearchError> {
        self.park_builder()?;
        self.session = None;
        // Events from the discarded builder
        while self.status_rx.try_recv().is_ok() {}
        Ok(())
    }

    /// Handle queued builder events. Returns the failure, if one was reported.
    fn poll_status(&mut self) -> Option<SearchError> {
        let mut failure = None;
        while let Ok(status) = self.status_rx.try_recv() {
            if let Some(e) = self.handle_status(status) {
                failure = Some(e);
            }
        }
        failure
    }

    fn handle_status(&mut self, status: BuilderStatus) -> Option<SearchError> {
        match status {
            BuilderStatus::Failed(e) => {
                if let Some(session) = self.session.as_mut() {
                    session.failed = true;
                }
                Some(e)
            }
            BuilderStatus::Complete { depth } => {
                debug!(depth, "Tree builder finished");
                None
            }
            BuilderStatus::PlyExpanded { .. } | BuilderStatus::BatchApplied { .. } => None,
        }
    }

    /// Block until the root is resolved at `depth` or the wait must end.
    ///
    /// Returns the best choice known at that point.
    fn wait_for_search(
        &mut self,
        depth: usize,
    ) -> Result<Option<Searched<R::Move>>, SearchError> {
        let poll = self.config.poll_interval();
        loop {
            // Read before draining: a finished builder has already sent its last event
            let finished = self.session.as_ref().map_or(true, |s| !s.is_running());
            if let Some(e) = self.poll_status() {
                return Err(e);
            }
            let Some(session) = self.session.as_ref() else {
                return Ok(None);
            };

            // Depth before the tree: the tree is never shallower than this
            let expanded = if session.progress.exhausted() {
                depth
            } else {
                session.progress.depth()
            };
            let mut nodes = 0;
            let choice = session.tree.read().choose_root_move(depth, &mut nodes);
            let resolved = choice.as_ref().is_some_and(|c| c.resolved);

            if (expanded >= depth && resolved) || finished || self.clock.check_time() {
                return Ok(choice.map(|choice| Searched {
                    choice,
                    nodes,
                    depth: expanded,
                }));
            }

            match self.status_rx.recv_timeout(self.clock.next_wait(poll)) {
                Ok(status) => {
                    if let Some(e) = self.handle_status(status) {
                        return Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    /// Best cached child of `position`, else a random legal move.
    fn fallback(
        &self,
        position: &R::Position,
        legal: Vec<R::Move>,
    ) -> Result<MoveReport<R::Move>, SearchError> {
        let rules = self.rules.as_ref();
        let maximizing = rules.is_maximizing(position);

        let mut best: Option<(R::Move, f32)> = None;
        for (mv, _) in ordered_moves(rules, position) {
            let key = position_key(rules, &rules.apply(position, &mv));
            let Some(value) = self.cache.lookup(&key) else {
                continue;
            };
            let improves = match best {
                Some((_, b)) if maximizing => value > b,
                Some((_, b)) => value < b,
                None => true,
            };
            if improves {
                best = Some((mv, value));
            }
        }

        if let Some((best_move, value)) = best {
            info!(?best_move, value, "Answering from cache");
            return Ok(MoveReport {
                best_move,
                score: Some(value),
                depth: 0,
                nodes: 0,
                resolved: false,
                source: MoveSource::CacheFallback,
                elapsed: self.clock.elapsed(),
            });
        }

        let best_move = legal
            .choose(&mut thread_rng())
            .cloned()
            .ok_or(SearchError::NoLegalMoves)?;
        warn!(?best_move, "No scores available, answering with a random move");
        Ok(MoveReport {
            best_move,
            score: None,
            depth: 0,
            nodes: 0,
            resolved: false,
            source: MoveSource::RandomFallback,
            elapsed: self.clock.elapsed(),
        })
    }

    /// Root advancement after `own` was played and answered with `reply`.
    ///
    /// Keeps the subtree under the two played moves and resumes building
    /// there. If that line was never expanded the engine starts a fresh tree
    /// at the resulting position instead. Either move being illegal is a
    /// [`SearchError::RulesViolation`]. Without a position to advance from
    /// (before the first search, or after a reset) this is
    /// [`SearchError::NoActivePosition`].
    pub fn advance(&mut self, own: &R::Move, reply: &R::Move) -> Result<(), SearchError> {
        let Some(session) = self.session.as_ref() else {
            return Err(SearchError::NoActivePosition);
        };
        let root_position = {
            let tree = session.tree.read();
            tree.node(tree.root()).position().clone()
        };

        let rules = Arc::clone(&self.rules);
        if !rules.legal_moves(&root_position).contains(own) {
            return Err(SearchError::RulesViolation {
                mv: format!("{own:?}"),
            });
        }
        let after_own = rules.apply(&root_position, own);
        if !rules.legal_moves(&after_own).contains(reply) {
            return Err(SearchError::RulesViolation {
                mv: format!("{reply:?}"),
            });
        }
        let next = rules.apply(&after_own, reply);
        let next_key = position_key(rules.as_ref(), &next);

        self.park_builder()?;
        self.poll_status();

        let advanced = match self.session.as_mut() {
            Some(session) if !session.failed => match session.parked.as_mut() {
                Some(builder) => match builder.advance_root(own, reply) {
                    Ok(()) => {
                        session.root_key = next_key.clone();
                        true
                    }
                    Err(SearchError::RootAdvancementMiss) => false,
                    Err(e) => return Err(e),
                },
                None => false,
            },
            _ => false,
        };

        if advanced {
            debug!(root = %next_key, "Advanced root");
        } else {
            debug!(root = %next_key, "Line not in searched tree, rebuilding root");
            self.discard_session()?;
            self.session = Some(self.fresh_session(next, next_key));
        }
        self.start_builder()
    }

    /// Discard the tree. The evaluation cache is kept.
    pub fn reset(&mut self) -> Result<(), SearchError> {
        self.discard_session()?;
        info!("Search tree discarded");
        Ok(())
    }

    /// Cooperatively stop the builder and wake a blocked `choose_move`.
    pub fn stop_searching(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            searching: Arc::clone(&self.searching),
            clock: self.clock.clone(),
        }
    }

    /// Whether the builder thread is currently running.
    pub fn is_searching(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn stats(&self) -> EngineStats {
        let client = self.pipeline.client();
        let (tree_nodes, pending_leaves, depth, batches_applied, positions_applied) =
            match &self.session {
                Some(session) => {
                    let tree = session.tree.read();
                    (
                        tree.len(),
                        tree.pending_leaves(),
                        session.progress.depth(),
                        session.progress.batches_applied(),
                        session.progress.positions_applied(),
                    )
                }
                None => (0, 0, 0, 0, 0),
            };

        EngineStats {
            tree_nodes,
            pending_leaves,
            depth,
            batches_submitted: client.batches_submitted(),
            positions_submitted: client.positions_submitted(),
            batches_applied,
            positions_applied,
            evaluator_running: self.pipeline.is_running(),
            cache: self.cache.stats(),
        }
    }
}

impl<R: GameRules> Drop for SearchEngine<R> {
    fn drop(&mut self) {
        if let Err(e) = self.park_builder() {
            warn!("{}", e);
        }
    }
}
