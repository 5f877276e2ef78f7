//! Tree builder: expands the frontier one ply at a time and feeds the
//! evaluation pipeline.
//!
//! The builder is the only writer of the search tree. It runs on its own
//! thread while the engine's `searching` flag is set, and hands itself back
//! through the thread's join handle so the coordinator can advance the root
//! and restart it without losing in-flight batches.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::cache::EvalCache;
use crate::config::{EngineConfig, FlushPolicy};
use crate::error::SearchError;
use crate::ordering::{ordered_moves, position_key, PositionKey};
use crate::pipeline::{PipelineClient, ScoredBatch};
use crate::rules::GameRules;
use crate::tree::{NodeId, SearchTree, MAX_NODES};

/// Tree shared between the builder (writer) and the coordinator (reader).
pub type SharedTree<R> =
    Arc<RwLock<SearchTree<<R as GameRules>::Position, <R as GameRules>::Move>>>;

/// Events the builder reports to the coordinator.
#[derive(Debug)]
pub enum BuilderStatus {
    /// A ply was expanded; the frontier is now `depth` plies deep.
    PlyExpanded { depth: usize, frontier: usize },
    /// A result batch was applied to the tree.
    BatchApplied { batch: u64, positions: usize },
    /// Nothing left to expand or score.
    Complete { depth: usize },
    /// The builder stopped on an error.
    Failed(SearchError),
}

/// Counters shared with the coordinator.
#[derive(Debug, Default)]
pub struct BuilderProgress {
    depth: AtomicUsize,
    exhausted: AtomicBool,
    batches_applied: AtomicU64,
    positions_applied: AtomicU64,
}

impl BuilderProgress {
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// True when no position on the frontier has a legal move, so the tree
    /// holds the whole game below the root.
    pub fn exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::Relaxed)
    }

    pub fn positions_applied(&self) -> u64 {
        self.positions_applied.load(Ordering::Relaxed)
    }
}

/// Outcome of one [`FrontierExpander::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Expanded,
    Applied(usize),
    Waiting,
    Complete,
}

/// Pending-Update Record: nodes waiting on one submitted batch, in batch order.
#[derive(Debug)]
struct PendingUpdate {
    batch: u64,
    keys: Vec<PositionKey>,
    /// Nodes per key. Several nodes share a key when positions transpose.
    waiters: Vec<Vec<NodeId>>,
}

/// A position queued for the next batch.
#[derive(Debug)]
struct Queued<I> {
    key: PositionKey,
    input: I,
    waiters: Vec<NodeId>,
}

/// Where a position awaiting its score currently sits.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Queued(usize),
    InFlight { batch: u64, index: usize },
}

/// Ply-by-ply frontier expansion over a shared tree.
pub struct FrontierExpander<R: GameRules> {
    rules: Arc<R>,
    tree: SharedTree<R>,
    cache: Arc<EvalCache>,
    client: PipelineClient<R::Input>,
    status: Sender<BuilderStatus>,
    progress: Arc<BuilderProgress>,

    batch_size: usize,
    flush: FlushPolicy,
    max_depth: usize,
    max_nodes: usize,
    poll_interval: Duration,

    frontier: Vec<NodeId>,
    depth: usize,
    queued: Vec<Queued<R::Input>>,
    in_flight: VecDeque<PendingUpdate>,
    awaiting: HashMap<PositionKey, Slot>,
    idle_ticks: u32,
    /// Set when the next ply would exceed `max_nodes`.
    full: bool,
}

impl<R: GameRules> FrontierExpander<R> {
    /// Builder for a tree whose only frontier node is its root.
    pub fn new(
        rules: Arc<R>,
        tree: SharedTree<R>,
        cache: Arc<EvalCache>,
        client: PipelineClient<R::Input>,
        status: Sender<BuilderStatus>,
        config: &EngineConfig,
    ) -> Self {
        let root = tree.read().root();
        Self {
            rules,
            tree,
            cache,
            client,
            status,
            progress: Arc::new(BuilderProgress::default()),
            batch_size: config.batch_size.max(1),
            flush: config.flush,
            max_depth: config.max_depth,
            max_nodes: config.max_tree_nodes.min(MAX_NODES),
            poll_interval: config.poll_interval(),
            frontier: vec![root],
            depth: 0,
            queued: Vec::new(),
            in_flight: VecDeque::new(),
            awaiting: HashMap::new(),
            idle_ticks: 0,
            full: false,
        }
    }

    pub fn tree(&self) -> &SharedTree<R> {
        &self.tree
    }

    pub fn progress(&self) -> Arc<BuilderProgress> {
        Arc::clone(&self.progress)
    }

    /// Number of fully expanded plies below the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn frontier(&self) -> &[NodeId] {
        &self.frontier
    }

    /// Positions queued or in flight.
    pub fn awaiting(&self) -> usize {
        self.awaiting.len()
    }

    pub fn batches_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// True once there is nothing left to expand, submit or apply.
    pub fn is_complete(&self) -> bool {
        !self.can_expand() && self.queued.is_empty() && self.in_flight.is_empty()
    }

    fn can_expand(&self) -> bool {
        self.depth < self.max_depth && !self.frontier.is_empty() && !self.full
    }

    /// Do one unit of work.
    ///
    /// Drains finished batches, then expands one ply if the depth limit allows.
    /// With nothing to expand it flushes per the flush policy and waits up to
    /// one poll interval for a result.
    pub fn step(&mut self) -> Result<Step, SearchError> {
        let applied = self.drain_results()?;

        if self.can_expand() {
            self.expand_ply()?;
            return Ok(Step::Expanded);
        }
        if applied > 0 {
            return Ok(Step::Applied(applied));
        }

        if !self.queued.is_empty() {
            self.idle_ticks += 1;
            let due = match self.flush {
                FlushPolicy::Immediate => true,
                FlushPolicy::AfterTicks(ticks) => self.idle_ticks >= ticks,
            };
            if due {
                self.submit_queued()?;
            }
        }
        if self.is_complete() {
            return Ok(Step::Complete);
        }

        match self.client.recv_timeout(self.poll_interval)? {
            Some(batch) => Ok(Step::Applied(self.apply_batch(batch)?)),
            None => Ok(Step::Waiting),
        }
    }

    /// Apply every finished batch without blocking. Returns the number of
    /// positions scored.
    pub fn drain_results(&mut self) -> Result<usize, SearchError> {
        let mut applied = 0;
        while let Some(batch) = self.client.try_recv()? {
            applied += self.apply_batch(batch)?;
        }
        Ok(applied)
    }

    fn apply_batch(&mut self, batch: ScoredBatch) -> Result<usize, SearchError> {
        let scores = batch
            .outcome
            .map_err(|source| SearchError::EvaluatorUnavailable {
                attempts: batch.attempts,
                source,
            })?;

        for (key, &score) in batch.keys.iter().zip(&scores) {
            self.cache.insert(key.clone(), score);
        }

        match self.in_flight.front() {
            Some(record) if record.batch == batch.id => {}
            Some(record) if record.batch < batch.id => {
                warn!(
                    expected = record.batch,
                    received = batch.id,
                    "Result batch out of order, caching only"
                );
                return Ok(0);
            }
            _ => {
                debug!(batch = batch.id, "Stale result batch, caching only");
                return Ok(0);
            }
        }
        let Some(record) = self.in_flight.pop_front() else {
            return Ok(0);
        };

        let mut positions = 0;
        {
            let mut tree = self.tree.write();
            for ((key, waiters), &score) in record.keys.iter().zip(record.waiters).zip(&scores) {
                self.awaiting.remove(key);
                for id in waiters {
                    tree.set_score(id, score);
                    positions += 1;
                }
            }
            tree.traverse();
        }

        self.progress.batches_applied.fetch_add(1, Ordering::Relaxed);
        self.progress
            .positions_applied
            .fetch_add(positions as u64, Ordering::Relaxed);
        self.notify(BuilderStatus::BatchApplied {
            batch: record.batch,
            positions,
        });
        Ok(positions)
    }

    /// Expand every frontier node by one ply.
    ///
    /// Children are generated outside the tree lock and attached in one write,
    /// so readers never see a half-expanded ply.
    fn expand_ply(&mut self) -> Result<(), SearchError> {
        let frontier: Vec<_> = {
            let tree = self.tree.read();
            self.frontier
                .iter()
                .map(|&id| (id, tree.node(id).position().clone()))
                .collect()
        };

        let rules = self.rules.as_ref();
        let expansions: Vec<_> = frontier
            .into_iter()
            .map(|(parent, position)| {
                let children: Vec<_> = ordered_moves(rules, &position)
                    .into_iter()
                    .map(|(mv, _)| {
                        let child = rules.apply(&position, &mv);
                        let key = position_key(rules, &child);
                        let score = self.cache.lookup(&key);
                        (mv, child, key, score)
                    })
                    .collect();
                (parent, children)
            })
            .collect();

        let added: usize = expansions.iter().map(|(_, children)| children.len()).sum();
        let size = self.tree.read().len();
        if size.saturating_add(added) > self.max_nodes {
            warn!(
                depth = self.depth,
                nodes = size,
                limit = self.max_nodes,
                "Tree node limit reached, not expanding further"
            );
            self.full = true;
            return Ok(());
        }

        let mut next = Vec::new();
        let mut misses = Vec::new();
        {
            let mut tree = self.tree.write();
            for (parent, children) in expansions {
                for (mv, child, key, score) in children {
                    let pending = score.is_none().then(|| child.clone());
                    let id = tree.add_child(parent, mv, child, key.clone(), score);
                    if let Some(child) = pending {
                        misses.push((id, key, child));
                    }
                    next.push(id);
                }
            }
            tree.traverse();
        }

        for (id, key, child) in misses {
            self.enqueue(id, key, &child)?;
        }

        if self.flush == FlushPolicy::Immediate {
            self.submit_queued()?;
        }

        self.frontier = next;
        self.depth += 1;
        self.progress
            .exhausted
            .store(self.frontier.is_empty(), Ordering::Release);
        self.progress.depth.store(self.depth, Ordering::Release);

        debug!(
            depth = self.depth,
            frontier = self.frontier.len(),
            "Expanded ply"
        );
        self.notify(BuilderStatus::PlyExpanded {
            depth: self.depth,
            frontier: self.frontier.len(),
        });
        Ok(())
    }

    /// Queue a node for scoring, joining an existing request for the same key.
    fn enqueue(
        &mut self,
        id: NodeId,
        key: PositionKey,
        position: &R::Position,
    ) -> Result<(), SearchError> {
        match self.awaiting.get(&key).copied() {
            Some(Slot::Queued(index)) => {
                self.queued[index].waiters.push(id);
                return Ok(());
            }
            Some(Slot::InFlight { batch, index }) => {
                if let Some(record) = self.in_flight.iter_mut().find(|r| r.batch == batch) {
                    record.waiters[index].push(id);
                    return Ok(());
                }
            }
            None => {}
        }

        let input = self.rules.encode(position);
        self.awaiting
            .insert(key.clone(), Slot::Queued(self.queued.len()));
        self.queued.push(Queued {
            key,
            input,
            waiters: vec![id],
        });

        if self.queued.len() >= self.batch_size {
            self.submit_queued()?;
        }
        Ok(())
    }

    /// Submit everything queued as one batch.
    fn submit_queued(&mut self) -> Result<(), SearchError> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let queued = std::mem::take(&mut self.queued);
        let mut keys = Vec::with_capacity(queued.len());
        let mut inputs = Vec::with_capacity(queued.len());
        let mut waiters = Vec::with_capacity(queued.len());
        for entry in queued {
            keys.push(entry.key);
            inputs.push(entry.input);
            waiters.push(entry.waiters);
        }

        let batch = self.client.submit(keys.clone(), inputs)?;
        for (index, key) in keys.iter().enumerate() {
            self.awaiting
                .insert(key.clone(), Slot::InFlight { batch, index });
        }
        debug!(batch, positions = keys.len(), "Submitted batch");
        self.in_flight.push_back(PendingUpdate {
            batch,
            keys,
            waiters,
        });
        self.idle_ticks = 0;
        Ok(())
    }

    /// Move the root two plies down the line actually played.
    ///
    /// On success the frontier, queued and in-flight records are remapped to
    /// the compacted tree and the depth drops by two. On a miss nothing changes.
    pub fn advance_root(&mut self, own: &R::Move, reply: &R::Move) -> Result<(), SearchError> {
        let target = self.tree.read().find_line(own, reply)?;
        let remap = {
            let mut tree = self.tree.write();
            let remap = tree.reroot(target);
            tree.traverse();
            remap
        };
        let keep = |ids: &mut Vec<NodeId>| {
            *ids = ids.iter().filter_map(|id| remap[id.index()]).collect();
        };

        keep(&mut self.frontier);
        for entry in &mut self.queued {
            keep(&mut entry.waiters);
        }
        for record in &mut self.in_flight {
            for waiters in &mut record.waiters {
                keep(waiters);
            }
        }

        self.depth = self.depth.saturating_sub(2);
        self.full = false;
        self.progress
            .exhausted
            .store(self.frontier.is_empty(), Ordering::Release);
        self.progress.depth.store(self.depth, Ordering::Release);
        debug!(depth = self.depth, "Advanced root by two plies");
        Ok(())
    }

    fn notify(&self, status: BuilderStatus) {
        // The coordinator may have stopped listening
        let _ = self.status.send(status);
    }

    /// Run until `searching` is cleared, the tree is complete or an error occurs.
    pub fn run(mut self, searching: Arc<AtomicBool>) -> Self {
        while searching.load(Ordering::Acquire) {
            match self.step() {
                Ok(Step::Complete) => {
                    self.notify(BuilderStatus::Complete { depth: self.depth });
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Tree builder stopped: {}", e);
                    self.notify(BuilderStatus::Failed(e));
                    break;
                }
            }
        }
        self
    }

    /// Run on a dedicated thread. Joining the handle returns the builder.
    pub fn spawn(self, searching: Arc<AtomicBool>) -> Result<JoinHandle<Self>, SearchError> {
        thread::Builder::new()
            .name("tree-builder".to_string())
            .spawn(move || self.run(searching))
            .map_err(|source| SearchError::WorkerSpawn {
                name: "tree-builder",
                source,
            })
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;
