//! Batch evaluation pipeline.
//!
//! A single worker thread owns the evaluator. Submitted batches go through one
//! request channel and scored batches come back through one result channel,
//! so results arrive in submission order.
//!
//! ```text
//!  builder ──ScoreRequest──▶ [requests] ──▶ worker ──▶ evaluator.score_batch
//!     ▲                                        │
//!     └──────────ScoredBatch◀── [results] ◀────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{EvaluatorError, SearchError};
use crate::ordering::PositionKey;
use crate::rules::BatchEvaluator;

/// One unit of work for the evaluator.
#[derive(Debug)]
pub struct ScoreRequest<I> {
    pub id: u64,
    pub keys: Vec<PositionKey>,
    pub inputs: Vec<I>,
}

/// Scores for one request, in request order.
#[derive(Debug)]
pub struct ScoredBatch {
    pub id: u64,
    pub keys: Vec<PositionKey>,
    pub outcome: Result<Vec<f32>, EvaluatorError>,
    /// Evaluator calls made for this batch, retries included.
    pub attempts: u32,
}

enum PipelineMessage<I> {
    Score(ScoreRequest<I>),
    Shutdown,
}

/// Submission and result endpoints of the pipeline. Cheap to clone.
pub struct PipelineClient<I> {
    requests: Sender<PipelineMessage<I>>,
    results: Arc<Mutex<Receiver<ScoredBatch>>>,
    next_id: Arc<AtomicU64>,
    batches_submitted: Arc<AtomicU64>,
    positions_submitted: Arc<AtomicU64>,
}

impl<I> Clone for PipelineClient<I> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            results: Arc::clone(&self.results),
            next_id: Arc::clone(&self.next_id),
            batches_submitted: Arc::clone(&self.batches_submitted),
            positions_submitted: Arc::clone(&self.positions_submitted),
        }
    }
}

fn worker_gone() -> SearchError {
    SearchError::EvaluatorUnavailable {
        attempts: 0,
        source: EvaluatorError::Shutdown,
    }
}

impl<I: Send + 'static> PipelineClient<I> {
    /// Queue a batch for scoring and return its id.
    ///
    /// `keys` and `inputs` must have the same length.
    pub fn submit(&self, keys: Vec<PositionKey>, inputs: Vec<I>) -> Result<u64, SearchError> {
        debug_assert_eq!(keys.len(), inputs.len());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let positions = inputs.len() as u64;
        self.requests
            .send(PipelineMessage::Score(ScoreRequest { id, keys, inputs }))
            .map_err(|_| worker_gone())?;
        self.batches_submitted.fetch_add(1, Ordering::Relaxed);
        self.positions_submitted
            .fetch_add(positions, Ordering::Relaxed);
        Ok(id)
    }

    /// Take a finished batch if one is ready.
    pub fn try_recv(&self) -> Result<Option<ScoredBatch>, SearchError> {
        match self.results.lock().try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(worker_gone()),
        }
    }

    /// Wait up to `timeout` for a finished batch.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ScoredBatch>, SearchError> {
        match self.results.lock().recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }

    pub fn batches_submitted(&self) -> u64 {
        self.batches_submitted.load(Ordering::Relaxed)
    }

    pub fn positions_submitted(&self) -> u64 {
        self.positions_submitted.load(Ordering::Relaxed)
    }
}

/// Owner of the evaluator worker thread.
///
/// The worker runs until [`shutdown`](EvalPipeline::shutdown) is called or the
/// pipeline is dropped.
pub struct EvalPipeline<I: Send + 'static> {
    client: PipelineClient<I>,
    worker: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> EvalPipeline<I> {
    /// Start the worker thread.
    ///
    /// A failing batch is retried `max_retries` times, `retry_backoff` apart,
    /// before its error is published as the batch outcome.
    pub fn spawn<E>(
        evaluator: E,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Result<Self, SearchError>
    where
        E: BatchEvaluator<Input = I>,
    {
        let (request_tx, request_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("eval-pipeline".to_string())
            .spawn(move || {
                run_worker(evaluator, request_rx, result_tx, max_retries, retry_backoff)
            })
            .map_err(|source| SearchError::WorkerSpawn {
                name: "eval-pipeline",
                source,
            })?;

        Ok(Self {
            client: PipelineClient {
                requests: request_tx,
                results: Arc::new(Mutex::new(result_rx)),
                next_id: Arc::new(AtomicU64::new(0)),
                batches_submitted: Arc::new(AtomicU64::new(0)),
                positions_submitted: Arc::new(AtomicU64::new(0)),
            },
            worker: Some(worker),
        })
    }

    pub fn client(&self) -> PipelineClient<I> {
        self.client.clone()
    }

    /// Stop the worker after the batch it is currently scoring.
    pub fn shutdown(&mut self) -> Result<(), SearchError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // The worker may already be gone; joining tells us how it ended.
        let _ = self.client.requests.send(PipelineMessage::Shutdown);
        worker
            .join()
            .map_err(|_| SearchError::WorkerPanicked("eval-pipeline"))
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl<I: Send + 'static> Drop for EvalPipeline<I> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("{}", e);
        }
    }
}

fn run_worker<E: BatchEvaluator>(
    mut evaluator: E,
    requests: Receiver<PipelineMessage<E::Input>>,
    results: Sender<ScoredBatch>,
    max_retries: u32,
    retry_backoff: Duration,
) {
    info!("Evaluation worker started");
    while let Ok(message) = requests.recv() {
        let request = match message {
            PipelineMessage::Score(request) => request,
            PipelineMessage::Shutdown => break,
        };

        let (outcome, attempts) =
            score_with_retries(&mut evaluator, &request.inputs, max_retries, retry_backoff);
        debug!(
            batch = request.id,
            positions = request.inputs.len(),
            attempts,
            "Scored batch"
        );

        let batch = ScoredBatch {
            id: request.id,
            keys: request.keys,
            outcome,
            attempts,
        };
        if results.send(batch).is_err() {
            debug!("Result receiver dropped");
            break;
        }
    }
    info!("Evaluation worker stopped");
}

/// Call the evaluator until it succeeds or `max_retries` retries are spent.
///
/// A reply with the wrong number of scores counts as a failure.
pub(crate) fn score_with_retries<E: BatchEvaluator>(
    evaluator: &mut E,
    inputs: &[E::Input],
    max_retries: u32,
    retry_backoff: Duration,
) -> (Result<Vec<f32>, EvaluatorError>, u32) {
    if inputs.is_empty() {
        return (Ok(Vec::new()), 0);
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = evaluator.score_batch(inputs).and_then(|scores| {
            if scores.len() == inputs.len() {
                Ok(scores)
            } else {
                Err(EvaluatorError::LengthMismatch {
                    expected: inputs.len(),
                    actual: scores.len(),
                })
            }
        });

        match result {
            Ok(scores) => return (Ok(scores), attempts),
            Err(e) if attempts <= max_retries => {
                warn!(attempts, "Evaluator call failed, retrying: {}", e);
                if !retry_backoff.is_zero() {
                    thread::sleep(retry_backoff);
                }
            }
            Err(e) => {
                error!(attempts, "Evaluator call failed, giving up: {}", e);
                return (Err(e), attempts);
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
