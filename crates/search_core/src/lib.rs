//! Search Core
//!
//! Alpha-beta game tree search whose leaves are scored asynchronously by a
//! batched evaluator (typically a neural network) running on a worker thread.
//!
//! The pieces, bottom-up:
//! - [`rules`]: the game rules and evaluator traits the engine is generic over
//! - [`cache`]: evaluation cache shared by all threads
//! - [`pipeline`]: the evaluator worker thread and its channels
//! - [`tree`]: arena-backed minimax tree with pending-aware alpha-beta
//! - [`builder`]: frontier expansion and result application
//! - [`coordinator`]: [`SearchEngine`], the entry point for a host

pub mod builder;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ordering;
pub mod pipeline;
pub mod rules;
pub mod time_control;
pub mod tree;

pub use cache::{CacheStats, EvalCache};
pub use config::{CachePolicy, EngineConfig, FlushPolicy};
pub use coordinator::{EngineStats, MoveReport, MoveSource, SearchEngine, StopHandle};
pub use error::{EvaluatorError, SearchError};
pub use ordering::{ordered_moves, MoveClass, PositionKey};
pub use rules::{BatchEvaluator, GameRules};
pub use time_control::TimeControl;
pub use tree::{Evaluation, NodeId, Probe, RootChoice, SearchTree};
