//! Collaborator traits: the game rules engine and the batched position evaluator.
//!
//! The search engine never looks inside a position. Everything it needs to
//! know about the game goes through [`GameRules`], and every score comes from
//! a [`BatchEvaluator`] running on the pipeline worker thread.

use std::fmt::Debug;

use crate::error::EvaluatorError;
use crate::ordering::PositionKey;

/// Game rules consumed by the tree builder and the coordinator.
///
/// Positions are immutable values: [`apply`](GameRules::apply) returns a new
/// position and leaves its argument untouched.
pub trait GameRules: Send + Sync + 'static {
    type Position: Clone + Send + Sync + 'static;
    type Move: Clone + PartialEq + Debug + Send + Sync + 'static;
    /// Evaluator input produced by [`encode`](GameRules::encode).
    type Input: Send + 'static;

    /// Whether the side to move at `pos` is the maximizing side (White in chess).
    fn is_maximizing(&self, pos: &Self::Position) -> bool;

    /// All legal moves, in the rules engine's own enumeration order.
    fn legal_moves(&self, pos: &Self::Position) -> Vec<Self::Move>;

    /// Whether playing `mv` gives check.
    fn is_check(&self, pos: &Self::Position, mv: &Self::Move) -> bool;

    /// Whether playing `mv` captures material.
    fn is_capture(&self, pos: &Self::Position, mv: &Self::Move) -> bool;

    /// Play `mv` and return the resulting position.
    fn apply(&self, pos: &Self::Position, mv: &Self::Move) -> Self::Position;

    /// Canonical identity of a position (FEN for chess). Transposed positions
    /// must produce equal keys.
    fn canonical_key(&self, pos: &Self::Position) -> PositionKey;

    /// Encode a position into the evaluator's input format.
    fn encode(&self, pos: &Self::Position) -> Self::Input;
}

/// An opaque batched scoring function, typically a neural network.
///
/// `score_batch` must return exactly one score per input, in input order.
/// Scores are from the maximizing side's point of view.
pub trait BatchEvaluator: Send + 'static {
    type Input: Send + 'static;

    fn score_batch(&mut self, inputs: &[Self::Input]) -> Result<Vec<f32>, EvaluatorError>;
}

impl<E: BatchEvaluator + ?Sized> BatchEvaluator for Box<E> {
    type Input = E::Input;

    fn score_batch(&mut self, inputs: &[Self::Input]) -> Result<Vec<f32>, EvaluatorError> {
        (**self).score_batch(inputs)
    }
}
