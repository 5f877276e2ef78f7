//! Shared fixtures: small explicit games and scripted evaluators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use search_core::{BatchEvaluator, EvaluatorError, GameRules, PositionKey};

/// A game given as an explicit move table.
///
/// Move names follow chess notation: a trailing `+` gives check and an `x`
/// marks a capture. The evaluator input of a position is its table value.
#[derive(Debug, Default)]
pub struct TableGame {
    edges: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
    values: HashMap<&'static str, f32>,
    minimizing: HashSet<&'static str>,
}

impl TableGame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(mut self, from: &'static str, mv: &'static str, to: &'static str) -> Self {
        self.edges.entry(from).or_default().push((mv, to));
        self
    }

    pub fn value(mut self, pos: &'static str, value: f32) -> Self {
        self.values.insert(pos, value);
        self
    }

    /// Mark `pos` as having the minimizing side to move.
    pub fn minimizing(mut self, pos: &'static str) -> Self {
        self.minimizing.insert(pos);
        self
    }

    /// Exact minimax value of `pos`, searching to the end of the table.
    pub fn minimax(&self, pos: &'static str, maximizing: bool) -> f32 {
        let Some(moves) = self.edges.get(pos) else {
            return self.values.get(pos).copied().unwrap_or(0.0);
        };
        let values = moves.iter().map(|(_, to)| self.minimax(to, !maximizing));
        if maximizing {
            values.fold(f32::NEG_INFINITY, f32::max)
        } else {
            values.fold(f32::INFINITY, f32::min)
        }
    }
}

impl GameRules for TableGame {
    type Position = &'static str;
    type Move = &'static str;
    type Input = f32;

    fn is_maximizing(&self, pos: &&'static str) -> bool {
        !self.minimizing.contains(pos)
    }

    fn legal_moves(&self, pos: &&'static str) -> Vec<&'static str> {
        self.edges
            .get(pos)
            .map(|moves| moves.iter().map(|(mv, _)| *mv).collect())
            .unwrap_or_default()
    }

    fn is_check(&self, _pos: &&'static str, mv: &&'static str) -> bool {
        mv.ends_with('+')
    }

    fn is_capture(&self, _pos: &&'static str, mv: &&'static str) -> bool {
        mv.contains('x')
    }

    fn apply(&self, pos: &&'static str, mv: &&'static str) -> &'static str {
        self.edges
            .get(pos)
            .and_then(|moves| moves.iter().find(|(m, _)| m == mv))
            .map(|(_, to)| *to)
            .unwrap_or_else(|| panic!("{mv} is not legal in {pos}"))
    }

    fn canonical_key(&self, pos: &&'static str) -> PositionKey {
        PositionKey::from(*pos)
    }

    fn encode(&self, pos: &&'static str) -> f32 {
        self.values.get(pos).copied().unwrap_or(0.0)
    }
}

/// Root `r` (max) with moves a, b, c; each reply leads to a scored leaf.
///
/// a -> [3, 12], b -> [2, 8], c -> [14, 1]; the root's value is 3 via `a`.
pub fn depth_two_game() -> TableGame {
    let lines = [
        ("a", "A", [("a1", "A1", 3.0), ("a2", "A2", 12.0)]),
        ("b", "B", [("b1", "B1", 2.0), ("b2", "B2", 8.0)]),
        ("c", "C", [("c1", "C1", 14.0), ("c2", "C2", 1.0)]),
    ];
    let mut game = TableGame::new();
    for (mv, to, replies) in lines {
        game = game.edge("r", mv, to).minimizing(to);
        for (reply, leaf, value) in replies {
            game = game.edge(to, reply, leaf).value(leaf, value);
        }
    }
    game
}

/// Two moves, `0` and `1`, in every position until `horizon` moves are played.
///
/// Positions are the move strings played so far. White (maximizing) moves on
/// even plies. Every position is distinct, so nothing transposes.
#[derive(Debug, Clone)]
pub struct BinaryGame {
    pub horizon: usize,
}

impl GameRules for BinaryGame {
    type Position = String;
    type Move = char;
    type Input = f32;

    fn is_maximizing(&self, pos: &String) -> bool {
        pos.len() % 2 == 0
    }

    fn legal_moves(&self, pos: &String) -> Vec<char> {
        if pos.len() >= self.horizon {
            Vec::new()
        } else {
            vec!['0', '1']
        }
    }

    fn is_check(&self, _pos: &String, _mv: &char) -> bool {
        false
    }

    fn is_capture(&self, _pos: &String, _mv: &char) -> bool {
        false
    }

    fn apply(&self, pos: &String, mv: &char) -> String {
        let mut next = pos.clone();
        next.push(*mv);
        next
    }

    fn canonical_key(&self, pos: &String) -> PositionKey {
        PositionKey::new(format!("bin:{pos}"))
    }

    /// Deterministic pseudo-score in [-1, 1).
    fn encode(&self, pos: &String) -> f32 {
        let hash = pos
            .bytes()
            .fold(17u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
        (hash % 200) as f32 / 100.0 - 1.0
    }
}

/// Returns every input unchanged and records batch sizes.
#[derive(Debug, Clone, Default)]
pub struct EchoEvaluator {
    pub batches: Arc<Mutex<Vec<usize>>>,
}

impl BatchEvaluator for EchoEvaluator {
    type Input = f32;

    fn score_batch(&mut self, inputs: &[f32]) -> Result<Vec<f32>, EvaluatorError> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(inputs.len());
        }
        Ok(inputs.to_vec())
    }
}

/// Always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingEvaluator {
    pub calls: Arc<AtomicUsize>,
}

impl BatchEvaluator for FailingEvaluator {
    type Input = f32;

    fn score_batch(&mut self, _inputs: &[f32]) -> Result<Vec<f32>, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EvaluatorError::Inference("model not loaded".to_string()))
    }
}

/// Echoes inputs after sleeping.
#[derive(Debug, Clone)]
pub struct SlowEvaluator {
    pub delay: Duration,
}

impl BatchEvaluator for SlowEvaluator {
    type Input = f32;

    fn score_batch(&mut self, inputs: &[f32]) -> Result<Vec<f32>, EvaluatorError> {
        thread::sleep(self.delay);
        Ok(inputs.to_vec())
    }
}

/// Panics on its first batch, taking the pipeline worker down with it.
#[derive(Debug, Clone, Default)]
pub struct PanickingEvaluator;

impl BatchEvaluator for PanickingEvaluator {
    type Input = f32;

    fn score_batch(&mut self, _inputs: &[f32]) -> Result<Vec<f32>, EvaluatorError> {
        panic!("evaluator crashed");
    }
}

/// [`BinaryGame`] whose move generation below the root stalls while `stalled` is set.
#[derive(Debug, Clone)]
pub struct StallingGame {
    pub inner: BinaryGame,
    pub stalled: Arc<AtomicBool>,
    pub delay: Duration,
}

impl GameRules for StallingGame {
    type Position = String;
    type Move = char;
    type Input = f32;

    fn is_maximizing(&self, pos: &String) -> bool {
        self.inner.is_maximizing(pos)
    }

    fn legal_moves(&self, pos: &String) -> Vec<char> {
        if !pos.is_empty() && self.stalled.load(Ordering::SeqCst) {
            thread::sleep(self.delay);
        }
        self.inner.legal_moves(pos)
    }

    fn is_check(&self, pos: &String, mv: &char) -> bool {
        self.inner.is_check(pos, mv)
    }

    fn is_capture(&self, pos: &String, mv: &char) -> bool {
        self.inner.is_capture(pos, mv)
    }

    fn apply(&self, pos: &String, mv: &char) -> String {
        self.inner.apply(pos, mv)
    }

    fn canonical_key(&self, pos: &String) -> PositionKey {
        self.inner.canonical_key(pos)
    }

    fn encode(&self, pos: &String) -> f32 {
        self.inner.encode(pos)
    }
}
