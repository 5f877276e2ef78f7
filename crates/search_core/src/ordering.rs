//! Position keys and move ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rules::GameRules;

/// Canonical cache key of a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PositionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Priority class of a move. Variants are declared in search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MoveClass {
    Check,
    Capture,
    Quiet,
}

/// Classify a move. A checking capture counts as a check.
pub fn classify<R: GameRules>(rules: &R, pos: &R::Position, mv: &R::Move) -> MoveClass {
    if rules.is_check(pos, mv) {
        MoveClass::Check
    } else if rules.is_capture(pos, mv) {
        MoveClass::Capture
    } else {
        MoveClass::Quiet
    }
}

/// Legal moves ordered checks first, then captures, then quiet moves.
///
/// Within a class the rules engine's enumeration order is kept.
pub fn ordered_moves<R: GameRules>(rules: &R, pos: &R::Position) -> Vec<(R::Move, MoveClass)> {
    let mut moves: Vec<(R::Move, MoveClass)> = rules
        .legal_moves(pos)
        .into_iter()
        .map(|mv| {
            let class = classify(rules, pos, &mv);
            (mv, class)
        })
        .collect();
    // sort_by_key is stable
    moves.sort_by_key(|(_, class)| *class);
    moves
}

/// Cache key of a position.
#[inline]
pub fn position_key<R: GameRules>(rules: &R, pos: &R::Position) -> PositionKey {
    rules.canonical_key(pos)
}

#[cfg(test)]
#[path = "ordering_tests.rs"]
mod ordering_tests;
