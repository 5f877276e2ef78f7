use super::*;

/// Moves are digits; 'c' marks a check, 'x' a capture.
struct LabelledMoves;

impl GameRules for LabelledMoves {
    type Position = Vec<&'static str>;
    type Move = &'static str;
    type Input = ();

    fn is_maximizing(&self, _pos: &Self::Position) -> bool {
        true
    }

    fn legal_moves(&self, pos: &Self::Position) -> Vec<Self::Move> {
        pos.clone()
    }

    fn is_check(&self, _pos: &Self::Position, mv: &Self::Move) -> bool {
        mv.contains('c')
    }

    fn is_capture(&self, _pos: &Self::Position, mv: &Self::Move) -> bool {
        mv.contains('x')
    }

    fn apply(&self, pos: &Self::Position, _mv: &Self::Move) -> Self::Position {
        pos.clone()
    }

    fn canonical_key(&self, pos: &Self::Position) -> PositionKey {
        PositionKey::new(pos.join(","))
    }

    fn encode(&self, _pos: &Self::Position) -> Self::Input {}
}

#[test]
fn test_checks_then_captures_then_quiet() {
    let pos = vec!["1", "2x", "3c", "4", "5xc", "6x"];
    let moves: Vec<_> = ordered_moves(&LabelledMoves, &pos)
        .into_iter()
        .map(|(mv, _)| mv)
        .collect();
    assert_eq!(moves, vec!["3c", "5xc", "2x", "6x", "1", "4"]);
}

#[test]
fn test_checking_capture_is_a_check() {
    assert_eq!(classify(&LabelledMoves, &vec![], &"9xc"), MoveClass::Check);
    assert_eq!(classify(&LabelledMoves, &vec![], &"9x"), MoveClass::Capture);
    assert_eq!(classify(&LabelledMoves, &vec![], &"9"), MoveClass::Quiet);
}

#[test]
fn test_no_moves() {
    assert!(ordered_moves(&LabelledMoves, &vec![]).is_empty());
}

#[test]
fn test_position_key_uses_canonical_key() {
    let key = position_key(&LabelledMoves, &vec!["a", "b"]);
    assert_eq!(key.as_str(), "a,b");
    assert_eq!(key, PositionKey::from("a,b"));
}
