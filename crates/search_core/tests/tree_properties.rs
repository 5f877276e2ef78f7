//! Randomized checks of the tree algorithms against exhaustive minimax.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use search_core::{Evaluation, NodeId, PositionKey, SearchTree};

type Tree = SearchTree<(), u32>;

struct Generated {
    tree: Tree,
    /// Hidden score of every pending leaf, by node id
    hidden: Vec<(NodeId, f32)>,
}

/// Random tree up to `max_depth` plies. Leaves are pending with probability `pending`.
fn random_tree(rng: &mut StdRng, max_depth: usize, pending: f64) -> Generated {
    let mut tree = Tree::new((), PositionKey::new("root"), rng.gen_bool(0.5));
    let mut hidden = Vec::new();
    let mut level = vec![tree.root()];
    let mut counter = 0u32;

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        for parent in level {
            let width = if depth == 1 { rng.gen_range(1..=4) } else { rng.gen_range(0..=3) };
            for mv in 0..width {
                counter += 1;
                let value = rng.gen_range(-100..=100) as f32 / 10.0;
                let key = PositionKey::new(format!("n{counter}"));
                let is_leaf_level = depth == max_depth;
                let score = if is_leaf_level && rng.gen_bool(pending) {
                    None
                } else {
                    Some(value)
                };
                let id = tree.add_child(parent, mv, (), key, score);
                if score.is_none() {
                    hidden.push((id, value));
                }
                next.push(id);
            }
        }
        level = next;
    }
    Generated { tree, hidden }
}

fn minimax(tree: &Tree, id: NodeId) -> f32 {
    let node = tree.node(id);
    if node.is_leaf() {
        return node.evaluation().scored().expect("leaf must be scored");
    }
    let values = node.children().iter().map(|&c| minimax(tree, c));
    if node.is_maximizing() {
        values.fold(f32::NEG_INFINITY, f32::max)
    } else {
        values.fold(f32::INFINITY, f32::min)
    }
}

fn reveal(generated: &mut Generated) {
    for &(id, value) in &generated.hidden {
        generated.tree.set_score(id, value);
    }
}

#[test]
fn test_traverse_is_minimax_consistent() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let mut generated = random_tree(&mut rng, 4, 0.0);
        let tree = &mut generated.tree;
        tree.traverse();
        assert_eq!(tree.pending_leaves(), 0);
        for depth in 0..4 {
            for id in tree.nodes_at_depth(depth) {
                if tree.node(id).is_leaf() {
                    continue;
                }
                assert_eq!(
                    tree.node(id).evaluation(),
                    Evaluation::Scored(minimax(tree, id))
                );
            }
        }
    }
}

#[test]
fn test_alpha_beta_equals_traverse() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let mut generated = random_tree(&mut rng, 5, 0.0);
        let tree = &mut generated.tree;
        let mut nodes = 0;
        let probe = tree.search_root(usize::MAX, &mut nodes);
        assert!(!probe.pending);

        tree.traverse();
        assert_eq!(probe.value, tree.node(tree.root()).evaluation().scored());
        assert!(nodes <= tree.len() as u64);
    }
}

#[test]
fn test_resolved_search_is_exact_despite_pending_leaves() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..500 {
        let mut generated = random_tree(&mut rng, 4, 0.3);
        let mut nodes = 0;
        let choice = generated.tree.choose_root_move(4, &mut nodes);

        reveal(&mut generated);
        let tree = &generated.tree;
        let exact = minimax(tree, tree.root());
        let mut nodes = 0;
        let full = tree.choose_root_move(4, &mut nodes).unwrap();
        assert_eq!(full.value, exact);
        assert!(full.resolved);

        // A resolved answer never depended on a hidden score
        if let Some(choice) = choice.filter(|c| c.resolved) {
            assert_eq!(choice.value, exact);
            assert_eq!(choice.child, full.child);
        }
    }
}

#[test]
fn test_reroot_keeps_subtree_values() {
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..100 {
        let mut generated = random_tree(&mut rng, 4, 0.0);
        let tree = &mut generated.tree;
        tree.traverse();

        let grandchildren = tree.nodes_at_depth(2);
        if grandchildren.is_empty() {
            continue;
        }
        let target = grandchildren[rng.gen_range(0..grandchildren.len())];
        let before = minimax(tree, target);
        let maximizing = tree.node(target).is_maximizing();
        let remap = tree.reroot(target);

        assert_eq!(remap[target.index()], Some(tree.root()));
        assert_eq!(minimax(tree, tree.root()), before);
        assert_eq!(tree.node(tree.root()).is_maximizing(), maximizing);
        assert!(tree.nodes_at_depth(3).is_empty());
    }
}
