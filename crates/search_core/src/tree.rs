//! Minimax search tree with arena allocation.
//!
//! Nodes live in a contiguous `Vec` and refer to their children by [`NodeId`].
//! Every node except the root is owned by exactly one parent. Re-rooting
//! compacts the arena so that only the kept subtree survives.
//!
//! A node's value is an [`Evaluation`]: either `Scored` (authoritative) or
//! `Pending` (awaiting the evaluator, or awaiting children that are). A pending
//! value may carry an advisory estimate but is never treated as final.

use std::fmt;

use crate::error::SearchError;
use crate::ordering::PositionKey;

/// Most nodes a tree can hold: ids are 32-bit.
pub const MAX_NODES: usize = u32::MAX as usize;

/// Index of a node in the tree arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Id of the node at arena slot `index`. Callers keep the arena within
    /// [`MAX_NODES`].
    #[inline]
    fn from_index(index: usize) -> Self {
        debug_assert!(
            u32::try_from(index).is_ok(),
            "node index {index} exceeds the arena limit"
        );
        NodeId(index as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Not authoritative yet. Holds the best-known estimate, if any.
    Pending(Option<f32>),
    Scored(f32),
}

impl Evaluation {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Evaluation::Pending(_))
    }

    /// The scored value, or the pending estimate.
    #[inline]
    pub fn value(&self) -> Option<f32> {
        match *self {
            Evaluation::Pending(estimate) => estimate,
            Evaluation::Scored(v) => Some(v),
        }
    }

    /// The value only if it is authoritative.
    #[inline]
    pub fn scored(&self) -> Option<f32> {
        match *self {
            Evaluation::Scored(v) => Some(v),
            Evaluation::Pending(_) => None,
        }
    }
}

/// A node of the game tree.
#[derive(Debug, Clone)]
pub struct SearchNode<P, M> {
    /// Move that led here from the parent (None for the root).
    mv: Option<M>,
    position: P,
    key: PositionKey,
    maximizing: bool,
    /// Evaluator score of this node's own position, once known.
    score: Option<f32>,
    evaluation: Evaluation,
    children: Vec<NodeId>,
}

impl<P, M> SearchNode<P, M> {
    pub fn mv(&self) -> Option<&M> {
        self.mv.as_ref()
    }

    pub fn position(&self) -> &P {
        &self.position
    }

    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    pub fn is_maximizing(&self) -> bool {
        self.maximizing
    }

    pub fn score(&self) -> Option<f32> {
        self.score
    }

    pub fn evaluation(&self) -> Evaluation {
        self.evaluation
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.evaluation.is_pending()
    }
}

/// Result of an alpha-beta probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    /// Best value found (None if nothing below the node is known yet).
    pub value: Option<f32>,
    /// True if the probe stopped at a pending node. The value is then only an estimate.
    pub pending: bool,
}

/// Move chosen at the root by [`SearchTree::choose_root_move`].
#[derive(Debug, Clone, PartialEq)]
pub struct RootChoice<M> {
    pub child: NodeId,
    pub mv: M,
    pub value: f32,
    /// False if the search stopped at a pending node.
    pub resolved: bool,
}

#[inline]
fn better(maximizing: bool, candidate: f32, best: f32) -> bool {
    if maximizing {
        candidate > best
    } else {
        candidate < best
    }
}

#[inline]
fn pick(maximizing: bool, best: Option<f32>, candidate: f32) -> f32 {
    match best {
        Some(b) if !better(maximizing, candidate, b) => b,
        _ => candidate,
    }
}

/// Minimax tree with arena-based node storage.
#[derive(Debug, Clone)]
pub struct SearchTree<P, M> {
    /// Arena storing all nodes
    nodes: Vec<SearchNode<P, M>>,
    /// Root node index (always 0 after construction or re-rooting)
    root: NodeId,
}

#[allow(clippy::len_without_is_empty)]
impl<P, M> SearchTree<P, M> {
    /// Create a tree holding only an unscored, pending root.
    pub fn new(position: P, key: PositionKey, maximizing: bool) -> Self {
        Self {
            nodes: vec![SearchNode {
                mv: None,
                position,
                key,
                maximizing,
                score: None,
                evaluation: Evaluation::Pending(None),
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SearchNode<P, M> {
        &self.nodes[id.index()]
    }

    /// Number of nodes in the tree, never zero.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Append a child to `parent` and return its id.
    ///
    /// With `score` set the child is a scored leaf; otherwise it is pending.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mv: M,
        position: P,
        key: PositionKey,
        score: Option<f32>,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        let maximizing = !self.nodes[parent.index()].maximizing;
        let evaluation = match score {
            Some(v) => Evaluation::Scored(v),
            None => Evaluation::Pending(None),
        };
        self.nodes.push(SearchNode {
            mv: Some(mv),
            position,
            key,
            maximizing,
            score,
            evaluation,
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Record the evaluator's score for a node.
    ///
    /// A leaf becomes scored. An already expanded node only keeps the score as
    /// its own static value; its evaluation stays the aggregate of its children.
    pub fn set_score(&mut self, id: NodeId, value: f32) {
        let node = &mut self.nodes[id.index()];
        node.score = Some(value);
        if node.children.is_empty() {
            node.evaluation = Evaluation::Scored(value);
        }
    }

    /// Number of leaves still waiting for a score.
    pub fn pending_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty() && n.evaluation.is_pending())
            .count()
    }

    /// Ids of all nodes exactly `depth` plies below the root.
    pub fn nodes_at_depth(&self, depth: usize) -> Vec<NodeId> {
        let mut level = vec![self.root];
        for _ in 0..depth {
            level = level
                .iter()
                .flat_map(|&id| self.nodes[id.index()].children.iter().copied())
                .collect();
        }
        level
    }

    /// Recompute every internal node's value bottom-up.
    ///
    /// An internal node whose children are all scored becomes
    /// `Scored(max/min of children)`. Otherwise it stays pending, with the
    /// aggregate of whatever its children know as the estimate.
    /// Leaves are left untouched.
    pub fn traverse(&mut self) {
        self.reaggregate(self.root);
    }

    fn reaggregate(&mut self, id: NodeId) -> Evaluation {
        let node = &self.nodes[id.index()];
        if node.children.is_empty() {
            return node.evaluation;
        }

        let maximizing = node.maximizing;
        let own_score = node.score;
        let children = node.children.clone();

        let mut best: Option<f32> = None;
        let mut all_scored = true;
        for child in children {
            let eval = self.reaggregate(child);
            all_scored &= !eval.is_pending();
            if let Some(v) = eval.value() {
                best = Some(pick(maximizing, best, v));
            }
        }

        let evaluation = match best {
            Some(v) if all_scored => Evaluation::Scored(v),
            _ => Evaluation::Pending(best.or(own_score)),
        };
        self.nodes[id.index()].evaluation = evaluation;
        evaluation
    }

    /// Value used when a depth-limited search stops at an expanded node:
    /// its resolved aggregate, else its own evaluator score, else pending.
    fn horizon_value(node: &SearchNode<P, M>) -> Probe {
        match (node.evaluation, node.score) {
            (Evaluation::Scored(v), _) => Probe {
                value: Some(v),
                pending: false,
            },
            (_, Some(score)) => Probe {
                value: Some(score),
                pending: false,
            },
            (Evaluation::Pending(estimate), None) => Probe {
                value: estimate,
                pending: true,
            },
        }
    }

    /// Depth-limited alpha-beta from `id`.
    ///
    /// Children are visited in their fixed order. The search stops at the
    /// first pending child and returns the best value accumulated from the
    /// resolved children before it, flagged as pending. It never prunes past
    /// an unresolved child and never trusts a pending estimate.
    /// Cutoffs (`value > beta` when maximizing, `value < alpha` when
    /// minimizing) only happen among resolved children.
    ///
    /// `nodes` counts visited nodes.
    pub fn search(
        &self,
        id: NodeId,
        depth: usize,
        mut alpha: f32,
        mut beta: f32,
        maximizing: bool,
        nodes: &mut u64,
    ) -> Probe {
        *nodes += 1;
        let node = &self.nodes[id.index()];

        if node.children.is_empty() {
            return Probe {
                value: node.evaluation.value(),
                pending: node.evaluation.is_pending(),
            };
        }
        if depth == 0 {
            return Self::horizon_value(node);
        }

        let mut best: Option<f32> = None;
        for &child in &node.children {
            let probe = self.search(child, depth - 1, alpha, beta, !maximizing, nodes);
            if probe.pending {
                return Probe {
                    value: best,
                    pending: true,
                };
            }
            if let Some(v) = probe.value {
                best = Some(pick(maximizing, best, v));
            }

            let Some(b) = best else { continue };
            if maximizing {
                if b > beta {
                    break;
                }
                alpha = alpha.max(b);
            } else {
                if b < alpha {
                    break;
                }
                beta = beta.min(b);
            }
        }

        Probe {
            value: best,
            pending: false,
        }
    }

    /// Alpha-beta from the root with a full window.
    pub fn search_root(&self, depth: usize, nodes: &mut u64) -> Probe {
        let root = self.node(self.root);
        self.search(
            self.root,
            depth,
            f32::NEG_INFINITY,
            f32::INFINITY,
            root.maximizing,
            nodes,
        )
    }

    /// Pick the root child attaining the root's alpha-beta value.
    ///
    /// Ties go to the first child in move-priority order. The result is marked
    /// unresolved when the search stopped at a pending child; children after
    /// that one are not considered. Returns None if the root has no children
    /// or no child value is known yet.
    pub fn choose_root_move(&self, depth: usize, nodes: &mut u64) -> Option<RootChoice<M>>
    where
        M: Clone,
    {
        let root = self.node(self.root);
        let maximizing = root.maximizing;
        let mut alpha = f32::NEG_INFINITY;
        let mut beta = f32::INFINITY;
        let mut best: Option<(NodeId, f32)> = None;
        let mut resolved = true;
        *nodes += 1;

        for &child in &root.children {
            let probe = self.search(
                child,
                depth.saturating_sub(1),
                alpha,
                beta,
                !maximizing,
                nodes,
            );
            if probe.pending {
                resolved = false;
                break;
            }
            if let Some(v) = probe.value {
                let improves = match best {
                    Some((_, b)) => better(maximizing, v, b),
                    None => true,
                };
                if improves {
                    best = Some((child, v));
                }
            }
            if let Some((_, b)) = best {
                if maximizing {
                    alpha = alpha.max(b);
                } else {
                    beta = beta.min(b);
                }
            }
        }

        let (child, value) = best?;
        let mv = self.node(child).mv.clone()?;
        Some(RootChoice {
            child,
            mv,
            value,
            resolved,
        })
    }

    /// Find the grandchild reached by `own` then `reply`.
    pub fn find_line(&self, own: &M, reply: &M) -> Result<NodeId, SearchError>
    where
        M: PartialEq,
    {
        let child = self.find_child(self.root, own)?;
        self.find_child(child, reply)
    }

    fn find_child(&self, parent: NodeId, mv: &M) -> Result<NodeId, SearchError>
    where
        M: PartialEq,
    {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).mv.as_ref() == Some(mv))
            .ok_or(SearchError::RootAdvancementMiss)
    }

    /// Make `new_root` the root and discard everything outside its subtree.
    ///
    /// Returns the old-id -> new-id mapping; discarded nodes map to None.
    pub fn reroot(&mut self, new_root: NodeId) -> Vec<Option<NodeId>> {
        let mut old: Vec<Option<SearchNode<P, M>>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();

        // Breadth-first order of the kept subtree becomes the new arena order
        let mut order = vec![new_root];
        let mut i = 0;
        while i < order.len() {
            if let Some(node) = &old[order[i].index()] {
                order.extend(node.children.iter().copied());
            }
            i += 1;
        }

        let mut remap = vec![None; old.len()];
        for (new_index, id) in order.iter().enumerate() {
            remap[id.index()] = Some(NodeId::from_index(new_index));
        }

        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            if let Some(mut node) = old[id.index()].take() {
                node.children = node
                    .children
                    .iter()
                    .filter_map(|c| remap[c.index()])
                    .collect();
                nodes.push(node);
            }
        }
        if let Some(root) = nodes.first_mut() {
            root.mv = None;
        }

        self.nodes = nodes;
        self.root = NodeId(0);
        remap
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tree_tests;
