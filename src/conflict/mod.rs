//! # Conflict & Candidate Selection Engine
//!
//! Given N candidate child relationships into a node, each carrying a
//! descendant `TipSet` and a weight, select the conflict-free subset
//! maximizing total weight. Two candidates conflict iff their tip sets
//! intersect, so this is maximum-weight independent set on the conflict
//! graph induced by set overlap.
//!
//! Two modes:
//!
//! - **Exact** (`select_exact`): backtracking over increasing indices,
//!   pruning any branch whose newest candidate overlaps the partial
//!   selection. Bounded at [`EXACT_LIMIT`] candidates.
//! - **Greedy** (`select_greedy`): repeatedly accept the heaviest
//!   remaining candidate and discard everything it overlaps. A standard
//!   set-packing heuristic — NOT guaranteed optimal; the gap is an
//!   accepted trade-off and is measured by the tests below, not assumed
//!   away.
//!
//! Both modes are pure and thread-safe on immutable inputs.

use smallvec::SmallVec;

use crate::model::NodeId;
use crate::ranking::RankingChain;
use crate::tipset::TipSet;
use crate::{Error, Result};

/// Largest candidate count the exact backtracking search accepts.
pub const EXACT_LIMIT: usize = 25;

// ============================================================================
// Candidate
// ============================================================================

/// A candidate child relationship into the node being resolved.
///
/// Constructed transiently per parent-node resolution step; discarded
/// after selection unless accepted and persisted as a synthetic edge.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub child: NodeId,
    pub parent: NodeId,
    /// Sources that independently proposed this child-parent pairing.
    pub sources: SmallVec<[String; 4]>,
    /// Selection weight; by default the descendant-set cardinality.
    pub weight: u64,
    /// Descendant-id set of the child, cached for conflict testing.
    pub tips: TipSet,
}

impl Candidate {
    pub fn new(child: NodeId, parent: NodeId, source: impl Into<String>, tips: TipSet) -> Self {
        let weight = tips.len();
        Self {
            child,
            parent,
            sources: SmallVec::from_elem(source.into(), 1),
            weight,
            tips,
        }
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    /// Merge another proposal of the same child-parent pair: union the
    /// supporting-source lists, keep one copy of the tip set.
    pub fn absorb(&mut self, other: Candidate) {
        debug_assert_eq!(self.child, other.child);
        debug_assert_eq!(self.parent, other.parent);
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
    }

    pub fn conflicts_with(&self, other: &Candidate) -> bool {
        self.tips.contains_any(&other.tips)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Result of a selection pass: indices into the input slice, plus the
/// total weight they carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub indices: Vec<usize>,
    pub total_weight: u64,
}

impl Selection {
    pub fn empty() -> Self {
        Self { indices: Vec::new(), total_weight: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Union of the accepted candidates' tip sets — the coverage this
    /// selection achieves, compared against the node's recorded `mrca`
    /// by the synthesis completeness check.
    pub fn union_tips(&self, candidates: &[Candidate]) -> TipSet {
        let mut tips = TipSet::growable();
        for &i in &self.indices {
            tips.union_with(&candidates[i].tips);
        }
        tips
    }
}

// ============================================================================
// Validation primitive
// ============================================================================

/// A subset is valid iff no two members' tip sets intersect. Post-condition
/// of both selection modes; also exercised directly by the test suite.
pub fn is_conflict_free(candidates: &[Candidate], subset: &[usize]) -> bool {
    for (pos, &i) in subset.iter().enumerate() {
        for &j in &subset[pos + 1..] {
            if candidates[i].conflicts_with(&candidates[j]) {
                return false;
            }
        }
    }
    true
}

// ============================================================================
// Exact mode
// ============================================================================

/// Exact maximum-weight conflict-free selection via backtracking.
///
/// Explores include/exclude decisions over increasing candidate indices
/// with an explicit frame stack, pruning include-branches that overlap the
/// partial selection. Ties in total weight go to the earliest subset
/// found; when a ranking chain is supplied, candidates are chain-ordered
/// first so the earliest subset is also the highest-ranked one.
///
/// Fails with [`Error::Unsupported`] above [`EXACT_LIMIT`] candidates —
/// callers fall back to [`select_greedy`].
pub fn select_exact(
    candidates: &[Candidate],
    chain: Option<&RankingChain>,
) -> Result<Selection> {
    if candidates.len() > EXACT_LIMIT {
        return Err(Error::Unsupported(format!(
            "exact selection bounded at {EXACT_LIMIT} candidates, got {}",
            candidates.len()
        )));
    }
    if candidates.is_empty() {
        return Ok(Selection::empty());
    }

    // Exploration order: original index order, or best-first per the chain.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    if let Some(chain) = chain {
        chain.sort_indices(candidates, &mut order)?;
    }

    struct Frame {
        pos: usize,
        chosen: Vec<usize>,
        weight: u64,
        tips: TipSet,
    }

    let mut best = Selection::empty();
    let mut stack = vec![Frame {
        pos: 0,
        chosen: Vec::new(),
        weight: 0,
        tips: TipSet::growable(),
    }];

    while let Some(frame) = stack.pop() {
        if frame.pos == order.len() {
            // Strict > keeps the earliest subset found on weight ties.
            if frame.weight > best.total_weight {
                best = Selection { indices: frame.chosen, total_weight: frame.weight };
            }
            continue;
        }

        let idx = order[frame.pos];
        let candidate = &candidates[idx];

        // Exclude branch pushed first so the include branch is explored
        // first (LIFO), making subsets that accept earlier candidates the
        // earliest found.
        stack.push(Frame {
            pos: frame.pos + 1,
            chosen: frame.chosen.clone(),
            weight: frame.weight,
            tips: frame.tips.clone(),
        });

        if !frame.tips.contains_any(&candidate.tips) {
            let mut chosen = frame.chosen;
            chosen.push(idx);
            stack.push(Frame {
                pos: frame.pos + 1,
                chosen,
                weight: frame.weight + candidate.weight,
                tips: frame.tips.union(&candidate.tips),
            });
        }
    }

    best.indices.sort_unstable();
    debug_assert!(is_conflict_free(candidates, &best.indices));
    Ok(best)
}

// ============================================================================
// Greedy mode
// ============================================================================

/// Greedy approximate selection: accept the heaviest remaining candidate,
/// discard every remaining candidate overlapping it, repeat.
///
/// Weight ties among remaining candidates are broken by the ranking
/// chain; a tie with no chain configured is [`Error::UnrankedAmbiguity`]
/// — the engine never guesses.
pub fn select_greedy(
    candidates: &[Candidate],
    chain: Option<&RankingChain>,
) -> Result<Selection> {
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selection = Selection::empty();

    while !remaining.is_empty() {
        let max_weight = remaining
            .iter()
            .map(|&i| candidates[i].weight)
            .max()
            .unwrap_or(0);
        let mut heaviest: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| candidates[i].weight == max_weight)
            .collect();

        let winner = if heaviest.len() == 1 {
            heaviest[0]
        } else {
            match chain {
                Some(chain) => {
                    chain.sort_indices(candidates, &mut heaviest)?;
                    heaviest[0]
                }
                None => {
                    return Err(Error::UnrankedAmbiguity(format!(
                        "{} candidates tied at weight {max_weight} with no ranking chain",
                        heaviest.len()
                    )));
                }
            }
        };

        selection.indices.push(winner);
        selection.total_weight += candidates[winner].weight;
        let accepted_tips = &candidates[winner].tips;
        remaining.retain(|&i| i != winner && !candidates[i].tips.contains_any(accepted_tips));
    }

    selection.indices.sort_unstable();
    debug_assert!(is_conflict_free(candidates, &selection.indices));
    Ok(selection)
}

/// Dispatch: exact below the threshold, greedy above it.
pub fn select(
    candidates: &[Candidate],
    chain: Option<&RankingChain>,
    exact_threshold: usize,
) -> Result<Selection> {
    if candidates.len() <= exact_threshold.min(EXACT_LIMIT) {
        select_exact(candidates, chain)
    } else {
        select_greedy(candidates, chain)
    }
}

// ============================================================================
// Tests
// ============================================================================
