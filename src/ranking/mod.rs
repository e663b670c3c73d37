//! # Relationship Ranking
//!
//! Orders candidate relationships by a configurable chain of tie-breaking
//! criteria. The chain feeds the selection engine: when two conflicting
//! candidates carry equal weight, the higher-ranked one keeps the node.
//!
//! A chain with no criteria refuses to rank anything — an un-ranked
//! ambiguous conflict must never silently resolve to an arbitrary order.

use std::cmp::Ordering;

use crate::conflict::Candidate;
use crate::{Error, Result};

/// A single three-way ranking criterion.
///
/// `compare` returns `Less` when `a` ranks ahead of (is better than) `b`,
/// so sorting ascending by a criterion puts the best candidate first.
pub trait RankCriterion: Send + Sync {
    fn name(&self) -> &'static str;
    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering;
}

// ============================================================================
// SourcePriority
// ============================================================================

/// Prefer candidates from sources earlier in an externally supplied
/// priority list. A candidate's rank is the best (smallest) position any
/// of its supporting sources holds; sources absent from the list rank
/// below every listed one.
pub struct SourcePriority {
    order: Vec<String>,
}

impl SourcePriority {
    pub fn new(order: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { order: order.into_iter().map(Into::into).collect() }
    }

    fn position(&self, candidate: &Candidate) -> usize {
        candidate
            .sources
            .iter()
            .filter_map(|s| self.order.iter().position(|o| o == s))
            .min()
            .unwrap_or(usize::MAX)
    }
}

impl RankCriterion for SourcePriority {
    fn name(&self) -> &'static str { "source-priority" }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        self.position(a).cmp(&self.position(b))
    }
}

// ============================================================================
// TipCount
// ============================================================================

/// Prefer candidates covering more descendant tips.
pub struct TipCount;

impl RankCriterion for TipCount {
    fn name(&self) -> &'static str { "tip-count" }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        b.tips.len().cmp(&a.tips.len())
    }
}

// ============================================================================
// RankingChain
// ============================================================================

/// An ordered chain of criteria, highest priority first.
///
/// `sort` applies one stable sort per criterion from lowest to highest
/// priority, so higher-priority criteria dominate while lower-priority
/// ones decide within their ties. Stability makes re-ranking an already
/// sorted list a no-op.
pub struct RankingChain {
    criteria: Vec<Box<dyn RankCriterion>>,
}

impl RankingChain {
    pub fn new() -> Self {
        Self { criteria: Vec::new() }
    }

    pub fn push(mut self, criterion: impl RankCriterion + 'static) -> Self {
        self.criteria.push(Box::new(criterion));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Sort candidates best-first.
    pub fn sort(&self, candidates: &mut [Candidate]) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(Error::UnrankedAmbiguity(
                "ranking requested with no configured criteria".into(),
            ));
        }
        for criterion in self.criteria.iter().rev() {
            candidates.sort_by(|a, b| criterion.compare(a, b));
        }
        Ok(())
    }

    /// Sort a slice of indices into `candidates` best-first, leaving the
    /// candidate slice untouched. Used where positions must stay stable.
    pub fn sort_indices(&self, candidates: &[Candidate], indices: &mut [usize]) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(Error::UnrankedAmbiguity(
                "ranking requested with no configured criteria".into(),
            ));
        }
        for criterion in self.criteria.iter().rev() {
            indices.sort_by(|&a, &b| criterion.compare(&candidates[a], &candidates[b]));
        }
        Ok(())
    }

    /// Lexicographic three-way comparison: the first criterion that is not
    /// a tie decides.
    pub fn compare(&self, a: &Candidate, b: &Candidate) -> Result<Ordering> {
        if self.criteria.is_empty() {
            return Err(Error::UnrankedAmbiguity(
                "ranking requested with no configured criteria".into(),
            ));
        }
        for criterion in &self.criteria {
            match criterion.compare(a, b) {
                Ordering::Equal => continue,
                decided => return Ok(decided),
            }
        }
        Ok(Ordering::Equal)
    }
}

impl Default for RankingChain {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
