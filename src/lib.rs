//! # treesynth — Draft-Tree Synthesis over a Property Graph
//!
//! Builds a single consistent synthetic ("draft") tree out of many
//! overlapping, possibly conflicting phylogenetic source trees plus a
//! reference taxonomy, persisting the result in a property-graph store.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the synthesis
//!    algorithms and any storage engine
//! 2. **Pure cores**: conflict selection, ranking, and descendant-set math
//!    are referentially transparent and storage-free
//! 3. **Tagged variants over property sniffing**: taxon vs. synthetic
//!    nodes are decoded once into explicit enum variants
//! 4. **Worklists over recursion**: every tree walk is an explicit stack
//!    or queue, safe on arbitrarily deep lineages
//!
//! ## Pipeline
//!
//! ```text
//! sources + taxonomy ──> SynthesisJob ──> collect candidates per node
//!                                     ──> conflict-free selection (exact/greedy)
//!                                     ──> persist SYNTH_CHILD_OF edges
//!                                     ──> dead-node cleanup + grafting
//! persisted tree     ──> extract()    ──> annotated DraftTree (read path)
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod tipset;
pub mod conflict;
pub mod ranking;
pub mod storage;
pub mod tx;
pub mod synthesis;
pub mod lica;
pub mod extract;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Value, PropertyMap,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Core algorithms
// ============================================================================

pub use tipset::TipSet;
pub use conflict::{Candidate, Selection, EXACT_LIMIT};
pub use ranking::{RankCriterion, RankingChain, SourcePriority, TipCount};

// ============================================================================
// Re-exports: Storage & transactions
// ============================================================================

pub use storage::{GraphStore, MemoryStore, schema};
pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Re-exports: Synthesis & read paths
// ============================================================================

pub use synthesis::{SynthesisJob, SynthesisOptions, SynthesisReport};
pub use lica::Topology;
pub use extract::{DraftTree, DraftNode, LabelFormat};

// ============================================================================
// Error Types
// ============================================================================

/// Failure taxonomy for the whole crate.
///
/// The first five variants map one-to-one onto the conditions a caller may
/// need to distinguish: lookups that miss, lookups that match too much,
/// corrupted or inconsistent persisted structure, ambiguity the caller
/// forgot to configure a tie-break for, and operations that are rejected
/// outright rather than half-answered.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested taxon/tree/node identifier is not in the store.
    /// Recoverable by the caller; never silently substituted.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup expected to match exactly one entity matched several.
    #[error("ambiguous match: {0}")]
    Ambiguous(String),

    /// The persisted structure violates a synthesis invariant (e.g. two
    /// outgoing synthetic edges for one child in the same tree). Fatal to
    /// the current operation; no partial repair is attempted.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),

    /// Conflict resolution reached a weight tie with no configured
    /// tie-break criteria. Guessing is not an option.
    #[error("unranked ambiguity: {0}")]
    UnrankedAmbiguity(String),

    /// The operation is rejected as stated (e.g. induced subtree of one
    /// tip, exact search above its size bound). No partial result.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
