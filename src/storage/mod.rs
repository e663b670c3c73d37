//! # Graph Storage Port
//!
//! This is THE contract between the synthesis algorithms and any
//! property-graph engine. Every graph operation the core needs is defined
//! here, and nothing else — the algorithms depend only on this trait,
//! which is what makes the in-memory test double possible.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory double for tests/embedding |

pub mod memory;

use async_trait::async_trait;

use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::MemoryStore;

// ============================================================================
// Schema: relationship types and property names
// ============================================================================

/// Property and relationship-type names persisted in the graph.
///
/// Node properties: `mrca` (id array), `outmrca` (optional id array),
/// `name`, `tax_uid`. Synthetic-edge properties: `name` (synthetic-tree
/// identifier), `supporting_sources` (string array), `tip_descendants`
/// (int), `branch_length` (optional float).
pub mod schema {
    /// Taxonomy child-of edge: child taxon -> parent taxon.
    pub const REL_TAX_CHILD_OF: &str = "TAX_CHILD_OF";
    /// Source-tree child-of edge, carries [`PROP_SOURCE`].
    pub const REL_STREE_CHILD_OF: &str = "STREE_CHILD_OF";
    /// Persisted synthetic edge, carries [`PROP_NAME`] and provenance.
    pub const REL_SYNTH_CHILD_OF: &str = "SYNTH_CHILD_OF";

    /// Node: descendant-id set along the taxonomy / accepted structure.
    pub const PROP_MRCA: &str = "mrca";
    /// Node: approximate complement set on internal synthetic nodes.
    pub const PROP_OUTMRCA: &str = "outmrca";
    /// Node: display name. Relationship: owning synthetic-tree identifier.
    pub const PROP_NAME: &str = "name";
    /// Node: external taxonomy identifier.
    pub const PROP_TAX_UID: &str = "tax_uid";

    /// STREE edge: the source (input tree or "taxonomy") proposing it.
    pub const PROP_SOURCE: &str = "source";
    /// Source identifier for taxonomy-proposed candidates.
    pub const SOURCE_TAXONOMY: &str = "taxonomy";

    /// Synth edge: union of all sources supporting this child-parent pair.
    pub const PROP_SUPPORTING_SOURCES: &str = "supporting_sources";
    /// Synth edge: tips below the child in this synthetic tree.
    pub const PROP_TIP_DESCENDANTS: &str = "tip_descendants";
    /// Synth edge: optional branch length.
    pub const PROP_BRANCH_LENGTH: &str = "branch_length";

    /// Node label for taxa loaded from the reference taxonomy.
    pub const LABEL_TAXON: &str = "Taxon";
    /// Node label for synthesized intermediate nodes.
    pub const LABEL_SYNTH: &str = "Synth";
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The narrow storage port.
///
/// Kept deliberately small: node/relationship CRUD, property upserts,
/// direction+type-filtered relationship queries, one indexed lookup
/// (`tax_uid`), and scoped transactions. Traversal strategy lives in the
/// algorithms, not the store.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by id. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by id.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Set a property on a relationship (upsert).
    async fn set_relationship_property(
        &self,
        tx: &mut Self::Tx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// All relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Index
    // ========================================================================

    /// Look up the unique node carrying the given external taxonomy id.
    ///
    /// `Ok(None)` when absent; [`crate::Error::Ambiguous`] when the index
    /// unexpectedly holds more than one node for the id.
    async fn node_by_tax_uid(&self, tx: &Self::Tx, tax_uid: i64) -> Result<Option<Node>>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;
}
