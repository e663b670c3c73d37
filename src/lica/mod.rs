//! # LICA/MRCA Resolver
//!
//! Given a set of graph nodes interpreted as tips of a hypothetical
//! subtree, compute their least inclusive common ancestor along a chosen
//! topology (the taxonomy or a named synthetic tree).
//!
//! The general path walks rootward: take one node's full rootward path,
//! then for every other node find the first shared ancestor; the LICA is
//! the shared ancestor furthest from the root among those meets — the
//! most specific node consistent with every input. For acyclic draft
//! topologies carrying exclusion metadata (`outmrca`), containment tests
//! bound the walk without materializing full paths.

use hashbrown::{HashMap, HashSet};

use crate::model::{Direction, NodeId, Relationship, SynthNodeKind};
use crate::storage::{GraphStore, schema};
use crate::tipset::TipSet;
use crate::{Error, Result};

// ============================================================================
// Topology
// ============================================================================

/// Which rootward structure to walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// The reference taxonomy (`TAX_CHILD_OF` edges).
    Taxonomy,
    /// A named synthetic tree (`SYNTH_CHILD_OF` edges filtered by tree id).
    Synthetic(String),
}

impl Topology {
    pub fn rel_type(&self) -> &'static str {
        match self {
            Topology::Taxonomy => schema::REL_TAX_CHILD_OF,
            Topology::Synthetic(_) => schema::REL_SYNTH_CHILD_OF,
        }
    }

    /// Does this relationship belong to the topology being walked?
    pub fn owns(&self, rel: &Relationship) -> bool {
        match self {
            Topology::Taxonomy => rel.rel_type == schema::REL_TAX_CHILD_OF,
            Topology::Synthetic(tree_id) => {
                rel.rel_type == schema::REL_SYNTH_CHILD_OF
                    && rel.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(tree_id)
            }
        }
    }
}

// ============================================================================
// Rootward navigation
// ============================================================================

/// The unique parent of `node` in the topology, or None at the root.
///
/// Two parents for one child is an arborescence violation — a synthesis
/// bug or data corruption, fatal to the current operation.
pub async fn parent_of<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    topology: &Topology,
    node: NodeId,
) -> Result<Option<NodeId>> {
    let rels = store
        .get_relationships(tx, node, Direction::Outgoing, Some(topology.rel_type()))
        .await?;
    let mut parents = rels.iter().filter(|r| topology.owns(r)).map(|r| r.dst);

    match (parents.next(), parents.next()) {
        (None, _) => Ok(None),
        (Some(parent), None) => Ok(Some(parent)),
        (Some(_), Some(_)) => Err(Error::StructuralInvariant(format!(
            "node {node} has more than one parent in {topology:?}"
        ))),
    }
}

/// Full rootward path, starting at `node` itself and ending at the root.
/// A revisited node means the persisted structure is cyclic.
pub async fn rootward_path<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    topology: &Topology,
    node: NodeId,
) -> Result<Vec<NodeId>> {
    let mut path = vec![node];
    let mut seen: HashSet<NodeId> = HashSet::from_iter([node]);
    let mut current = node;

    while let Some(parent) = parent_of(store, tx, topology, current).await? {
        if !seen.insert(parent) {
            return Err(Error::StructuralInvariant(format!(
                "cycle through node {parent} on rootward walk"
            )));
        }
        path.push(parent);
        current = parent;
    }
    Ok(path)
}

// ============================================================================
// LICA
// ============================================================================

/// Least inclusive common ancestor of `nodes` in the given topology.
///
/// A single node is its own LICA. The result is invariant to input order.
/// Inputs with no common ancestor (a disconnected traversal) are a
/// structural invariant violation.
pub async fn resolve<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    topology: &Topology,
    nodes: &[NodeId],
) -> Result<NodeId> {
    let (first, rest) = match nodes {
        [] => {
            return Err(Error::Unsupported(
                "LICA of an empty node set is undefined".into(),
            ));
        }
        [only] => {
            store
                .get_node(tx, *only)
                .await?
                .ok_or_else(|| Error::NotFound(format!("node {only}")))?;
            return Ok(*only);
        }
        [first, rest @ ..] => (*first, rest),
    };

    let reference = rootward_path(store, tx, topology, first).await?;
    let positions: HashMap<NodeId, usize> = reference
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    // Deepest meet per input; the LICA must sit at the rootmost of those
    // meets to contain every input.
    let mut lica_pos = 0usize;
    for &other in rest {
        let mut current = other;
        let mut seen: HashSet<NodeId> = HashSet::from_iter([other]);
        let meet = loop {
            if let Some(&pos) = positions.get(&current) {
                break pos;
            }
            match parent_of(store, tx, topology, current).await? {
                Some(parent) => {
                    if !seen.insert(parent) {
                        return Err(Error::StructuralInvariant(format!(
                            "cycle through node {parent} on rootward walk"
                        )));
                    }
                    current = parent;
                }
                None => {
                    return Err(Error::StructuralInvariant(format!(
                        "nodes {first} and {other} share no ancestor in {topology:?}"
                    )));
                }
            }
        };
        lica_pos = lica_pos.max(meet);
    }

    Ok(reference[lica_pos])
}

/// Set-based fast path for acyclic draft topologies.
///
/// Walks rootward from `start` and returns the first ancestor whose
/// descendant set contains the whole `ingroup` and whose exclusion set
/// (when present) is disjoint from it. This bounds the search without
/// materializing full paths to the root.
pub async fn resolve_with_sets<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    topology: &Topology,
    start: NodeId,
    ingroup: &TipSet,
) -> Result<NodeId> {
    let mut current = start;
    let mut seen: HashSet<NodeId> = HashSet::from_iter([start]);

    loop {
        let node = store
            .get_node(tx, current)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {current}")))?;
        let kind = SynthNodeKind::decode(&node)?;

        let contains = kind.mrca().contains_all(ingroup);
        let excludes_none = kind.outmrca().is_none_or(|out| !out.contains_any(ingroup));
        if contains && excludes_none {
            return Ok(current);
        }

        match parent_of(store, tx, topology, current).await? {
            Some(parent) => {
                if !seen.insert(parent) {
                    return Err(Error::StructuralInvariant(format!(
                        "cycle through node {parent} on rootward walk"
                    )));
                }
                current = parent;
            }
            None => {
                return Err(Error::StructuralInvariant(format!(
                    "no ancestor of {start} contains the requested ingroup"
                )));
            }
        }
    }
}

/// LICA corrected for exclusion overlap: start from the path-based LICA,
/// then move rootward while the candidate's `outmrca` still claims part
/// of the ingroup. Used by grafting to find a safe attachment point.
pub async fn resolve_corrected<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    topology: &Topology,
    nodes: &[NodeId],
    ingroup: &TipSet,
) -> Result<NodeId> {
    let mut candidate = resolve(store, tx, topology, nodes).await?;
    let mut seen: HashSet<NodeId> = HashSet::from_iter([candidate]);

    loop {
        let node = store
            .get_node(tx, candidate)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {candidate}")))?;
        let kind = SynthNodeKind::decode(&node)?;

        match kind.outmrca() {
            Some(out) if out.contains_any(ingroup) => {
                match parent_of(store, tx, topology, candidate).await? {
                    Some(parent) => {
                        if !seen.insert(parent) {
                            return Err(Error::StructuralInvariant(format!(
                                "cycle through node {parent} on rootward walk"
                            )));
                        }
                        candidate = parent;
                    }
                    // Root reached: nothing excludes the ingroup anymore.
                    None => return Ok(candidate),
                }
            }
            _ => return Ok(candidate),
        }
    }
}
