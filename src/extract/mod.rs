//! # Tree Extraction
//!
//! Read path over a persisted synthetic tree: traverse incoming
//! `SYNTH_CHILD_OF` edges filtered by tree identifier from a chosen root,
//! bounded by depth, annotating each node with its display label,
//! tip-descendant count, and per-edge provenance. Branches cut by the
//! depth limit carry a representative-descendant marker (leftmost and
//! rightmost named descendant) so callers can display "more below here"
//! without materializing the subtree.
//!
//! A defensive visited set turns a malformed (cyclic) structure into a
//! structural-invariant error instead of an infinite traversal. Correct
//! synthesis never produces one; the extractor does not assume that.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::lica::{self, Topology};
use crate::model::{Direction, Node, NodeId, Relationship, SynthNodeKind};
use crate::storage::{GraphStore, schema};
use crate::{Error, Result};

// ============================================================================
// Output model
// ============================================================================

/// How extracted nodes are labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelFormat {
    /// Name when present, bare id otherwise.
    Name,
    /// `name_id` when named, bare id otherwise.
    NameAndId,
    /// Always the bare numeric id.
    Id,
}

impl LabelFormat {
    fn label(&self, node: &Node) -> String {
        match (self, node.name()) {
            (LabelFormat::Id, _) | (_, None) => node.id.to_string(),
            (LabelFormat::Name, Some(name)) => name.to_string(),
            (LabelFormat::NameAndId, Some(name)) => format!("{name}_{}", node.id),
        }
    }
}

/// Marker on a depth-truncated branch: the leftmost and rightmost named
/// descendants below the cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationMarker {
    pub leftmost: String,
    pub rightmost: String,
}

/// One node of an extracted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftNode {
    pub id: NodeId,
    pub label: String,
    pub tip_descendants: u64,
    /// Sources supporting the edge that reached this node; empty at the
    /// extraction root.
    pub supporting_sources: Vec<String>,
    pub children: Vec<DraftNode>,
    pub truncated: Option<TruncationMarker>,
}

/// An extracted synthetic tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftTree {
    pub tree_id: String,
    pub root: DraftNode,
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract the subtree of synthetic tree `tree_id` rooted at `root`,
/// descending at most `max_depth` levels (negative = unbounded).
///
/// A `root` that participates in no edge of the requested tree is
/// rejected immediately — no partial result.
pub async fn extract<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    root: NodeId,
    max_depth: i64,
    label_format: LabelFormat,
) -> Result<DraftTree> {
    let root_node = store
        .get_node(tx, root)
        .await?
        .ok_or_else(|| Error::NotFound(format!("node {root}")))?;

    if !participates(store, tx, tree_id, root).await? {
        return Err(Error::Unsupported(format!(
            "node {root} is not part of synthetic tree '{tree_id}'"
        )));
    }

    // Arena assembly instead of recursion: BFS fills slots, then a
    // reverse pass moves finished children into their parents.
    let mut arena: Vec<Option<DraftNode>> = Vec::new();
    let mut child_slots: Vec<Vec<usize>> = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();

    let root_tips = SynthNodeKind::decode(&root_node)?.mrca().len();
    arena.push(Some(DraftNode {
        id: root,
        label: label_format.label(&root_node),
        tip_descendants: root_tips,
        supporting_sources: Vec::new(),
        children: Vec::new(),
        truncated: None,
    }));
    child_slots.push(Vec::new());
    visited.insert(root);

    let mut queue: Vec<(NodeId, usize, i64)> = vec![(root, 0, 0)];
    let mut head = 0;
    while head < queue.len() {
        let (node_id, slot, depth) = queue[head];
        head += 1;

        let mut child_edges = children_of(store, tx, tree_id, node_id).await?;
        child_edges.sort_by_key(|r| r.src);
        if child_edges.is_empty() {
            continue;
        }

        if max_depth >= 0 && depth >= max_depth {
            let marker = representative_names(store, tx, tree_id, &child_edges, label_format).await?;
            if let Some(n) = arena[slot].as_mut() {
                n.truncated = Some(marker);
            }
            continue;
        }

        for rel in child_edges {
            if !visited.insert(rel.src) {
                return Err(Error::StructuralInvariant(format!(
                    "node {} reached twice extracting tree '{tree_id}'",
                    rel.src
                )));
            }
            let child_node = store
                .get_node(tx, rel.src)
                .await?
                .ok_or_else(|| Error::NotFound(format!("node {}", rel.src)))?;

            let child_slot = arena.len();
            arena.push(Some(DraftNode {
                id: rel.src,
                label: label_format.label(&child_node),
                tip_descendants: edge_tip_count(&rel)
                    .unwrap_or_else(|| SynthNodeKind::decode(&child_node).map(|k| k.mrca().len()).unwrap_or(0)),
                supporting_sources: edge_sources(&rel),
                children: Vec::new(),
                truncated: None,
            }));
            child_slots.push(Vec::new());
            child_slots[slot].push(child_slot);
            queue.push((rel.src, child_slot, depth + 1));
        }
    }

    Ok(DraftTree { tree_id: tree_id.to_string(), root: assemble(arena, child_slots)? })
}

/// Extract only the structure induced by a set of tips: each tip's
/// rootward path up to their LICA. Fewer than two tips is rejected.
pub async fn induced_subtree<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    tips: &[NodeId],
    label_format: LabelFormat,
) -> Result<DraftTree> {
    if tips.len() < 2 {
        return Err(Error::Unsupported(format!(
            "induced subtree needs at least two tips, got {}",
            tips.len()
        )));
    }

    let topology = Topology::Synthetic(tree_id.to_string());
    let lica = lica::resolve(store, tx, &topology, tips).await?;

    // Children map restricted to the union of tip-to-LICA paths.
    let mut induced_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    induced_children.insert(lica, Vec::new());
    for &tip in tips {
        let path = lica::rootward_path(store, tx, &topology, tip).await?;
        for pair in path.windows(2) {
            let (child, parent) = (pair[0], pair[1]);
            let kids = induced_children.entry(parent).or_default();
            if !kids.contains(&child) {
                kids.push(child);
            }
            induced_children.entry(child).or_default();
            if parent == lica {
                break;
            }
        }
    }

    let mut arena: Vec<Option<DraftNode>> = Vec::new();
    let mut child_slots: Vec<Vec<usize>> = Vec::new();
    let mut queue: Vec<(NodeId, usize)> = Vec::new();

    let lica_node = store
        .get_node(tx, lica)
        .await?
        .ok_or_else(|| Error::NotFound(format!("node {lica}")))?;
    arena.push(Some(DraftNode {
        id: lica,
        label: label_format.label(&lica_node),
        tip_descendants: SynthNodeKind::decode(&lica_node)?.mrca().len(),
        supporting_sources: Vec::new(),
        children: Vec::new(),
        truncated: None,
    }));
    child_slots.push(Vec::new());
    queue.push((lica, 0));

    let mut head = 0;
    while head < queue.len() {
        let (node_id, slot) = queue[head];
        head += 1;

        let mut kids = induced_children.get(&node_id).cloned().unwrap_or_default();
        kids.sort_unstable();
        for kid in kids {
            let kid_node = store
                .get_node(tx, kid)
                .await?
                .ok_or_else(|| Error::NotFound(format!("node {kid}")))?;
            let edge = edge_to_parent(store, tx, tree_id, kid).await?;

            let kid_slot = arena.len();
            arena.push(Some(DraftNode {
                id: kid,
                label: label_format.label(&kid_node),
                tip_descendants: edge
                    .as_ref()
                    .and_then(edge_tip_count)
                    .unwrap_or_else(|| {
                        SynthNodeKind::decode(&kid_node).map(|k| k.mrca().len()).unwrap_or(0)
                    }),
                supporting_sources: edge.as_ref().map(edge_sources).unwrap_or_default(),
                children: Vec::new(),
                truncated: None,
            }));
            child_slots.push(Vec::new());
            child_slots[slot].push(kid_slot);
            queue.push((kid, kid_slot));
        }
    }

    Ok(DraftTree { tree_id: tree_id.to_string(), root: assemble(arena, child_slots)? })
}

// ============================================================================
// Helpers
// ============================================================================

fn assemble(mut arena: Vec<Option<DraftNode>>, child_slots: Vec<Vec<usize>>) -> Result<DraftNode> {
    // Children always occupy later slots than their parent, so a reverse
    // pass completes every subtree before it is moved into place.
    for i in (0..arena.len()).rev() {
        let mut kids = Vec::with_capacity(child_slots[i].len());
        for &c in &child_slots[i] {
            kids.push(arena[c].take().ok_or_else(|| {
                Error::StructuralInvariant(format!("extraction slot {c} claimed twice"))
            })?);
        }
        if let Some(parent) = arena[i].as_mut() {
            parent.children = kids;
        }
    }
    arena[0]
        .take()
        .ok_or_else(|| Error::StructuralInvariant("extraction produced no root".into()))
}

async fn children_of<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    node: NodeId,
) -> Result<Vec<Relationship>> {
    let rels = store
        .get_relationships(tx, node, Direction::Incoming, Some(schema::REL_SYNTH_CHILD_OF))
        .await?;
    Ok(rels
        .into_iter()
        .filter(|r| r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(tree_id))
        .collect())
}

async fn edge_to_parent<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    node: NodeId,
) -> Result<Option<Relationship>> {
    let rels = store
        .get_relationships(tx, node, Direction::Outgoing, Some(schema::REL_SYNTH_CHILD_OF))
        .await?;
    Ok(rels
        .into_iter()
        .find(|r| r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(tree_id)))
}

async fn participates<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    node: NodeId,
) -> Result<bool> {
    let rels = store
        .get_relationships(tx, node, Direction::Both, Some(schema::REL_SYNTH_CHILD_OF))
        .await?;
    Ok(rels
        .iter()
        .any(|r| r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(tree_id)))
}

fn edge_sources(rel: &Relationship) -> Vec<String> {
    rel.get(schema::PROP_SUPPORTING_SOURCES)
        .and_then(|v| v.as_strings())
        .map(|s| s.to_vec())
        .unwrap_or_default()
}

fn edge_tip_count(rel: &Relationship) -> Option<u64> {
    rel.get(schema::PROP_TIP_DESCENDANTS)
        .and_then(|v| v.as_int())
        .map(|n| n.max(0) as u64)
}

/// Leftmost and rightmost named descendants below a truncated branch.
/// Follows first-child / last-child chains; falls back to ids when a
/// whole chain is unnamed.
async fn representative_names<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    child_edges: &[Relationship],
    label_format: LabelFormat,
) -> Result<TruncationMarker> {
    let leftmost = descend_edge(store, tx, tree_id, child_edges[0].src, label_format, false).await?;
    let rightmost = descend_edge(
        store,
        tx,
        tree_id,
        child_edges[child_edges.len() - 1].src,
        label_format,
        true,
    )
    .await?;
    Ok(TruncationMarker { leftmost, rightmost })
}

async fn descend_edge<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    start: NodeId,
    label_format: LabelFormat,
    rightmost: bool,
) -> Result<String> {
    let mut current = start;
    let mut seen: HashSet<NodeId> = HashSet::from_iter([start]);

    loop {
        let node = store
            .get_node(tx, current)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {current}")))?;
        if node.name().is_some() {
            return Ok(label_format.label(&node));
        }

        let mut kids = children_of(store, tx, tree_id, current).await?;
        kids.sort_by_key(|r| r.src);
        let next = if rightmost { kids.last() } else { kids.first() };
        match next {
            Some(rel) => {
                if !seen.insert(rel.src) {
                    return Err(Error::StructuralInvariant(format!(
                        "node {} reached twice extracting tree '{tree_id}'",
                        rel.src
                    )));
                }
                current = rel.src;
            }
            // Unnamed leaf: the id is the best label available.
            None => return Ok(node.id.to_string()),
        }
    }
}
