//! Grafting of unsampled taxa.
//!
//! After the main pass, taxa that no accepted source edge carried into
//! the draft tree are attached back using taxonomic containment. The walk
//! runs over the taxonomy from tips toward the root (deepest internal
//! taxa first, explicit worklist): for every internal taxon with at least
//! one descendant tip in the tree and at least one not, the missing tips
//! are attached beneath the corrected LICA of the known ones. A whole
//! unsampled sibling subtree is bulk-attached in one piece — valid only
//! because nothing in the tree can conflict with its placement. When a
//! taxon's sole known descendant is a single node, an intermediate
//! synthetic node is inserted above it first so the graft has a parent
//! to live under.

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::lica::{self, Topology};
use crate::model::{Direction, NodeId, PropertyMap, RelId, SynthNodeKind, Value};
use crate::storage::{GraphStore, schema};
use crate::tipset::TipSet;
use crate::{Error, Result};

use super::SynthesisReport;

/// Attach every taxonomy tip missing from the draft tree.
pub(crate) async fn graft_missing<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    tree_id: &str,
    tax_root: NodeId,
    known: &mut HashSet<NodeId>,
    created: &mut Vec<RelId>,
    report: &mut SynthesisReport,
) -> Result<()> {
    let taxonomy = TaxonomySnapshot::load(store, tx, tax_root).await?;
    let topology = Topology::Synthetic(tree_id.to_string());

    // Deepest internal taxa first, so a parent taxon sees the grafts its
    // children already performed.
    for &taxon in taxonomy.order.iter().rev() {
        let children = &taxonomy.children[&taxon];
        if children.is_empty() {
            continue;
        }

        let tips = &taxonomy.tips_below[&taxon];
        let known_tips: Vec<NodeId> = tips.iter().copied().filter(|t| known.contains(t)).collect();
        let missing_count = tips.len() - known_tips.len();
        if known_tips.is_empty() || missing_count == 0 {
            continue;
        }

        let ingroup = TipSet::from_ids(tips.iter().map(|t| t.0));
        let attach_point = if known_tips.len() == 1 {
            insert_intermediate(store, tx, tree_id, known_tips[0], &ingroup, known, created, report)
                .await?
        } else {
            lica::resolve_corrected(store, tx, &topology, &known_tips, &ingroup).await?
        };

        // Find the maximal fully-unknown subtrees under this taxon and
        // bulk-attach each beneath the attachment point.
        let mut stack: Vec<NodeId> = children.clone();
        while let Some(sub) = stack.pop() {
            let sub_tips = &taxonomy.tips_below[&sub];
            let fully_unknown =
                !known.contains(&sub) && sub_tips.iter().all(|t| !known.contains(t));
            if fully_unknown {
                bulk_attach(store, tx, tree_id, &taxonomy, sub, attach_point, known, created, report)
                    .await?;
            } else {
                stack.extend(taxonomy.children[&sub].iter().copied());
            }
        }
    }

    Ok(())
}

// ============================================================================
// Taxonomy snapshot
// ============================================================================

/// Immutable view of the taxonomy below a root: BFS order, child lists,
/// and the tip set below each taxon. One load per grafting pass keeps the
/// tips-to-root walk off the store's hot path.
struct TaxonomySnapshot {
    order: Vec<NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    tips_below: HashMap<NodeId, Vec<NodeId>>,
}

impl TaxonomySnapshot {
    async fn load<S: GraphStore>(store: &S, tx: &S::Tx, root: NodeId) -> Result<Self> {
        let mut order = vec![root];
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut seen: HashSet<NodeId> = HashSet::from_iter([root]);

        let mut i = 0;
        while i < order.len() {
            let node = order[i];
            i += 1;

            let rels = store
                .get_relationships(tx, node, Direction::Incoming, Some(schema::REL_TAX_CHILD_OF))
                .await?;
            let mut kids: Vec<NodeId> = rels.iter().map(|r| r.src).collect();
            kids.sort_unstable();

            for &kid in &kids {
                if !seen.insert(kid) {
                    return Err(Error::StructuralInvariant(format!(
                        "taxonomy is not a tree: node {kid} reached twice"
                    )));
                }
                order.push(kid);
            }
            children.insert(node, kids);
        }

        // Tips below each taxon, children before parents.
        let mut tips_below: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &node in order.iter().rev() {
            let kids = &children[&node];
            let tips = if kids.is_empty() {
                vec![node]
            } else {
                kids.iter().flat_map(|k| tips_below[k].iter().copied()).collect()
            };
            tips_below.insert(node, tips);
        }

        Ok(Self { order, children, tips_below })
    }
}

// ============================================================================
// Intermediate-node insertion
// ============================================================================

/// Synthesize an internal node directly above `below` and splice it into
/// the draft tree, so missing siblings have somewhere to attach without
/// hanging off a leaf.
#[allow(clippy::too_many_arguments)]
async fn insert_intermediate<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    tree_id: &str,
    below: NodeId,
    ingroup: &TipSet,
    known: &mut HashSet<NodeId>,
    created: &mut Vec<RelId>,
    report: &mut SynthesisReport,
) -> Result<NodeId> {
    let below_node = store
        .get_node(tx, below)
        .await?
        .ok_or_else(|| Error::NotFound(format!("node {below}")))?;
    let below_kind = SynthNodeKind::decode(&below_node)?;
    let mrca = below_kind.mrca().union(ingroup);

    let old_parent = synth_parent(store, tx, tree_id, below).await?;

    // Exclusion set: whatever the old parent held minus what now lives
    // under the new node.
    let mut props = PropertyMap::new();
    props.insert(schema::PROP_MRCA.into(), Value::IdList(mrca.to_ids()));
    if let Some((_, parent_id)) = old_parent {
        let parent_node = store
            .get_node(tx, parent_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {parent_id}")))?;
        let parent_kind = SynthNodeKind::decode(&parent_node)?;
        let mut out = parent_kind.mrca().difference(&mrca);
        if let Some(parent_out) = parent_kind.outmrca() {
            out.union_with(parent_out);
        }
        props.insert(schema::PROP_OUTMRCA.into(), Value::IdList(out.to_ids()));
    }

    let intermediate = store.create_node(tx, &[schema::LABEL_SYNTH], props).await?;
    debug!(%below, %intermediate, "inserted intermediate node");

    let edge = create_synth_edge(
        store,
        tx,
        tree_id,
        below,
        intermediate,
        below_kind.mrca().len(),
    )
    .await?;
    created.push(edge);
    report.edges_created += 1;

    if let Some((old_edge, parent_id)) = old_parent {
        let up = create_synth_edge(store, tx, tree_id, intermediate, parent_id, mrca.len()).await?;
        created.push(up);
        report.edges_created += 1;
        store.delete_relationship(tx, old_edge).await?;
        created.retain(|r| *r != old_edge);
    }

    known.insert(intermediate);
    Ok(intermediate)
}

// ============================================================================
// Bulk attachment
// ============================================================================

/// Attach an entirely-unsampled taxonomic subtree beneath `under` by
/// copying its taxonomy structure as synthetic edges. Cheap path: with no
/// descendant in the tree there is no possibility of conflicting
/// placement, so no selection pass is needed.
#[allow(clippy::too_many_arguments)]
async fn bulk_attach<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    tree_id: &str,
    taxonomy: &TaxonomySnapshot,
    sub_root: NodeId,
    under: NodeId,
    known: &mut HashSet<NodeId>,
    created: &mut Vec<RelId>,
    report: &mut SynthesisReport,
) -> Result<()> {
    debug!(%sub_root, %under, "bulk attaching unsampled subtree");

    let mut worklist = vec![(sub_root, under)];
    while let Some((node, parent)) = worklist.pop() {
        if synth_parent(store, tx, tree_id, node).await?.is_some() {
            return Err(Error::StructuralInvariant(format!(
                "graft target {node} already has a synthetic parent in tree '{tree_id}'"
            )));
        }

        let tip_count = taxonomy.tips_below[&node].len() as u64;
        let edge = create_synth_edge(store, tx, tree_id, node, parent, tip_count).await?;
        created.push(edge);
        report.edges_created += 1;
        known.insert(node);

        let kids = &taxonomy.children[&node];
        if kids.is_empty() {
            report.grafted_tips += 1;
        } else {
            worklist.extend(kids.iter().map(|&k| (k, node)));
        }
    }
    Ok(())
}

// ============================================================================
// Shared helpers
// ============================================================================

async fn synth_parent<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    tree_id: &str,
    node: NodeId,
) -> Result<Option<(RelId, NodeId)>> {
    let rels = store
        .get_relationships(tx, node, Direction::Outgoing, Some(schema::REL_SYNTH_CHILD_OF))
        .await?;
    Ok(rels
        .iter()
        .find(|r| r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(tree_id))
        .map(|r| (r.id, r.dst)))
}

async fn create_synth_edge<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    tree_id: &str,
    child: NodeId,
    parent: NodeId,
    tip_count: u64,
) -> Result<RelId> {
    let mut props = PropertyMap::new();
    props.insert(schema::PROP_NAME.into(), Value::from(tree_id));
    props.insert(
        schema::PROP_SUPPORTING_SOURCES.into(),
        Value::StringList(vec![schema::SOURCE_TAXONOMY.to_string()]),
    );
    props.insert(schema::PROP_TIP_DESCENDANTS.into(), Value::Int(tip_count as i64));
    store
        .create_relationship(tx, child, parent, schema::REL_SYNTH_CHILD_OF, props)
        .await
}
