//! # Draft-Tree Synthesis
//!
//! The orchestrator. For every node in the combined source-tree/taxonomy
//! graph (breadth-first from a designated taxonomic root) it:
//!
//! 1. **Collects** candidate child relationships from every enabled
//!    source, grouping duplicate child-parent proposals and unioning
//!    their supporting-source lists
//! 2. **Selects** a conflict-free, maximum-weight subset (exact below the
//!    configured threshold, greedy above; ranking chain breaks ties)
//! 3. **Checks completeness** against the node's recorded descendant set,
//!    optionally escalating to an exact search over the original,
//!    unfiltered candidates when coverage fell short
//! 4. **Persists** each accepted candidate as a `SYNTH_CHILD_OF` edge
//!    tagged with the target tree id and provenance
//! 5. **Records visitation** for later dead-node cleanup and grafting
//!
//! One job per target tree id, single-threaded, stateful. The visited
//! set lives inside the job — its lifetime is exactly one run, never a
//! shared static. On failure the job deletes every edge it created
//! before surfacing the error, so an aborted run leaves no partial but
//! "live" tree behind.

pub mod graft;

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::{self, Candidate, EXACT_LIMIT};
use crate::model::{Direction, NodeId, PropertyMap, RelId, SynthNodeKind, Value};
use crate::ranking::RankingChain;
use crate::storage::{GraphStore, schema};
use crate::{Error, Result};

// ============================================================================
// Options & report
// ============================================================================

/// Per-run configuration. Passed by value into the job; no globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Exclude taxonomy-sourced candidates from the first selection pass.
    pub tree_only: bool,
    /// Candidate counts at or below this run the exact search; above it,
    /// greedy. Clamped to [`EXACT_LIMIT`].
    pub exact_threshold: usize,
    /// When the first pass leaves coverage incomplete, re-run the exact
    /// search over the unfiltered candidate set and keep the result only
    /// if it strictly improves coverage.
    pub escalate_incomplete: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            tree_only: false,
            exact_threshold: EXACT_LIMIT,
            escalate_incomplete: true,
        }
    }
}

/// Counters surfaced at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub nodes_visited: u64,
    pub edges_created: u64,
    pub grafted_tips: u64,
    pub dead_edges_pruned: u64,
}

// ============================================================================
// SynthesisJob
// ============================================================================

/// A single synthesis run targeting one synthetic-tree identifier.
///
/// Runs targeting the same tree id must be serialized by the caller;
/// runs targeting different ids may proceed in parallel because every
/// persisted edge is tagged and filtered by id.
pub struct SynthesisJob<'a, S: GraphStore> {
    store: &'a S,
    tree_id: String,
    options: SynthesisOptions,
    ranking: Option<RankingChain>,
    /// Nodes known to be in the tree; owned by this run.
    known_in_tree: HashSet<NodeId>,
    /// Edges this run created, for compensating deletes on abort.
    created_edges: Vec<RelId>,
    report: SynthesisReport,
}

impl<'a, S: GraphStore> SynthesisJob<'a, S> {
    pub fn new(store: &'a S, tree_id: impl Into<String>) -> Self {
        Self {
            store,
            tree_id: tree_id.into(),
            options: SynthesisOptions::default(),
            ranking: None,
            known_in_tree: HashSet::new(),
            created_edges: Vec::new(),
            report: SynthesisReport::default(),
        }
    }

    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingChain) -> Self {
        self.ranking = Some(ranking);
        self
    }

    pub fn tree_id(&self) -> &str {
        &self.tree_id
    }

    /// Run the full build: main pass, dead-node cleanup, grafting.
    ///
    /// On any failure every edge created so far is deleted before the
    /// error propagates, so the target tree id never names a half-built
    /// structure.
    pub async fn run(mut self, tx: &mut S::Tx, root: NodeId) -> Result<SynthesisReport> {
        info!(tree_id = %self.tree_id, %root, "synthesis starting");
        match self.run_inner(tx, root).await {
            Ok(()) => {
                info!(
                    tree_id = %self.tree_id,
                    nodes = self.report.nodes_visited,
                    edges = self.report.edges_created,
                    grafted = self.report.grafted_tips,
                    pruned = self.report.dead_edges_pruned,
                    "synthesis complete"
                );
                Ok(self.report)
            }
            Err(err) => {
                warn!(tree_id = %self.tree_id, %err, "synthesis aborted, rolling back");
                for rel_id in self.created_edges.drain(..) {
                    // Best-effort compensation; the first error already won.
                    let _ = self.store.delete_relationship(tx, rel_id).await;
                }
                Err(err)
            }
        }
    }

    async fn run_inner(&mut self, tx: &mut S::Tx, root: NodeId) -> Result<()> {
        self.store
            .get_node(tx, root)
            .await?
            .ok_or_else(|| Error::NotFound(format!("synthesis root {root}")))?;

        let mut queue = VecDeque::from([root]);
        while let Some(node_id) = queue.pop_front() {
            if !self.known_in_tree.insert(node_id) {
                continue;
            }
            self.report.nodes_visited += 1;

            let (filtered, unfiltered) = self.collect(tx, node_id).await?;
            if unfiltered.is_empty() {
                continue; // tip
            }

            let accepted = self.choose(tx, node_id, &filtered, &unfiltered).await?;
            for candidate in &accepted {
                self.persist(tx, candidate).await?;
                queue.push_back(candidate.child);
            }
        }

        self.cleanup_dead_nodes(tx).await?;

        graft::graft_missing(
            self.store,
            tx,
            &self.tree_id,
            root,
            &mut self.known_in_tree,
            &mut self.created_edges,
            &mut self.report,
        )
        .await?;

        Ok(())
    }

    // ========================================================================
    // Step 1: collect
    // ========================================================================

    /// Gather candidate child relationships into `parent` from every
    /// enabled source. Returns `(filtered, unfiltered)`: the first has
    /// taxonomy-only candidates removed in tree-only mode, the second is
    /// the original set the escalation pass may fall back to.
    async fn collect(
        &self,
        tx: &S::Tx,
        parent: NodeId,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>)> {
        let mut proposals = self
            .store
            .get_relationships(tx, parent, Direction::Incoming, Some(schema::REL_STREE_CHILD_OF))
            .await?;
        proposals.extend(
            self.store
                .get_relationships(tx, parent, Direction::Incoming, Some(schema::REL_TAX_CHILD_OF))
                .await?,
        );

        let mut by_child: HashMap<NodeId, Candidate> = HashMap::new();
        for rel in proposals {
            let source = if rel.rel_type == schema::REL_TAX_CHILD_OF {
                schema::SOURCE_TAXONOMY.to_string()
            } else {
                rel.get(schema::PROP_SOURCE)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::StructuralInvariant(format!(
                            "source-tree edge {} carries no source identifier",
                            rel.id
                        ))
                    })?
                    .to_string()
            };

            match by_child.get_mut(&rel.src) {
                Some(existing) => {
                    if !existing.sources.contains(&source) {
                        existing.sources.push(source);
                    }
                }
                None => {
                    let child = self
                        .store
                        .get_node(tx, rel.src)
                        .await?
                        .ok_or_else(|| Error::NotFound(format!("candidate child {}", rel.src)))?;
                    let kind = SynthNodeKind::decode(&child)?;
                    by_child.insert(
                        rel.src,
                        Candidate::new(rel.src, parent, source, kind.mrca().clone()),
                    );
                }
            }
        }

        let mut unfiltered: Vec<Candidate> = by_child.into_values().collect();
        // Hash order is not deterministic; candidate order must be.
        unfiltered.sort_by_key(|c| c.child);

        let filtered = if self.options.tree_only {
            unfiltered
                .iter()
                .filter(|c| c.sources.iter().any(|s| s != schema::SOURCE_TAXONOMY))
                .cloned()
                .collect()
        } else {
            unfiltered.clone()
        };

        Ok((filtered, unfiltered))
    }

    // ========================================================================
    // Steps 2–3: select + completeness check
    // ========================================================================

    async fn choose(
        &mut self,
        tx: &S::Tx,
        parent: NodeId,
        filtered: &[Candidate],
        unfiltered: &[Candidate],
    ) -> Result<Vec<Candidate>> {
        let chain = self.ranking.as_ref();
        let threshold = self.options.exact_threshold.min(EXACT_LIMIT);

        let selection = conflict::select(filtered, chain, threshold)?;
        let covered = selection.union_tips(filtered);

        let parent_node = self
            .store
            .get_node(tx, parent)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {parent}")))?;
        let full = SynthNodeKind::decode(&parent_node)?.mrca().clone();

        if covered.contains_all(&full) || !self.options.escalate_incomplete {
            debug!(
                %parent,
                accepted = selection.indices.len(),
                weight = selection.total_weight,
                "selection complete"
            );
            return Ok(selection.indices.iter().map(|&i| filtered[i].clone()).collect());
        }

        // Escalation: exact search over the original, unfiltered set, kept
        // only on strict coverage improvement.
        if unfiltered.len() <= EXACT_LIMIT {
            let retry = conflict::select_exact(unfiltered, chain)?;
            let retry_covered = retry.union_tips(unfiltered);
            if retry_covered.len() > covered.len() {
                debug!(
                    %parent,
                    before = covered.len(),
                    after = retry_covered.len(),
                    "escalated selection improved coverage"
                );
                return Ok(retry.indices.iter().map(|&i| unfiltered[i].clone()).collect());
            }
        }

        debug!(
            %parent,
            covered = covered.len(),
            expected = full.len(),
            "selection left coverage incomplete; grafting will recover tips"
        );
        Ok(selection.indices.iter().map(|&i| filtered[i].clone()).collect())
    }

    // ========================================================================
    // Step 4: persist
    // ========================================================================

    async fn persist(&mut self, tx: &mut S::Tx, candidate: &Candidate) -> Result<()> {
        // Arborescence check: one outgoing synthetic edge per child per tree.
        let existing = self
            .store
            .get_relationships(tx, candidate.child, Direction::Outgoing, Some(schema::REL_SYNTH_CHILD_OF))
            .await?;
        if existing
            .iter()
            .any(|r| r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(self.tree_id.as_str()))
        {
            return Err(Error::StructuralInvariant(format!(
                "child {} already has a synthetic parent in tree '{}'",
                candidate.child, self.tree_id
            )));
        }

        let mut props = PropertyMap::new();
        props.insert(schema::PROP_NAME.into(), Value::from(self.tree_id.as_str()));
        props.insert(
            schema::PROP_SUPPORTING_SOURCES.into(),
            Value::StringList(candidate.sources.to_vec()),
        );
        props.insert(
            schema::PROP_TIP_DESCENDANTS.into(),
            Value::Int(candidate.tips.len() as i64),
        );

        let rel_id = self
            .store
            .create_relationship(
                tx,
                candidate.child,
                candidate.parent,
                schema::REL_SYNTH_CHILD_OF,
                props,
            )
            .await?;
        self.created_edges.push(rel_id);
        self.report.edges_created += 1;

        // Propagate the exclusion set top-down: everything under the parent
        // that is not under this child, plus whatever the parent itself
        // excludes. Grafting leans on this to correct attachment points.
        let parent_node = self
            .store
            .get_node(tx, candidate.parent)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {}", candidate.parent)))?;
        let parent_kind = SynthNodeKind::decode(&parent_node)?;
        let mut out = parent_kind.mrca().difference(&candidate.tips);
        if let Some(parent_out) = parent_kind.outmrca() {
            out.union_with(parent_out);
        }
        self.store
            .set_node_property(tx, candidate.child, schema::PROP_OUTMRCA, Value::IdList(out.to_ids()))
            .await?;

        debug!(child = %candidate.child, parent = %candidate.parent, "accepted edge");
        Ok(())
    }

    // ========================================================================
    // Dead-node cleanup
    // ========================================================================

    /// Remove dangling internal subtrees: an internal node that kept its
    /// own parent edge but lost every accepted child contributes no tips,
    /// so its rootward edges are deleted until a node with surviving
    /// children is reached.
    async fn cleanup_dead_nodes(&mut self, tx: &mut S::Tx) -> Result<()> {
        let snapshot: Vec<NodeId> = self.known_in_tree.iter().copied().collect();
        for node_id in snapshot {
            let node = match self.store.get_node(tx, node_id).await? {
                Some(n) => n,
                None => continue,
            };
            if SynthNodeKind::decode(&node)?.is_tip() {
                continue;
            }
            if self.incoming_synth_count(tx, node_id).await? > 0 {
                continue;
            }

            // Childless internal node: cut rootward until stable.
            let mut current = node_id;
            loop {
                let outgoing = self.synth_parent_edge(tx, current).await?;
                let Some(edge) = outgoing else { break };
                self.store.delete_relationship(tx, edge.0).await?;
                self.created_edges.retain(|r| *r != edge.0);
                self.known_in_tree.remove(&current);
                self.report.dead_edges_pruned += 1;
                debug!(node = %current, "pruned dead edge");

                let parent = edge.1;
                if self.incoming_synth_count(tx, parent).await? > 0 {
                    break;
                }
                current = parent;
            }
            // A dead node with no rootward edge simply stays out of the tree.
            if self.synth_parent_edge(tx, node_id).await?.is_none()
                && self.incoming_synth_count(tx, node_id).await? == 0
            {
                self.known_in_tree.remove(&node_id);
            }
        }
        Ok(())
    }

    async fn incoming_synth_count(&self, tx: &S::Tx, node: NodeId) -> Result<usize> {
        let rels = self
            .store
            .get_relationships(tx, node, Direction::Incoming, Some(schema::REL_SYNTH_CHILD_OF))
            .await?;
        Ok(rels
            .iter()
            .filter(|r| {
                r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(self.tree_id.as_str())
            })
            .count())
    }

    async fn synth_parent_edge(&self, tx: &S::Tx, node: NodeId) -> Result<Option<(RelId, NodeId)>> {
        let rels = self
            .store
            .get_relationships(tx, node, Direction::Outgoing, Some(schema::REL_SYNTH_CHILD_OF))
            .await?;
        Ok(rels
            .iter()
            .find(|r| {
                r.get(schema::PROP_NAME).and_then(|v| v.as_str()) == Some(self.tree_id.as_str())
            })
            .map(|r| (r.id, r.dst)))
    }
}
