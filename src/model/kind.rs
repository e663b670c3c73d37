//! Tagged node-kind decode.
//!
//! Nodes participating in synthesis come in two explicit flavors rather
//! than being sniffed for properties at every call site: taxa loaded from
//! the reference taxonomy, and synthesized internal nodes.

use crate::storage::schema;
use crate::tipset::TipSet;
use crate::{Error, Result};
use super::Node;

/// Decoded view of a node's synthesis-relevant state.
///
/// Any node placed inside a draft tree may carry an exclusion set
/// (`outmrca`): an approximate complement written top-down as edges are
/// accepted, used to short-circuit containment tests without storing the
/// full complement. Absence means no exclusion information is available
/// and containment tests fall back to full path walks.
#[derive(Debug, Clone)]
pub enum SynthNodeKind {
    /// A taxon from the reference taxonomy.
    Taxon {
        mrca: TipSet,
        tax_uid: Option<i64>,
        outmrca: Option<TipSet>,
    },
    /// A synthesized internal node.
    Synthetic {
        mrca: TipSet,
        outmrca: Option<TipSet>,
    },
}

impl SynthNodeKind {
    /// Decode a stored node. A node reachable by synthesis without an
    /// `mrca` set is corrupt, not merely absent.
    pub fn decode(node: &Node) -> Result<Self> {
        let mrca = node
            .get(schema::PROP_MRCA)
            .and_then(|v| v.as_ids())
            .map(|ids| TipSet::from_ids(ids.iter().copied()))
            .ok_or_else(|| {
                Error::StructuralInvariant(format!("node {} has no mrca set", node.id))
            })?;

        let outmrca = node
            .get(schema::PROP_OUTMRCA)
            .and_then(|v| v.as_ids())
            .map(|ids| TipSet::from_ids(ids.iter().copied()));

        if node.has_label(schema::LABEL_SYNTH) {
            Ok(SynthNodeKind::Synthetic { mrca, outmrca })
        } else {
            Ok(SynthNodeKind::Taxon { mrca, tax_uid: node.tax_uid(), outmrca })
        }
    }

    pub fn mrca(&self) -> &TipSet {
        match self {
            SynthNodeKind::Taxon { mrca, .. } => mrca,
            SynthNodeKind::Synthetic { mrca, .. } => mrca,
        }
    }

    pub fn outmrca(&self) -> Option<&TipSet> {
        match self {
            SynthNodeKind::Taxon { outmrca, .. } => outmrca.as_ref(),
            SynthNodeKind::Synthetic { outmrca, .. } => outmrca.as_ref(),
        }
    }

    /// A leaf carries only itself in its descendant set.
    pub fn is_tip(&self) -> bool {
        self.mrca().len() <= 1
    }
}
