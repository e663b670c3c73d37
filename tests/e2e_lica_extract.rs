//! End-to-end tests for the LICA resolver and the tree-extraction read
//! path, run over a draft tree synthesized on the in-memory store.

use pretty_assertions::assert_eq;
use treesynth::{
    Error, GraphStore, LabelFormat, MemoryStore, NodeId, PropertyMap, SynthesisJob, Topology,
    TxMode, Value, lica, schema,
};
use treesynth::extract::{extract, induced_subtree};

type Tx = <MemoryStore as GraphStore>::Tx;

const TREE: &str = "draft";

// ============================================================================
// Helper: seed the two-clade taxonomy and synthesize a draft tree.
// ============================================================================
//
//                 Life
//                /    \
//        Mammalia      Aves
//        /   |   \     /  \
//    Canis Felis Ursus Corvus Turdus

struct Fixture {
    store: MemoryStore,
    life: NodeId,
    mammals: NodeId,
    birds: NodeId,
    canis: NodeId,
    felis: NodeId,
    ursus: NodeId,
    corvus: NodeId,
    turdus: NodeId,
}

async fn taxon(store: &MemoryStore, tx: &mut Tx, name: &str, uid: i64) -> NodeId {
    let mut props = PropertyMap::new();
    props.insert(schema::PROP_NAME.into(), Value::from(name));
    props.insert(schema::PROP_TAX_UID.into(), Value::Int(uid));
    store.create_node(tx, &[schema::LABEL_TAXON], props).await.unwrap()
}

async fn set_mrca(store: &MemoryStore, tx: &mut Tx, node: NodeId, tips: &[NodeId]) {
    let ids: Vec<u64> = tips.iter().map(|n| n.0).collect();
    store
        .set_node_property(tx, node, schema::PROP_MRCA, Value::IdList(ids))
        .await
        .unwrap();
}

async fn tax_edge(store: &MemoryStore, tx: &mut Tx, child: NodeId, parent: NodeId) {
    store
        .create_relationship(tx, child, parent, schema::REL_TAX_CHILD_OF, PropertyMap::new())
        .await
        .unwrap();
}

async fn seed_and_synthesize() -> (Fixture, Tx) {
    let store = MemoryStore::new();
    let mut tx = store.begin_tx(TxMode::ReadWrite).await.unwrap();

    let life = taxon(&store, &mut tx, "Life", 1).await;
    let mammals = taxon(&store, &mut tx, "Mammalia", 2).await;
    let birds = taxon(&store, &mut tx, "Aves", 3).await;
    let canis = taxon(&store, &mut tx, "Canis", 4).await;
    let felis = taxon(&store, &mut tx, "Felis", 5).await;
    let ursus = taxon(&store, &mut tx, "Ursus", 6).await;
    let corvus = taxon(&store, &mut tx, "Corvus", 7).await;
    let turdus = taxon(&store, &mut tx, "Turdus", 8).await;

    for leaf in [canis, felis, ursus, corvus, turdus] {
        set_mrca(&store, &mut tx, leaf, &[leaf]).await;
    }
    set_mrca(&store, &mut tx, mammals, &[canis, felis, ursus]).await;
    set_mrca(&store, &mut tx, birds, &[corvus, turdus]).await;
    set_mrca(&store, &mut tx, life, &[canis, felis, ursus, corvus, turdus]).await;

    tax_edge(&store, &mut tx, mammals, life).await;
    tax_edge(&store, &mut tx, birds, life).await;
    tax_edge(&store, &mut tx, canis, mammals).await;
    tax_edge(&store, &mut tx, felis, mammals).await;
    tax_edge(&store, &mut tx, ursus, mammals).await;
    tax_edge(&store, &mut tx, corvus, birds).await;
    tax_edge(&store, &mut tx, turdus, birds).await;

    let fx = Fixture { store, life, mammals, birds, canis, felis, ursus, corvus, turdus };
    let report = SynthesisJob::new(&fx.store, TREE)
        .run(&mut tx, fx.life)
        .await
        .unwrap();
    assert_eq!(report.edges_created, 7);

    (fx, tx)
}

// ============================================================================
// 1. LICA basics: identity, pairs, order invariance.
// ============================================================================

#[tokio::test]
async fn test_lica_single_node_is_itself() {
    let (fx, tx) = seed_and_synthesize().await;
    let got = lica::resolve(&fx.store, &tx, &Topology::Taxonomy, &[fx.canis])
        .await
        .unwrap();
    assert_eq!(got, fx.canis);
}

#[tokio::test]
async fn test_lica_pair_and_order_invariance() {
    let (fx, tx) = seed_and_synthesize().await;
    let topo = Topology::Taxonomy;

    let ab = lica::resolve(&fx.store, &tx, &topo, &[fx.canis, fx.felis]).await.unwrap();
    let ba = lica::resolve(&fx.store, &tx, &topo, &[fx.felis, fx.canis]).await.unwrap();
    assert_eq!(ab, fx.mammals);
    assert_eq!(ab, ba);

    let cross = lica::resolve(&fx.store, &tx, &topo, &[fx.canis, fx.corvus]).await.unwrap();
    assert_eq!(cross, fx.life);

    // An ancestor among the inputs pins the result at that ancestor.
    let nested = lica::resolve(&fx.store, &tx, &topo, &[fx.felis, fx.mammals]).await.unwrap();
    assert_eq!(nested, fx.mammals);
    let nested = lica::resolve(&fx.store, &tx, &topo, &[fx.turdus, fx.birds]).await.unwrap();
    assert_eq!(nested, fx.birds);
}

#[tokio::test]
async fn test_lica_folds_like_pairwise_resolution() {
    let (fx, tx) = seed_and_synthesize().await;
    let topo = Topology::Taxonomy;

    let all_at_once = lica::resolve(&fx.store, &tx, &topo, &[fx.canis, fx.felis, fx.corvus])
        .await
        .unwrap();
    let left = lica::resolve(&fx.store, &tx, &topo, &[fx.canis, fx.felis]).await.unwrap();
    let folded = lica::resolve(&fx.store, &tx, &topo, &[left, fx.corvus]).await.unwrap();
    assert_eq!(all_at_once, fx.life);
    assert_eq!(all_at_once, folded);
}

// ============================================================================
// 2. LICA failure modes.
// ============================================================================

#[tokio::test]
async fn test_lica_of_empty_set_is_unsupported() {
    let (fx, tx) = seed_and_synthesize().await;
    assert!(matches!(
        lica::resolve(&fx.store, &tx, &Topology::Taxonomy, &[]).await,
        Err(Error::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_lica_of_unknown_node_is_not_found() {
    let (fx, tx) = seed_and_synthesize().await;
    assert!(matches!(
        lica::resolve(&fx.store, &tx, &Topology::Taxonomy, &[NodeId(9999)]).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_lica_of_disconnected_node_is_structural() {
    let (fx, mut tx) = seed_and_synthesize().await;
    let mut props = PropertyMap::new();
    props.insert(schema::PROP_NAME.into(), Value::from("Adrift"));
    props.insert(schema::PROP_MRCA.into(), Value::IdList(vec![]));
    let island = fx.store.create_node(&mut tx, &[], props).await.unwrap();

    assert!(matches!(
        lica::resolve(&fx.store, &tx, &Topology::Taxonomy, &[fx.canis, island]).await,
        Err(Error::StructuralInvariant(_))
    ));
}

// ============================================================================
// 3. Set-guided resolution and the synthetic topology.
// ============================================================================

#[tokio::test]
async fn test_resolve_with_sets_walks_to_containing_ancestor() {
    let (fx, tx) = seed_and_synthesize().await;
    let topo = Topology::Taxonomy;

    let ingroup = treesynth::TipSet::from_ids([fx.canis.0, fx.felis.0]);
    let got = lica::resolve_with_sets(&fx.store, &tx, &topo, fx.canis, &ingroup)
        .await
        .unwrap();
    assert_eq!(got, fx.mammals);

    let wide = treesynth::TipSet::from_ids([fx.canis.0, fx.corvus.0]);
    let got = lica::resolve_with_sets(&fx.store, &tx, &topo, fx.canis, &wide)
        .await
        .unwrap();
    assert_eq!(got, fx.life);
}

#[tokio::test]
async fn test_lica_over_synthetic_topology() {
    let (fx, tx) = seed_and_synthesize().await;

    let topo = Topology::Synthetic(TREE.to_string());
    let got = lica::resolve(&fx.store, &tx, &topo, &[fx.canis, fx.felis]).await.unwrap();
    assert_eq!(got, fx.mammals);

    // A tree id nothing was synthesized under has no connecting structure.
    let missing = Topology::Synthetic("nope".to_string());
    assert!(matches!(
        lica::resolve(&fx.store, &tx, &missing, &[fx.canis, fx.felis]).await,
        Err(Error::StructuralInvariant(_))
    ));
}

// ============================================================================
// 4. Full extraction.
// ============================================================================

#[tokio::test]
async fn test_extract_full_tree() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = extract(&fx.store, &tx, TREE, fx.life, -1, LabelFormat::Name)
        .await
        .unwrap();

    assert_eq!(tree.tree_id, TREE);
    assert_eq!(tree.root.label, "Life");
    assert_eq!(tree.root.tip_descendants, 5);
    assert!(tree.root.supporting_sources.is_empty());
    assert_eq!(tree.root.children.len(), 2);

    // Children come back in id order: Mammalia before Aves.
    let mammals = &tree.root.children[0];
    let birds = &tree.root.children[1];
    assert_eq!(mammals.label, "Mammalia");
    assert_eq!(mammals.tip_descendants, 3);
    assert_eq!(mammals.supporting_sources, vec!["taxonomy".to_string()]);
    assert_eq!(mammals.children.len(), 3);
    assert!(mammals.children.iter().all(|c| c.children.is_empty()));

    assert_eq!(birds.label, "Aves");
    assert_eq!(birds.children.len(), 2);
}

// ============================================================================
// 5. Depth-bounded extraction with truncation markers.
// ============================================================================

#[tokio::test]
async fn test_extract_depth_limit_marks_truncated_branches() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = extract(&fx.store, &tx, TREE, fx.life, 1, LabelFormat::Name)
        .await
        .unwrap();

    let mammals = &tree.root.children[0];
    assert!(mammals.children.is_empty());
    let marker = mammals.truncated.as_ref().unwrap();
    assert_eq!(marker.leftmost, "Canis");
    assert_eq!(marker.rightmost, "Ursus");

    let birds = &tree.root.children[1];
    let marker = birds.truncated.as_ref().unwrap();
    assert_eq!(marker.leftmost, "Corvus");
    assert_eq!(marker.rightmost, "Turdus");
}

#[tokio::test]
async fn test_extract_depth_zero_truncates_at_root() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = extract(&fx.store, &tx, TREE, fx.life, 0, LabelFormat::Name)
        .await
        .unwrap();

    assert!(tree.root.children.is_empty());
    let marker = tree.root.truncated.as_ref().unwrap();
    assert_eq!(marker.leftmost, "Mammalia");
    assert_eq!(marker.rightmost, "Aves");
}

// ============================================================================
// 6. Extraction rejections and label formats.
// ============================================================================

#[tokio::test]
async fn test_extract_nonparticipant_is_rejected() {
    let (fx, tx) = seed_and_synthesize().await;

    assert!(matches!(
        extract(&fx.store, &tx, "nope", fx.life, -1, LabelFormat::Name).await,
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        extract(&fx.store, &tx, TREE, NodeId(9999), -1, LabelFormat::Name).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_extract_label_formats() {
    let (fx, tx) = seed_and_synthesize().await;

    let named = extract(&fx.store, &tx, TREE, fx.life, 0, LabelFormat::NameAndId)
        .await
        .unwrap();
    assert_eq!(named.root.label, format!("Life_{}", fx.life));

    let bare = extract(&fx.store, &tx, TREE, fx.life, 0, LabelFormat::Id)
        .await
        .unwrap();
    assert_eq!(bare.root.label, fx.life.to_string());
}

#[tokio::test]
async fn test_extracted_tree_serializes_to_json() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = extract(&fx.store, &tx, TREE, fx.life, -1, LabelFormat::Name)
        .await
        .unwrap();
    let json = serde_json::to_string(&tree).unwrap();
    let back: treesynth::DraftTree = serde_json::from_str(&json).unwrap();
    assert_eq!(tree, back);
    assert!(json.contains("\"Mammalia\""));
}

// ============================================================================
// 7. Induced subtrees.
// ============================================================================

#[tokio::test]
async fn test_induced_subtree_of_two_tips() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = induced_subtree(&fx.store, &tx, TREE, &[fx.canis, fx.corvus], LabelFormat::Name)
        .await
        .unwrap();

    // Rooted at the LICA, keeping only the two rootward paths.
    assert_eq!(tree.root.id, fx.life);
    assert_eq!(tree.root.children.len(), 2);
    let mammals = &tree.root.children[0];
    assert_eq!(mammals.label, "Mammalia");
    assert_eq!(mammals.children.len(), 1);
    assert_eq!(mammals.children[0].label, "Canis");
    let birds = &tree.root.children[1];
    assert_eq!(birds.children.len(), 1);
    assert_eq!(birds.children[0].label, "Corvus");
}

#[tokio::test]
async fn test_induced_subtree_within_one_clade() {
    let (fx, tx) = seed_and_synthesize().await;

    let tree = induced_subtree(&fx.store, &tx, TREE, &[fx.canis, fx.ursus], LabelFormat::Name)
        .await
        .unwrap();

    assert_eq!(tree.root.id, fx.mammals);
    assert_eq!(tree.root.children.len(), 2);
    assert_eq!(tree.root.children[0].label, "Canis");
    assert_eq!(tree.root.children[1].label, "Ursus");
}

#[tokio::test]
async fn test_induced_subtree_requires_two_tips() {
    let (fx, tx) = seed_and_synthesize().await;

    assert!(matches!(
        induced_subtree(&fx.store, &tx, TREE, &[fx.canis], LabelFormat::Name).await,
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        induced_subtree(&fx.store, &tx, TREE, &[], LabelFormat::Name).await,
        Err(Error::Unsupported(_))
    ));
}

// ============================================================================
// 8. Malformed structure is reported, not looped over.
// ============================================================================

#[tokio::test]
async fn test_cyclic_structure_is_reported() {
    let store = MemoryStore::new();
    let mut tx = store.begin_tx(TxMode::ReadWrite).await.unwrap();

    let mut props = PropertyMap::new();
    props.insert(schema::PROP_MRCA.into(), Value::IdList(vec![1]));
    let a = store.create_node(&mut tx, &[], props.clone()).await.unwrap();
    let b = store.create_node(&mut tx, &[], props).await.unwrap();

    let mut edge = PropertyMap::new();
    edge.insert(schema::PROP_NAME.into(), Value::from("loop"));
    store
        .create_relationship(&mut tx, a, b, schema::REL_SYNTH_CHILD_OF, edge.clone())
        .await
        .unwrap();
    store
        .create_relationship(&mut tx, b, a, schema::REL_SYNTH_CHILD_OF, edge)
        .await
        .unwrap();

    let topo = Topology::Synthetic("loop".to_string());
    assert!(matches!(
        lica::rootward_path(&store, &tx, &topo, a).await,
        Err(Error::StructuralInvariant(_))
    ));
    assert!(matches!(
        extract(&store, &tx, "loop", a, -1, LabelFormat::Name).await,
        Err(Error::StructuralInvariant(_))
    ));
}
