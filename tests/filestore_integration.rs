use cfgmgr::{
    CfgError, ConfigBackend, FillDepth, FilestoreBackend, Identified, Node, Parameter,
    ParameterGroup, Persistence, Ref, Resolver,
};
use serde_json::json;
use tempfile::TempDir;

/// Build: root -> beamline (folder) -> [mirror config, slits config]
async fn populated_store(path: &std::path::Path) -> (FilestoreBackend, Node) {
    let mut store = FilestoreBackend::open_or_initialize(path).await.unwrap();
    let root = store.root_id().await.unwrap();
    let beamline = store.add_child(&root, Node::new("beamline")).await.unwrap();

    let mut mirror = ParameterGroup::new("mirror").with_prefix("MR1:");
    mirror.push(Parameter::new("pitch", "PITCH").with_value(json!(0.5), "float"));
    mirror.push(Parameter::new("x", "X").with_value(json!(-2), "int"));
    store.add_child(&beamline, Node::from_data(mirror)).await.unwrap();

    let mut slits = ParameterGroup::new("slits");
    slits.push(Parameter::new("gap", "SL1:GAP").with_value(json!("open"), "str"));
    store.add_child(&beamline, Node::from_data(slits)).await.unwrap();

    let tree = store.get_tree(FillDepth::Full).await.unwrap();
    (store, tree)
}

#[tokio::test]
async fn test_initialize_after_missing_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");

    let err = FilestoreBackend::open(&path).await.unwrap_err();
    assert!(matches!(err, CfgError::DocumentMissing(_)));

    Persistence::initialize(&path).await.unwrap();
    let mut store = FilestoreBackend::open(&path).await.unwrap();
    let root = store.get_tree(FillDepth::Full).await.unwrap();
    assert!(root.data.is_empty());
    assert!(root.children.is_empty());

    assert!(matches!(
        Persistence::initialize(&path).await,
        Err(CfgError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_saved_tree_reloads_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let (mut store, tree) = populated_store(&path).await;
    store.save().await.unwrap();

    let mut reopened = FilestoreBackend::open(&path).await.unwrap();
    assert_eq!(reopened.get_tree(FillDepth::Full).await.unwrap(), tree);
    assert_eq!(reopened.entries().await.unwrap().len(), 9);
}

#[tokio::test]
async fn test_consecutive_saves_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let (mut store, _) = populated_store(&path).await;

    store.save().await.unwrap();
    let first = std::fs::read(&path).unwrap();
    store.save().await.unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);

    // A fresh load and save of the same content writes the same bytes too
    let mut reopened = FilestoreBackend::open(&path).await.unwrap();
    reopened.save().await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[tokio::test]
async fn test_document_stores_parents_as_identities() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let (mut store, tree) = populated_store(&path).await;
    store.save().await.unwrap();

    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let beamline_id = tree.children[0].id().to_string();
    let beamline = &document["entries"][&beamline_id];
    assert_eq!(beamline["kind"], "node");
    assert_eq!(beamline["parent"], tree.meta.meta_id.to_string());
    assert!(beamline["children"].as_array().unwrap().iter().all(|c| c.is_string()));
}

#[tokio::test]
async fn test_tree_form_document_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.json");

    let mut root = Node::new("root");
    let mut group = ParameterGroup::new("gun");
    group.push(Parameter::new("voltage", "GUN:HV").with_value(json!(120), "int"));
    let mut config = Node::from_data(group);
    config.parent = Some(Ref::Id(root.meta.meta_id));
    root.children.push(Ref::inline(config));
    std::fs::write(&path, serde_json::to_vec(&json!({ "root": root })).unwrap()).unwrap();

    let mut store = FilestoreBackend::open(&path).await.unwrap();
    assert_eq!(store.entries().await.unwrap().len(), 4);
    assert_eq!(store.get_tree(FillDepth::Full).await.unwrap(), root);
}

#[tokio::test]
async fn test_corrupt_document_loads_as_empty_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, br#"{"root": [1, 2, 3]}"#).unwrap();

    let mut store = FilestoreBackend::open(&path).await.unwrap();
    let root = store.get_tree(FillDepth::Full).await.unwrap();
    assert!(root.children.is_empty());
    assert_eq!(store.entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_then_lookup_still_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let (mut store, tree) = populated_store(&path).await;
    let beamline = tree.children[0].as_inline().unwrap();
    let mirror_node = beamline.children[0].id();
    let mirror_group = beamline.children[0].as_inline().unwrap().data[0].id();

    store.remove(&mirror_node).await.unwrap();
    assert!(store.get_node(&mirror_node).await.unwrap().parent.is_none());
    assert!(!store
        .get_node(&beamline.meta.meta_id)
        .await
        .unwrap()
        .child_ids()
        .contains(&mirror_node));
    assert_eq!(store.get_configuration(&mirror_group).await.unwrap().meta.name, "mirror");
}

#[tokio::test]
async fn test_delete_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let (mut store, tree) = populated_store(&path).await;
    let beamline = tree.children[0].as_inline().unwrap();
    let slits_node = beamline.children[1].as_inline().unwrap();
    let slits_group = slits_node.data[0].id();

    store.delete(&slits_group).await.unwrap();
    store.save().await.unwrap();

    let mut reopened = FilestoreBackend::open(&path).await.unwrap();
    assert!(reopened.get_configuration(&slits_group).await.unwrap_err().is_not_found());
    for entity in reopened.entries().await.unwrap() {
        assert!(!Resolver::referenced_ids(&entity).contains(&slits_group));
        assert!(reopened.validate(&entity).await.unwrap().is_valid(), "{}", entity.meta_id());
    }
    assert!(reopened.get_node(&slits_node.meta.meta_id).await.unwrap().data.is_empty());
}
