use std::path::{Path, PathBuf};

use crate::error::{CfgError, Result};
use crate::logic::{FillDepth, Resolver, ValidationReport, Validator};
use crate::model::{Entity, Id, Identified, Node, Parameter, ParameterGroup, Ref};
use crate::store::{ConfigBackend, EntityCache, Persistence};

/// Configuration store backed by a single JSON document on disk
#[derive(Debug)]
pub struct FilestoreBackend {
    path: PathBuf,
    cache: EntityCache,
    loaded: bool,
}

impl FilestoreBackend {
    /// Handle on the store at `path`; nothing is read until first access
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: EntityCache::new(),
            loaded: false,
        }
    }

    /// Open and load an existing store
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut backend = Self::new(path);
        backend.refresh_cache().await?;
        Ok(backend)
    }

    /// Open the store at `path`, creating an empty one first if there is no file
    pub async fn open_or_initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let mut backend = Self::new(path);
        match backend.refresh_cache().await {
            Ok(()) => {}
            Err(CfgError::DocumentMissing(_)) => {
                Persistence::initialize(&backend.path).await?;
                backend.refresh_cache().await?;
            }
            Err(err) => return Err(err),
        }
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cache and reload it from disk
    pub async fn refresh_cache(&mut self) -> Result<()> {
        let document = Persistence::load(&self.path).await?;
        self.cache.clear();
        self.cache.populate_document(document);
        self.loaded = true;
        log::info!(
            "Loaded {} entities from {}",
            self.cache.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn ensure_loaded(&mut self) -> Result<()> {
        if !self.loaded {
            self.refresh_cache().await?;
        }
        Ok(())
    }

    /// The working set, loaded on first use
    pub async fn cache(&mut self) -> Result<&mut EntityCache> {
        self.ensure_loaded().await?;
        Ok(&mut self.cache)
    }

    pub async fn root_id(&mut self) -> Result<Id> {
        let cache = self.cache().await?;
        cache.root().ok_or_else(|| CfgError::NotFound(Id::nil()))
    }

    pub async fn get_node(&mut self, id: &Id) -> Result<Node> {
        self.cache().await?.get_node(id).cloned()
    }

    /// Attach `child` under `parent`, setting both directions of the link.
    /// A child already attached elsewhere is moved.
    pub async fn add_child(&mut self, parent: &Id, mut child: Node) -> Result<Id> {
        let child_id = child.meta_id();
        let cache = self.cache().await?;
        cache.get_node(parent)?;
        cache.unlink_child(&child_id, Some(parent));

        let parent_node = cache.get_node_mut(parent)?;
        if !parent_node.child_ids().contains(&child_id) {
            parent_node.children.push(Ref::Id(child_id));
        }
        child.parent = Some(Ref::Id(*parent));
        cache.put(child);
        Ok(child_id)
    }

    /// Run `f` against the working set, then save whether or not it succeeded.
    /// An error from `f` takes precedence over one from the save.
    pub async fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut EntityCache) -> Result<T> + Send,
        T: Send,
    {
        self.ensure_loaded().await?;
        let outcome = f(&mut self.cache);
        let saved = self.save().await;
        match (outcome, saved) {
            (Err(err), Err(save_err)) => {
                log::warn!("Save after failed transaction also failed: {}", save_err);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(save_err)) => Err(save_err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

#[async_trait::async_trait]
impl ConfigBackend for FilestoreBackend {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn get_parameter(&mut self, id: &Id) -> Result<Parameter> {
        self.cache().await?.get_parameter(id).cloned()
    }

    async fn get_configuration(&mut self, id: &Id) -> Result<ParameterGroup> {
        self.cache().await?.get_group(id).cloned()
    }

    async fn get_entry(&mut self, id: &Id, depth: FillDepth) -> Result<Entity> {
        let cache = self.cache().await?;
        let entity = cache.get(id)?;
        Resolver::inline(entity, &*cache, depth)
    }

    async fn get_tree(&mut self, depth: FillDepth) -> Result<Node> {
        let root = self.root_id().await?;
        let filled = self.get_entry(&root, depth).await?;
        Node::try_from(filled).map_err(|other| CfgError::WrongKind {
            id: root,
            expected: "node",
            found: other.kind(),
        })
    }

    async fn entries(&mut self) -> Result<Vec<Entity>> {
        let cache = self.cache().await?;
        Ok(cache.iter().map(|(_, entity)| entity.clone()).collect())
    }

    async fn put(&mut self, entity: Entity) -> Result<()> {
        self.cache().await?.put(entity);
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        let document = self.cache().await?.to_document()?;
        Persistence::store(&self.path, &document).await
    }

    async fn delete(&mut self, id: &Id) -> Result<()> {
        let cache = self.cache().await?;
        if cache.root() == Some(*id) {
            return Err(CfgError::RootNode(*id));
        }
        if !cache.evict(id) {
            return Err(CfgError::NotFound(*id));
        }

        let mut scrubbed = 0;
        for entity in cache.values_mut() {
            if Resolver::scrub(entity, *id) {
                scrubbed += 1;
            }
        }
        log::debug!("Deleted {} and scrubbed {} referencing entities", id, scrubbed);
        Ok(())
    }

    async fn remove(&mut self, node: &Id) -> Result<()> {
        let cache = self.cache().await?;
        let node_entry = cache.get_node_mut(node)?;
        let parent = node_entry.parent_id();
        node_entry.parent = None;

        // A child may be listed without a back-pointer; unlink it everywhere
        let unlinked = cache.unlink_child(node, None);
        if let Some(parent) = parent.filter(|p| !unlinked.contains(p)) {
            log::warn!("Parent {} did not list {} as a child", parent, node);
        }
        Ok(())
    }

    async fn validate(&mut self, entry: &Entity) -> Result<ValidationReport> {
        let cache = self.cache().await?;
        Ok(Validator::validate(entry, &*cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::ValidationProblem;
    use crate::model::Document;
    use serde_json::json;
    use tempfile::TempDir;

    async fn fresh_store(dir: &TempDir) -> FilestoreBackend {
        FilestoreBackend::open_or_initialize(dir.path().join("store.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lazy_load_on_first_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut writer = fresh_store(&dir).await;
        let root = writer.root_id().await.unwrap();
        let param = Parameter::new("gap", "UND:GAP");
        let param_id = param.meta.meta_id;
        writer.put(param.into()).await.unwrap();
        writer.get_node(&root).await.unwrap();
        writer.save().await.unwrap();

        let mut reader = FilestoreBackend::new(&path);
        assert!(!reader.loaded);
        assert_eq!(reader.get_parameter(&param_id).await.unwrap().pv_name, "UND:GAP");
        assert!(reader.loaded);
    }

    #[tokio::test]
    async fn test_get_configuration_checks_kind() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let param = Parameter::new("p", "P");
        let id = param.meta.meta_id;
        store.put(param.into()).await.unwrap();

        assert!(matches!(
            store.get_configuration(&id).await,
            Err(CfgError::WrongKind { .. })
        ));
        let missing = crate::model::generate_id();
        assert!(store.get_configuration(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_detaches_but_keeps_node() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();
        let child = store.add_child(&root, Node::new("optics")).await.unwrap();
        assert_eq!(store.get_node(&root).await.unwrap().child_ids(), vec![child]);

        store.remove(&child).await.unwrap();
        assert!(store.get_node(&child).await.unwrap().parent.is_none());
        assert!(store.get_node(&root).await.unwrap().children.is_empty());
        assert!(store.get_node(&child).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_scrubs_every_reference() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();

        let shared = Parameter::new("shared", "SHARED");
        let shared_id = shared.meta.meta_id;
        let mut group = ParameterGroup::new("g");
        group.push(shared.clone());
        let mut node = Node::from_data(group);
        node.data.push(Ref::Id(shared_id));
        store.add_child(&root, node).await.unwrap();

        store.delete(&shared_id).await.unwrap();
        let entries = store.entries().await.unwrap();
        assert!(entries.iter().all(|e| e.meta_id() != shared_id));
        assert!(entries
            .iter()
            .all(|e| !Resolver::referenced_ids(e).contains(&shared_id)));

        assert!(store.delete(&shared_id).await.unwrap_err().is_not_found());
        assert!(matches!(store.delete(&root).await, Err(CfgError::RootNode(_))));
    }

    #[tokio::test]
    async fn test_delete_child_node_clears_parent_links() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();
        let folder = store.add_child(&root, Node::new("folder")).await.unwrap();
        let leaf = store.add_child(&folder, Node::new("leaf")).await.unwrap();

        store.delete(&folder).await.unwrap();
        assert!(store.get_node(&root).await.unwrap().children.is_empty());
        assert!(store.get_node(&leaf).await.unwrap().parent.is_none());
    }

    #[tokio::test]
    async fn test_add_child_moves_between_parents() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();
        let a = store.add_child(&root, Node::new("a")).await.unwrap();
        let b = store.add_child(&root, Node::new("b")).await.unwrap();
        let leaf = store.add_child(&a, Node::new("leaf")).await.unwrap();

        let node = store.get_node(&leaf).await.unwrap();
        store.add_child(&b, node).await.unwrap();
        assert!(store.get_node(&a).await.unwrap().children.is_empty());
        assert_eq!(store.get_node(&b).await.unwrap().child_ids(), vec![leaf]);
        assert_eq!(store.get_node(&leaf).await.unwrap().parent_id(), Some(b));
    }

    #[tokio::test]
    async fn test_add_child_to_missing_parent_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();
        let a = store.add_child(&root, Node::new("a")).await.unwrap();
        let leaf = store.add_child(&a, Node::new("leaf")).await.unwrap();

        let node = store.get_node(&leaf).await.unwrap();
        let missing = crate::model::generate_id();
        assert!(store.add_child(&missing, node).await.unwrap_err().is_not_found());
        assert_eq!(store.get_node(&a).await.unwrap().child_ids(), vec![leaf]);
        assert_eq!(store.get_node(&leaf).await.unwrap().parent_id(), Some(a));
    }

    #[tokio::test]
    async fn test_remove_from_tree_form_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut root = Node::new("root");
        let child = Node::new("unlinked");
        let child_id = child.meta.meta_id;
        root.children.push(Ref::inline(child));
        let root_id = root.meta.meta_id;
        Persistence::store(&path, &Document::from_root(root)).await.unwrap();

        let mut store = FilestoreBackend::open(&path).await.unwrap();
        assert!(store.get_node(&child_id).await.unwrap().parent.is_none());
        store.remove(&child_id).await.unwrap();
        assert!(store.get_node(&root_id).await.unwrap().children.is_empty());
        assert!(store.get_node(&child_id).await.is_ok());

        store.save().await.unwrap();
        let mut reopened = FilestoreBackend::open(&path).await.unwrap();
        assert!(reopened.get_node(&root_id).await.unwrap().children.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_saves_on_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let mut store = fresh_store(&dir).await;
        let param = Parameter::new("energy", "LINAC:E").with_value(json!(4.5), "float");
        let id = param.meta.meta_id;

        store
            .transaction(|cache| {
                cache.put(param);
                Ok(())
            })
            .await
            .unwrap();
        let mut reopened = FilestoreBackend::open(&path).await.unwrap();
        assert_eq!(reopened.get_parameter(&id).await.unwrap().value, Some(json!(4.5)));

        let err = store
            .transaction(|cache| {
                cache.put(Parameter::new("partial", "PARTIAL"));
                cache.get(&crate::model::generate_id()).map(|_| ())
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let mut reopened = FilestoreBackend::open(&path).await.unwrap();
        assert_eq!(reopened.entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_validate_uses_cache_kinds() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();

        let mut bad = Node::new("bad");
        bad.data.push(Ref::Id(root));
        let report = store.validate(&bad.into()).await.unwrap();
        assert!(!report.is_valid());
        assert!(matches!(
            report.issues[0].problem,
            ValidationProblem::KindMismatch { .. }
        ));

        let mut good = Node::new("good");
        good.parent = Some(Ref::Id(root));
        assert!(store.validate(&good.into()).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_get_tree_fills_to_depth() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir).await;
        let root = store.root_id().await.unwrap();
        let folder = store.add_child(&root, Node::new("folder")).await.unwrap();
        store.add_child(&folder, Node::new("leaf")).await.unwrap();

        let shallow = store.get_tree(FillDepth::ONE).await.unwrap();
        let folder_node = shallow.children[0].as_inline().unwrap();
        assert!(!folder_node.children[0].is_inline());

        let full = store.get_tree(FillDepth::Full).await.unwrap();
        let folder_node = full.children[0].as_inline().unwrap();
        assert_eq!(folder_node.children[0].as_inline().unwrap().meta.name, "leaf");
    }
}
