use std::collections::BTreeMap;

use crate::error::{CfgError, Result};
use crate::logic::{Lookup, Resolver};
use crate::model::{
    Document, Entity, EntityKind, Id, Identified, Node, NodeKind, Parameter, ParameterGroup,
};

/// Identity-keyed working set of one opened store.
///
/// Entities are held in flat form: reference fields name identities, and
/// each identity maps to exactly one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    entries: BTreeMap<Id, Entity>,
    root: Option<Id>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with everything reachable inline from `root`
    pub fn populate(&mut self, root: Node) {
        self.clear();
        let root = Entity::Node(root);
        self.root = Some(root.meta_id());
        self.entries = Resolver::flatten(&root);
        log::debug!("Cache populated with {} entities", self.entries.len());
    }

    /// Populate from the root of `document`, then add its remaining entries
    pub fn populate_document(&mut self, document: Document) {
        self.populate(document.root);
        for (id, entity) in document.entries {
            if id != entity.meta_id() {
                log::warn!(
                    "Document entry keyed {} holds entity {}; using the entity's identity",
                    id,
                    entity.meta_id()
                );
            }
            for flat in Resolver::flatten(&entity).into_values() {
                self.insert_new(flat);
            }
        }
    }

    /// Flat document of the current contents, ready for storage
    pub fn to_document(&self) -> Result<Document> {
        let root_id = self.root.ok_or_else(|| CfgError::NotFound(Id::nil()))?;
        let mut entries = BTreeMap::new();
        let mut root = None;
        for (id, entity) in &self.entries {
            let mut entity = entity.clone();
            Resolver::dereference_to_identity(&mut entity);
            if *id == root_id {
                root = Some(entity);
            } else {
                entries.insert(*id, entity);
            }
        }

        let root = match root {
            Some(Entity::Node(node)) => node,
            Some(other) => {
                return Err(CfgError::WrongKind {
                    id: root_id,
                    expected: "node",
                    found: other.kind(),
                })
            }
            None => return Err(CfgError::NotFound(root_id)),
        };
        Ok(Document { root, entries })
    }

    pub fn get(&self, id: &Id) -> Result<&Entity> {
        self.entries.get(id).ok_or(CfgError::NotFound(*id))
    }

    pub fn get_mut(&mut self, id: &Id) -> Result<&mut Entity> {
        self.entries.get_mut(id).ok_or(CfgError::NotFound(*id))
    }

    pub fn get_node(&self, id: &Id) -> Result<&Node> {
        let entity = self.get(id)?;
        entity.as_node().ok_or_else(|| Self::wrong_kind(*id, "node", entity))
    }

    pub fn get_parameter(&self, id: &Id) -> Result<&Parameter> {
        let entity = self.get(id)?;
        entity
            .as_parameter()
            .ok_or_else(|| Self::wrong_kind(*id, "parameter", entity))
    }

    pub fn get_group(&self, id: &Id) -> Result<&ParameterGroup> {
        let entity = self.get(id)?;
        entity
            .as_group()
            .ok_or_else(|| Self::wrong_kind(*id, "parameter group", entity))
    }

    pub fn get_node_mut(&mut self, id: &Id) -> Result<&mut Node> {
        match self.get_mut(id)? {
            Entity::Node(node) => Ok(node),
            other => Err(Self::wrong_kind(*id, "node", other)),
        }
    }

    fn wrong_kind(id: Id, expected: &'static str, found: &Entity) -> CfgError {
        CfgError::WrongKind {
            id,
            expected,
            found: found.kind(),
        }
    }

    /// Insert or overwrite by identity. Anything nested inline is stored under
    /// its own identity as well. Returns the entity previously stored there.
    pub fn put(&mut self, entity: impl Into<Entity>) -> Option<Entity> {
        let entity = entity.into();
        let id = entity.meta_id();
        let mut flat = Resolver::flatten(&entity);
        let previous = flat.remove(&id).and_then(|own| self.entries.insert(id, own));
        for (nested_id, nested) in flat {
            self.entries.insert(nested_id, nested);
        }
        previous
    }

    /// Insert only if the identity is not yet present. A second entity under a
    /// known identity is ignored and reported.
    pub fn insert_new(&mut self, entity: Entity) -> bool {
        let id = entity.meta_id();
        if let Some(existing) = self.entries.get(&id) {
            if *existing != entity {
                log::warn!(
                    "Ignoring second entity under identity {} ('{}'); '{}' is already cached",
                    id,
                    entity.name(),
                    existing.name()
                );
            }
            return false;
        }
        self.entries.insert(id, entity);
        true
    }

    /// Remove an entry. References to it held elsewhere are left in place.
    pub fn evict(&mut self, id: &Id) -> bool {
        let existed = self.entries.remove(id).is_some();
        if existed && self.root == Some(*id) {
            self.root = None;
        }
        existed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.root = None;
    }

    pub fn root(&self) -> Option<Id> {
        self.root
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Entity)> {
        self.entries.iter()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entries.values_mut()
    }

    /// Drop `child` from the `children` of every node other than `keep`.
    /// Returns the nodes it was dropped from.
    pub fn unlink_child(&mut self, child: &Id, keep: Option<&Id>) -> Vec<Id> {
        let mut unlinked = Vec::new();
        for entity in self.entries.values_mut() {
            if let Entity::Node(node) = entity {
                if keep == Some(&node.meta.meta_id) {
                    continue;
                }
                let before = node.children.len();
                node.children.retain(|c| c.id() != *child);
                if node.children.len() != before {
                    unlinked.push(node.meta.meta_id);
                }
            }
        }
        unlinked
    }

    pub fn node_kind(&self, id: &Id) -> Result<NodeKind> {
        let node = self.get_node(id)?;
        Ok(node.kind_with(|data_id| self.kind(&data_id)))
    }

    pub fn kind(&self, id: &Id) -> Option<EntityKind> {
        self.entries.get(id).map(Entity::kind)
    }
}

impl Lookup for EntityCache {
    fn lookup(&self, id: &Id) -> Option<&Entity> {
        self.entries.get(id)
    }
}
