//! Client over one or more configuration stores.
//!
//! Entities handed out by the client are addressed by an [`EntryHandle`],
//! which pairs the identity with the backend the entity came from so writes
//! are routed back to the right store.

use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{CfgError, ControlError, Result};
use crate::logic::FillDepth;
use crate::model::{CfgData, Entity, Id, Identified, Node, Parameter, ParameterGroup, Ref};
use crate::store::{ConfigBackend, FilestoreBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BackendId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryHandle {
    pub backend: BackendId,
    pub id: Id,
}

/// Live control system the parameters' PVs belong to
#[async_trait::async_trait]
pub trait ControlLayer: Send + Sync {
    async fn get(&self, pv_name: &str) -> std::result::Result<Value, ControlError>;
    async fn put(&self, pv_name: &str, value: &Value) -> std::result::Result<(), ControlError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

/// Content fields only; identity and creation time never count as differences
const IGNORED_FIELDS: [&str; 2] = ["meta_id", "creation"];

pub struct Client {
    backends: Vec<Box<dyn ConfigBackend>>,
    control: Option<Arc<dyn ControlLayer>>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            control: None,
        }
    }

    /// Client over the single file store named by `config`
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let path = config.document_path();
        let backend = if config.store.initialize {
            FilestoreBackend::open_or_initialize(path).await?
        } else {
            FilestoreBackend::open(path).await?
        };
        let mut client = Self::new();
        client.add_backend(Box::new(backend));
        Ok(client)
    }

    pub fn with_control(mut self, control: Arc<dyn ControlLayer>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn add_backend(&mut self, backend: Box<dyn ConfigBackend>) -> BackendId {
        self.backends.push(backend);
        BackendId(self.backends.len() - 1)
    }

    pub fn backend(&mut self, id: BackendId) -> Result<&mut dyn ConfigBackend> {
        match self.backends.get_mut(id.0) {
            Some(backend) => Ok(&mut **backend),
            None => Err(CfgError::UnknownBackend(id.0)),
        }
    }

    /// A synthetic root holding every backend's tree as a child
    pub async fn get_tree(&mut self, depth: FillDepth) -> Result<Node> {
        let mut root = Node::new("databases");
        for backend in self.backends.iter_mut() {
            let mut tree = backend.get_tree(depth).await?;
            tree.meta.description = backend.describe();
            root.children.push(Ref::inline(tree));
        }
        Ok(root)
    }

    pub async fn get_entry(&mut self, handle: EntryHandle, depth: FillDepth) -> Result<Entity> {
        self.backend(handle.backend)?.get_entry(&handle.id, depth).await
    }

    /// Entries whose serialized `field` equals `value`, ordered by name
    pub async fn search(&mut self, field: &str, value: &Value) -> Result<Vec<(EntryHandle, Entity)>> {
        let mut hits = Vec::new();
        for (index, backend) in self.backends.iter_mut().enumerate() {
            for entity in backend.entries().await? {
                if serde_json::to_value(&entity)?.get(field) == Some(value) {
                    let handle = EntryHandle {
                        backend: BackendId(index),
                        id: entity.meta_id(),
                    };
                    hits.push((handle, entity));
                }
            }
        }
        Ok(hits
            .into_iter()
            .sorted_by(|(_, a), (_, b)| a.name().cmp(b.name()))
            .collect())
    }

    pub async fn delete_entry(&mut self, handle: EntryHandle) -> Result<()> {
        self.backend(handle.backend)?.delete(&handle.id).await
    }

    pub async fn save(&mut self, backend: BackendId) -> Result<()> {
        self.backend(backend)?.save().await
    }

    pub async fn save_all(&mut self) -> Result<()> {
        for backend in self.backends.iter_mut() {
            backend.save().await?;
        }
        Ok(())
    }

    /// Field-level differences between two entities of the same kind
    pub fn compare(left: &Entity, right: &Entity) -> Result<Vec<FieldDiff>> {
        if left.kind() != right.kind() {
            return Err(CfgError::WrongKind {
                id: right.meta_id(),
                expected: left.kind().as_str(),
                found: right.kind(),
            });
        }
        if Self::fingerprint(left)? == Self::fingerprint(right)? {
            return Ok(Vec::new());
        }

        let left = Self::content_fields(left)?;
        let right = Self::content_fields(right)?;
        Ok(left
            .keys()
            .chain(right.keys())
            .sorted()
            .dedup()
            .filter(|field| left.get(*field) != right.get(*field))
            .map(|field| FieldDiff {
                field: field.clone(),
                left: left.get(field).cloned(),
                right: right.get(field).cloned(),
            })
            .collect())
    }

    /// SHA-256 of an entity's content, ignoring identity and creation time
    pub fn fingerprint(entity: &Entity) -> Result<String> {
        let content = Self::content_fields(entity)?;
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&content)?);
        Ok(hex::encode(hasher.finalize()))
    }

    fn content_fields(entity: &Entity) -> Result<BTreeMap<String, Value>> {
        let mut fields = match serde_json::to_value(entity)? {
            Value::Object(map) => map.into_iter().collect::<BTreeMap<_, _>>(),
            _ => BTreeMap::new(),
        };
        for ignored in IGNORED_FIELDS {
            fields.remove(ignored);
        }
        Ok(fields)
    }

    /// Recursively copy `source` under fresh identities into the same backend.
    /// The copy is detached, named "<name> (copy)", and holds no stored values.
    pub async fn copy(&mut self, source: EntryHandle) -> Result<EntryHandle> {
        let backend = self.backend(source.backend)?;
        let filled = backend.get_entry(&source.id, FillDepth::Full).await?;

        let mut copy = renew(filled);
        let name = format!("{} (copy)", copy.name());
        copy.meta_mut().name = name;
        if let Entity::Node(node) = &mut copy {
            node.parent = None;
        }

        let id = copy.meta_id();
        backend.put(copy).await?;
        Ok(EntryHandle {
            backend: source.backend,
            id,
        })
    }

    /// Read current PV values for every parameter under `entry`.
    ///
    /// Returns the filled entry; with `in_place` the values are also written to
    /// the backend's working set (not saved).
    pub async fn snapshot(&mut self, entry: EntryHandle, in_place: bool) -> Result<Entity> {
        let control = self.control.clone();
        let backend = self.backend(entry.backend)?;
        let mut filled = backend.get_entry(&entry.id, FillDepth::Full).await?;

        let mut readings = HashMap::new();
        if let Some(control) = control {
            for (param_id, pv) in parameter_pvs(&filled) {
                let value = control
                    .get(&pv)
                    .await
                    .map_err(|source| CfgError::Control { pv: pv.clone(), source })?;
                readings.insert(param_id, value);
            }
        }

        for_each_parameter_mut(&mut filled, &mut |param| {
            if let Some(value) = readings.get(&param.meta.meta_id) {
                param.value = Some(value.clone());
            }
        });

        if in_place {
            backend.put(filled.clone()).await?;
        }
        Ok(filled)
    }

    /// Write stored values of every writable parameter under `entry` to the
    /// control layer. Parameters without a value are skipped. Returns how many
    /// PVs were written.
    pub async fn apply(&mut self, entry: EntryHandle) -> Result<usize> {
        let Some(control) = self.control.clone() else {
            log::warn!("No control layer attached; nothing applied");
            return Ok(0);
        };
        let filled = self.get_entry(entry, FillDepth::Full).await?;

        let writes = collect_writes(&filled);
        for (pv, value) in &writes {
            control
                .put(pv, value)
                .await
                .map_err(|source| CfgError::Control { pv: pv.clone(), source })?;
        }
        log::info!("Applied {} PVs from {}", writes.len(), entry.id);
        Ok(writes.len())
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

fn renew(entity: Entity) -> Entity {
    match entity {
        Entity::Node(node) => Entity::Node(renew_node(node, None)),
        Entity::Parameter(param) => Entity::Parameter(renew_parameter(param)),
        Entity::ParameterGroup(group) => Entity::ParameterGroup(renew_group(group)),
    }
}

/// Fresh identity, children rewired to it
fn renew_node(node: Node, parent: Option<Id>) -> Node {
    let meta = node.meta.renewed();
    let id = meta.meta_id;
    Node {
        meta,
        data: node.data.into_iter().map(renew_data).collect(),
        parent: parent.map(Ref::Id).or(node.parent),
        children: node
            .children
            .into_iter()
            .map(|child| match child {
                Ref::Inline(child) => Ref::inline(renew_node(*child, Some(id))),
                id_only => id_only,
            })
            .collect(),
    }
}

fn renew_parameter(param: Parameter) -> Parameter {
    Parameter {
        meta: param.meta.renewed(),
        value: None,
        ..param
    }
}

fn renew_group(mut group: ParameterGroup) -> ParameterGroup {
    group.meta = group.meta.renewed();
    group.parameters = group.parameters.into_iter().map(renew_data).collect();
    group
}

fn renew_data(item: Ref<CfgData>) -> Ref<CfgData> {
    match item {
        Ref::Inline(data) => Ref::inline(match *data {
            CfgData::Parameter(param) => CfgData::Parameter(renew_parameter(param)),
            CfgData::ParameterGroup(group) => CfgData::ParameterGroup(renew_group(group)),
        }),
        id_only => id_only,
    }
}

/// (parameter identity, effective PV name) for every inline parameter under `entity`
fn parameter_pvs(entity: &Entity) -> Vec<(Id, String)> {
    let mut out = Vec::new();
    visit_parameters(entity, &mut |group, param| {
        out.push((param.meta.meta_id, effective_pv(group, param)));
    });
    out
}

/// (effective PV name, value) for every writable parameter holding a value
fn collect_writes(entity: &Entity) -> Vec<(String, Value)> {
    let mut writes = Vec::new();
    visit_parameters(entity, &mut |group, param| {
        if param.read_only {
            return;
        }
        if let Some(value) = &param.value {
            writes.push((effective_pv(group, param), value.clone()));
        }
    });
    writes
}

fn effective_pv(group: Option<&ParameterGroup>, param: &Parameter) -> String {
    match group {
        Some(group) => group.effective_pv_name(param),
        None => param.pv_name.clone(),
    }
}

/// Called with each parameter and the group directly holding it, if any
type ParameterVisitor<'a> = dyn FnMut(Option<&ParameterGroup>, &Parameter) + 'a;

/// Walk inline parameters; a group's prefix applies to the parameters directly inside it
fn visit_parameters(entity: &Entity, f: &mut ParameterVisitor<'_>) {
    match entity {
        Entity::Parameter(param) => f(None, param),
        Entity::ParameterGroup(group) => visit_group(group, f),
        Entity::Node(node) => visit_node(node, f),
    }
}

fn visit_group(group: &ParameterGroup, f: &mut ParameterVisitor<'_>) {
    for item in &group.parameters {
        visit_data(item, Some(group), f);
    }
}

fn visit_node(node: &Node, f: &mut ParameterVisitor<'_>) {
    for item in &node.data {
        visit_data(item, None, f);
    }
    for child in node.children.iter().filter_map(Ref::as_inline) {
        visit_node(child, f);
    }
}

fn visit_data(item: &Ref<CfgData>, group: Option<&ParameterGroup>, f: &mut ParameterVisitor<'_>) {
    match item.as_inline() {
        Some(CfgData::Parameter(param)) => f(group, param),
        Some(CfgData::ParameterGroup(group)) => visit_group(group, f),
        None => {}
    }
}

fn for_each_parameter_mut(entity: &mut Entity, f: &mut dyn FnMut(&mut Parameter)) {
    match entity {
        Entity::Parameter(param) => f(param),
        Entity::ParameterGroup(group) => {
            for item in group.parameters.iter_mut() {
                for_each_data_mut(item, f);
            }
        }
        Entity::Node(node) => for_each_in_node_mut(node, f),
    }
}

fn for_each_in_node_mut(node: &mut Node, f: &mut dyn FnMut(&mut Parameter)) {
    for item in node.data.iter_mut() {
        for_each_data_mut(item, f);
    }
    for child in node.children.iter_mut() {
        if let Ref::Inline(child) = child {
            for_each_in_node_mut(child, f);
        }
    }
}

fn for_each_data_mut(item: &mut Ref<CfgData>, f: &mut dyn FnMut(&mut Parameter)) {
    if let Ref::Inline(data) = item {
        match data.as_mut() {
            CfgData::Parameter(param) => f(param),
            CfgData::ParameterGroup(group) => {
                for nested in group.parameters.iter_mut() {
                    for_each_data_mut(nested, f);
                }
            }
        }
    }
}
