use serde::{Deserialize, Serialize};

use crate::model::{CfgData, EntityKind, Id, Identified, Metadata, Ref};

/// An entry in the configuration tree.
///
/// What a node represents is derived from what it holds in `data`, see [`NodeKind`].
/// `parent` is the non-owning direction and is kept as an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Node {
    #[serde(flatten)]
    pub meta: Metadata,
    #[serde(default)]
    pub data: Vec<Ref<CfgData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Ref<Node>>,
    #[serde(default)]
    pub children: Vec<Ref<Node>>,
}

/// Wire form of a node. An inline node carries no `kind` key, but an object
/// tagged as some other entity must not be read as one.
#[derive(Deserialize)]
struct RawNode {
    #[serde(flatten)]
    meta: Metadata,
    #[serde(default)]
    kind: Option<EntityKind>,
    #[serde(default)]
    data: Vec<Ref<CfgData>>,
    #[serde(default)]
    parent: Option<Ref<Node>>,
    #[serde(default)]
    children: Vec<Ref<Node>>,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        match raw.kind {
            None | Some(EntityKind::Node) => Ok(Node {
                meta: raw.meta,
                data: raw.data,
                parent: raw.parent,
                children: raw.children,
            }),
            Some(other) => Err(format!(
                "entity {} is a {}, expected a node",
                raw.meta.meta_id, other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Holds no data, only children
    Folder,
    /// Holds at least one parameter group
    Configuration,
    /// Holds bare parameters only
    Parameters,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: Metadata::new(name),
            data: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// A node named after, and holding, a single piece of data
    pub fn from_data(data: impl Into<CfgData>) -> Self {
        let data = data.into();
        let mut node = Node::new(data.meta().name.clone());
        node.data.push(Ref::inline(data));
        node
    }

    pub fn parent_id(&self) -> Option<Id> {
        self.parent.as_ref().map(Ref::id)
    }

    pub fn child_ids(&self) -> Vec<Id> {
        self.children.iter().map(Ref::id).collect()
    }

    /// Derive the node kind; `kind_of` resolves data items held only by identity
    pub fn kind_with(&self, kind_of: impl Fn(Id) -> Option<EntityKind>) -> NodeKind {
        let kinds: Vec<Option<EntityKind>> = self
            .data
            .iter()
            .map(|item| match item {
                Ref::Inline(data) => Some(match data.as_ref() {
                    CfgData::Parameter(_) => EntityKind::Parameter,
                    CfgData::ParameterGroup(_) => EntityKind::ParameterGroup,
                }),
                Ref::Id(id) => kind_of(*id),
            })
            .collect();

        if kinds.contains(&Some(EntityKind::ParameterGroup)) {
            NodeKind::Configuration
        } else if kinds.contains(&Some(EntityKind::Parameter)) {
            NodeKind::Parameters
        } else {
            NodeKind::Folder
        }
    }
}

impl Identified for Node {
    fn meta_id(&self) -> Id {
        self.meta.meta_id
    }
}
