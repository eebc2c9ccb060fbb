use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{CfgData, Id, Identified, Metadata, Node, Parameter, ParameterGroup};

/// Any identity-bearing record held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Node(Node),
    Parameter(Parameter),
    ParameterGroup(ParameterGroup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Parameter,
    ParameterGroup,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Parameter => "parameter",
            EntityKind::ParameterGroup => "parameter group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Entity {
    pub fn meta(&self) -> &Metadata {
        match self {
            Entity::Node(n) => &n.meta,
            Entity::Parameter(p) => &p.meta,
            Entity::ParameterGroup(g) => &g.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Metadata {
        match self {
            Entity::Node(n) => &mut n.meta,
            Entity::Parameter(p) => &mut p.meta,
            Entity::ParameterGroup(g) => &mut g.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::Parameter(_) => EntityKind::Parameter,
            Entity::ParameterGroup(_) => EntityKind::ParameterGroup,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Entity::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Entity::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&ParameterGroup> {
        match self {
            Entity::ParameterGroup(g) => Some(g),
            _ => None,
        }
    }
}

impl Identified for Entity {
    fn meta_id(&self) -> Id {
        self.meta().meta_id
    }
}

impl From<Node> for Entity {
    fn from(value: Node) -> Self {
        Entity::Node(value)
    }
}

impl From<Parameter> for Entity {
    fn from(value: Parameter) -> Self {
        Entity::Parameter(value)
    }
}

impl From<ParameterGroup> for Entity {
    fn from(value: ParameterGroup) -> Self {
        Entity::ParameterGroup(value)
    }
}

impl From<CfgData> for Entity {
    fn from(value: CfgData) -> Self {
        match value {
            CfgData::Parameter(p) => Entity::Parameter(p),
            CfgData::ParameterGroup(g) => Entity::ParameterGroup(g),
        }
    }
}

impl TryFrom<Entity> for CfgData {
    type Error = Entity;

    fn try_from(value: Entity) -> Result<Self, Self::Error> {
        match value {
            Entity::Parameter(p) => Ok(CfgData::Parameter(p)),
            Entity::ParameterGroup(g) => Ok(CfgData::ParameterGroup(g)),
            other => Err(other),
        }
    }
}

impl TryFrom<Entity> for Node {
    type Error = Entity;

    fn try_from(value: Entity) -> Result<Self, Self::Error> {
        match value {
            Entity::Node(n) => Ok(n),
            other => Err(other),
        }
    }
}
