use serde::{Deserialize, Deserializer, Serialize};

use crate::model::{Id, Identified, Metadata, Ref};

fn default_type() -> String {
    "str".to_string()
}

/// A present `value` key is `Some`, even when it holds `null`
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// A single PV binding: the process variable name and the value stored for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(flatten)]
    pub meta: Metadata,
    #[serde(default)]
    pub pv_name: String,
    /// `None` when no value is stored; `Some(Null)` is a stored null
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Type tag of `value`, e.g. "str", "int", "float"
    #[serde(rename = "type", default = "default_type")]
    pub value_type: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, pv_name: impl Into<String>) -> Self {
        Self {
            meta: Metadata::new(name),
            pv_name: pv_name.into(),
            value: None,
            value_type: default_type(),
            read_only: false,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value, value_type: impl Into<String>) -> Self {
        self.value = Some(value);
        self.value_type = value_type.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A set of parameters (or nested groups) that are applied together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    #[serde(flatten)]
    pub meta: Metadata,
    #[serde(default)]
    pub parameters: Vec<Ref<CfgData>>,
    /// Prepended to the PV names of the parameters directly inside this group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl ParameterGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: Metadata::new(name),
            parameters: Vec::new(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn push(&mut self, item: impl Into<CfgData>) {
        self.parameters.push(Ref::inline(item.into()));
    }

    pub fn push_id(&mut self, id: Id) {
        self.parameters.push(Ref::Id(id));
    }

    /// PV name of `parameter` as seen through this group's prefix
    pub fn effective_pv_name(&self, parameter: &Parameter) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, parameter.pv_name),
            None => parameter.pv_name.clone(),
        }
    }
}

/// What a node or group may hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CfgData {
    Parameter(Parameter),
    ParameterGroup(ParameterGroup),
}

impl CfgData {
    pub fn meta(&self) -> &Metadata {
        match self {
            CfgData::Parameter(p) => &p.meta,
            CfgData::ParameterGroup(g) => &g.meta,
        }
    }
}

impl From<Parameter> for CfgData {
    fn from(value: Parameter) -> Self {
        CfgData::Parameter(value)
    }
}

impl From<ParameterGroup> for CfgData {
    fn from(value: ParameterGroup) -> Self {
        CfgData::ParameterGroup(value)
    }
}

impl Identified for Parameter {
    fn meta_id(&self) -> Id {
        self.meta.meta_id
    }
}

impl Identified for ParameterGroup {
    fn meta_id(&self) -> Id {
        self.meta.meta_id
    }
}

impl Identified for CfgData {
    fn meta_id(&self) -> Id {
        self.meta().meta_id
    }
}
