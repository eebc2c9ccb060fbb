use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = Uuid;

pub fn generate_id() -> Id {
    Uuid::new_v4()
}

/// Anything that carries a store-wide identity
pub trait Identified {
    fn meta_id(&self) -> Id;
}

/// A reference field: either the identity of an entity or the entity itself.
///
/// A JSON string is read as an identity, a JSON object as an inline entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(Id),
    Inline(Box<T>),
}

impl<T: Identified> Ref<T> {
    pub fn inline(value: T) -> Self {
        Ref::Inline(Box::new(value))
    }

    /// Identity of the referenced entity, whichever form the field is in
    pub fn id(&self) -> Id {
        match self {
            Ref::Id(id) => *id,
            Ref::Inline(value) => value.meta_id(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Ref::Inline(_))
    }

    pub fn as_inline(&self) -> Option<&T> {
        match self {
            Ref::Inline(value) => Some(value),
            Ref::Id(_) => None,
        }
    }

    /// Replace an inline entity by its identity, returning the entity if there was one
    pub fn take_inline(&mut self) -> Option<T> {
        let id = self.id();
        match std::mem::replace(self, Ref::Id(id)) {
            Ref::Inline(value) => Some(*value),
            Ref::Id(_) => None,
        }
    }
}

impl<T> From<Id> for Ref<T> {
    fn from(id: Id) -> Self {
        Ref::Id(id)
    }
}
