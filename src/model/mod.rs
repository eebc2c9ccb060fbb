//! Data model of a configuration store.
//!
//! A [`Node`] is an entry in the tree; its kind follows from what it holds:
//! a node holding a [`ParameterGroup`] is a configuration, a node holding
//! nothing is a folder. [`Parameter`]s are the smallest unit, a single PV/value
//! pair plus metadata. Reference fields hold either an identity or the entity
//! itself, see [`Ref`].

pub mod common;
pub mod document;
pub mod entity;
pub mod metadata;
pub mod node;
pub mod parameter;

pub use common::*;
pub use document::*;
pub use entity::*;
pub use metadata::*;
pub use node::*;
pub use parameter::*;
