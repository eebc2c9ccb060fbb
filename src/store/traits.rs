use crate::error::Result;
use crate::logic::{FillDepth, ValidationReport};
use crate::model::{Entity, Id, Node, Parameter, ParameterGroup};

/// Operations a client performs against one configuration store.
///
/// Reads load the store lazily on first use.
#[async_trait::async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Human-readable location of the store, for logs
    fn describe(&self) -> String;

    async fn get_parameter(&mut self, id: &Id) -> Result<Parameter>;
    async fn get_configuration(&mut self, id: &Id) -> Result<ParameterGroup>;
    /// Any entity, with its references filled to `depth`
    async fn get_entry(&mut self, id: &Id, depth: FillDepth) -> Result<Entity>;
    /// The root node with its references filled to `depth`
    async fn get_tree(&mut self, depth: FillDepth) -> Result<Node>;
    /// Every cached entity in flat form
    async fn entries(&mut self) -> Result<Vec<Entity>>;

    /// Insert or overwrite an entity (and anything nested inline in it)
    async fn put(&mut self, entity: Entity) -> Result<()>;
    /// Write the whole store back to its backing file
    async fn save(&mut self) -> Result<()>;
    /// Delete `id` and every reference to it
    async fn delete(&mut self, id: &Id) -> Result<()>;
    /// Detach a node from its parent without deleting it
    async fn remove(&mut self, node: &Id) -> Result<()>;
    async fn validate(&mut self, entry: &Entity) -> Result<ValidationReport>;
}
