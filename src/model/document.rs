use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Entity, Id, Node};

/// On-disk shape of a store.
///
/// `root` plus every other entity reachable from it. Entries are keyed by
/// identity in a sorted map so that serializing the same content always
/// produces the same bytes. A document in tree form (everything inline under
/// `root`, no `entries`) is read just as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub root: Node,
    #[serde(default)]
    pub entries: BTreeMap<Id, Entity>,
}

impl Document {
    /// A valid document holding a fresh, empty root node
    pub fn empty() -> Self {
        Self::from_root(Node::new("root"))
    }

    pub fn from_root(root: Node) -> Self {
        Self {
            root,
            entries: BTreeMap::new(),
        }
    }
}
