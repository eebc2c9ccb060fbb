use std::collections::{BTreeMap, HashSet};
use std::num::ParseIntError;
use std::str::FromStr;

use crate::error::{CfgError, Result};
use crate::model::{CfgData, Entity, EntityKind, Id, Identified, Node, Ref};

/// Read access to entities by identity
pub trait Lookup {
    fn lookup(&self, id: &Id) -> Option<&Entity>;
}

impl Lookup for BTreeMap<Id, Entity> {
    fn lookup(&self, id: &Id) -> Option<&Entity> {
        self.get(id)
    }
}

/// How far `inline` resolves identity references below the entity it starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillDepth {
    /// Resolve references this many levels down; 0 leaves the entity untouched
    Levels(u32),
    /// Resolve everything reachable, stopping only where a reference leads back
    /// to an entity already on the current path
    Full,
}

impl FillDepth {
    pub const ONE: FillDepth = FillDepth::Levels(1);

    fn is_exhausted(self) -> bool {
        self == FillDepth::Levels(0)
    }

    fn descend(self) -> FillDepth {
        match self {
            FillDepth::Levels(n) => FillDepth::Levels(n.saturating_sub(1)),
            FillDepth::Full => FillDepth::Full,
        }
    }
}

impl Default for FillDepth {
    fn default() -> Self {
        FillDepth::ONE
    }
}

/// `"full"` or a level count
impl FromStr for FillDepth {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("full") {
            Ok(FillDepth::Full)
        } else {
            s.parse().map(FillDepth::Levels)
        }
    }
}

/// Types that may sit behind a reference field
trait RefTarget: Identified + Into<Entity> + TryFrom<Entity, Error = Entity> {
    const EXPECTED: &'static str;
}

impl RefTarget for Node {
    const EXPECTED: &'static str = "node";
}

impl RefTarget for CfgData {
    const EXPECTED: &'static str = "parameter or parameter group";
}

/// Converts entity graphs between tree form (nested inline) and flat form
/// (one entry per identity, containment fields holding identities only).
pub struct Resolver;

impl Resolver {
    /// Walk `root` and every entity nested inline below it, returning each one
    /// once, keyed by identity, with its reference fields reduced to identities.
    ///
    /// The first occurrence of an identity wins. Identity-only fields are not
    /// followed.
    pub fn flatten(root: &Entity) -> BTreeMap<Id, Entity> {
        let mut out = BTreeMap::new();
        Self::flatten_into(root.clone(), &mut out);
        out
    }

    fn flatten_into(mut entity: Entity, out: &mut BTreeMap<Id, Entity>) {
        let id = entity.meta_id();
        let nested = Self::detach_inline(&mut entity);

        if let Some(existing) = out.get(&id) {
            if *existing != entity {
                log::warn!(
                    "Conflicting entities share identity {} ('{}' vs '{}'); keeping the first",
                    id,
                    existing.name(),
                    entity.name()
                );
            }
            return;
        }

        // Record before descending so a path back to this entity stops here
        out.insert(id, entity);
        for child in nested {
            Self::flatten_into(child, out);
        }
    }

    /// Replace identity references below `root` with the entities they name,
    /// down to `depth`. The `parent` field is never filled.
    pub fn inline<L: Lookup + ?Sized>(root: &Entity, lookup: &L, depth: FillDepth) -> Result<Entity> {
        let mut path = HashSet::new();
        Self::fill(root.clone(), lookup, depth, &mut path)
    }

    fn fill<L: Lookup + ?Sized>(
        mut entity: Entity,
        lookup: &L,
        depth: FillDepth,
        path: &mut HashSet<Id>,
    ) -> Result<Entity> {
        if depth.is_exhausted() {
            return Ok(entity);
        }

        let id = entity.meta_id();
        path.insert(id);
        let next = depth.descend();

        match &mut entity {
            Entity::Node(node) => {
                for item in node.data.iter_mut() {
                    Self::fill_ref(item, lookup, next, path)?;
                }
                for child in node.children.iter_mut() {
                    Self::fill_ref(child, lookup, next, path)?;
                }
            }
            Entity::ParameterGroup(group) => {
                for item in group.parameters.iter_mut() {
                    Self::fill_ref(item, lookup, next, path)?;
                }
            }
            Entity::Parameter(_) => {}
        }

        path.remove(&id);
        Ok(entity)
    }

    fn fill_ref<T: RefTarget, L: Lookup + ?Sized>(
        slot: &mut Ref<T>,
        lookup: &L,
        depth: FillDepth,
        path: &mut HashSet<Id>,
    ) -> Result<()> {
        let id = slot.id();
        if path.contains(&id) {
            *slot = Ref::Id(id);
            return Ok(());
        }

        let entity: Entity = match std::mem::replace(slot, Ref::Id(id)) {
            Ref::Inline(value) => (*value).into(),
            Ref::Id(_) => lookup
                .lookup(&id)
                .cloned()
                .ok_or(CfgError::DanglingReference { id })?,
        };

        let filled = Self::fill(entity, lookup, depth, path)?;
        let value = T::try_from(filled).map_err(|other| CfgError::WrongKind {
            id,
            expected: T::EXPECTED,
            found: other.kind(),
        })?;
        *slot = Ref::inline(value);
        Ok(())
    }

    /// Reduce every reference field of `entity` to identities, discarding the
    /// inline copies. Used to prepare entities for storage.
    pub fn dereference_to_identity(entity: &mut Entity) {
        Self::detach_inline(entity);
    }

    /// Reduce reference fields to identities and hand back what was inline
    fn detach_inline(entity: &mut Entity) -> Vec<Entity> {
        let mut nested = Vec::new();
        match entity {
            Entity::Node(node) => {
                nested.extend(node.data.iter_mut().filter_map(Ref::take_inline).map(Entity::from));
                nested.extend(node.children.iter_mut().filter_map(Ref::take_inline).map(Entity::from));
                if let Some(parent) = node.parent.as_mut().and_then(Ref::take_inline) {
                    nested.push(Entity::from(parent));
                }
            }
            Entity::ParameterGroup(group) => {
                nested.extend(group.parameters.iter_mut().filter_map(Ref::take_inline).map(Entity::from));
            }
            Entity::Parameter(_) => {}
        }
        nested
    }

    /// Identities named by the reference fields of `entity`, in field order
    pub fn referenced_ids(entity: &Entity) -> Vec<Id> {
        match entity {
            Entity::Node(node) => node
                .data
                .iter()
                .map(Ref::id)
                .chain(node.children.iter().map(Ref::id))
                .chain(node.parent_id())
                .collect(),
            Entity::ParameterGroup(group) => group.parameters.iter().map(Ref::id).collect(),
            Entity::Parameter(_) => Vec::new(),
        }
    }

    /// Drop every reference to `id` held by `entity`. Returns whether anything changed.
    pub fn scrub(entity: &mut Entity, id: Id) -> bool {
        match entity {
            Entity::Node(node) => {
                let before = node.data.len() + node.children.len();
                node.data.retain(|item| item.id() != id);
                node.children.retain(|child| child.id() != id);
                let mut changed = before != node.data.len() + node.children.len();
                if node.parent_id() == Some(id) {
                    node.parent = None;
                    changed = true;
                }
                changed
            }
            Entity::ParameterGroup(group) => {
                let before = group.parameters.len();
                group.parameters.retain(|item| item.id() != id);
                before != group.parameters.len()
            }
            Entity::Parameter(_) => false,
        }
    }

    /// Kind of the entity behind `id`, if `lookup` knows it
    pub fn kind_of<L: Lookup + ?Sized>(lookup: &L, id: Id) -> Option<EntityKind> {
        lookup.lookup(&id).map(Entity::kind)
    }
}
