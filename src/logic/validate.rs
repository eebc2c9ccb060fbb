use serde::Serialize;

use crate::logic::{Lookup, Resolver};
use crate::model::{CfgData, Entity, EntityKind, Id, Identified, Node, Ref};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Entity holding the offending field
    pub entity: Id,
    pub field: &'static str,
    /// Identity the field refers to
    pub target: Id,
    pub problem: ValidationProblem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ValidationProblem {
    /// The referenced identity is not in the store
    Dangling,
    /// The referenced entity is of a kind the field does not accept
    KindMismatch { found: EntityKind },
    /// The parent pointer holds an entity instead of an identity
    InlineParent,
    /// The entity refers to itself
    SelfReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Checks that identity references on an entity point at entities of a kind
/// the field accepts. Inline values are already typed by the model, so only
/// their own nested references are inspected.
pub struct Validator;

impl Validator {
    pub fn validate<L: Lookup + ?Sized>(entry: &Entity, lookup: &L) -> ValidationReport {
        let mut report = ValidationReport::default();
        Self::check_entity(entry, lookup, &mut report);
        report
    }

    fn check_entity<L: Lookup + ?Sized>(entity: &Entity, lookup: &L, report: &mut ValidationReport) {
        let owner = entity.meta_id();
        match entity {
            Entity::Node(node) => {
                for item in &node.data {
                    Self::check_data(owner, "data", item, lookup, report);
                }
                for child in &node.children {
                    Self::check_node_ref(owner, "children", child, lookup, report);
                }
                if let Some(parent) = &node.parent {
                    if parent.is_inline() {
                        report.issues.push(ValidationIssue {
                            entity: owner,
                            field: "parent",
                            target: parent.id(),
                            problem: ValidationProblem::InlineParent,
                        });
                    } else {
                        Self::check_node_ref(owner, "parent", parent, lookup, report);
                    }
                }
            }
            Entity::ParameterGroup(group) => {
                for item in &group.parameters {
                    Self::check_data(owner, "parameters", item, lookup, report);
                }
            }
            Entity::Parameter(_) => {}
        }
    }

    fn check_data<L: Lookup + ?Sized>(
        owner: Id,
        field: &'static str,
        item: &Ref<CfgData>,
        lookup: &L,
        report: &mut ValidationReport,
    ) {
        match item {
            Ref::Inline(data) => {
                let nested: Entity = data.as_ref().clone().into();
                Self::check_self_reference(owner, field, item.id(), report);
                Self::check_entity(&nested, lookup, report);
            }
            Ref::Id(id) => Self::check_kind(
                owner,
                field,
                *id,
                &[EntityKind::Parameter, EntityKind::ParameterGroup],
                lookup,
                report,
            ),
        }
    }

    fn check_node_ref<L: Lookup + ?Sized>(
        owner: Id,
        field: &'static str,
        item: &Ref<Node>,
        lookup: &L,
        report: &mut ValidationReport,
    ) {
        match item {
            Ref::Inline(node) => {
                Self::check_self_reference(owner, field, item.id(), report);
                Self::check_entity(&Entity::Node(node.as_ref().clone()), lookup, report);
            }
            Ref::Id(id) => Self::check_kind(owner, field, *id, &[EntityKind::Node], lookup, report),
        }
    }

    fn check_kind<L: Lookup + ?Sized>(
        owner: Id,
        field: &'static str,
        target: Id,
        accepted: &[EntityKind],
        lookup: &L,
        report: &mut ValidationReport,
    ) {
        if target == owner {
            Self::check_self_reference(owner, field, target, report);
            return;
        }
        let problem = match Resolver::kind_of(lookup, target) {
            None => ValidationProblem::Dangling,
            Some(kind) if accepted.contains(&kind) => return,
            Some(found) => ValidationProblem::KindMismatch { found },
        };
        report.issues.push(ValidationIssue {
            entity: owner,
            field,
            target,
            problem,
        });
    }

    fn check_self_reference(owner: Id, field: &'static str, target: Id, report: &mut ValidationReport) {
        if target == owner {
            report.issues.push(ValidationIssue {
                entity: owner,
                field,
                target,
                problem: ValidationProblem::SelfReference,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Parameter, ParameterGroup};
    use std::collections::BTreeMap;

    fn store(entities: Vec<Entity>) -> BTreeMap<Id, Entity> {
        entities.into_iter().map(|e| (e.meta_id(), e)).collect()
    }

    #[test]
    fn test_valid_references_pass() {
        let parent = Node::new("parent");
        let param = Parameter::new("p", "P");
        let mut node = Node::new("node");
        node.parent = Some(Ref::Id(parent.meta.meta_id));
        node.data.push(Ref::Id(param.meta.meta_id));
        let lookup = store(vec![parent.into(), param.into()]);

        let report = Validator::validate(&Entity::from(node), &lookup);
        assert!(report.is_valid(), "{:?}", report);
    }

    #[test]
    fn test_kind_mismatch_reported() {
        let param = Parameter::new("p", "P");
        let mut node = Node::new("node");
        node.children.push(Ref::Id(param.meta.meta_id));
        let lookup = store(vec![param.clone().into()]);

        let report = Validator::validate(&Entity::from(node), &lookup);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].field, "children");
        assert_eq!(
            report.issues[0].problem,
            ValidationProblem::KindMismatch { found: EntityKind::Parameter }
        );
    }

    #[test]
    fn test_dangling_and_nested_issues() {
        let missing = crate::model::generate_id();
        let mut inner = ParameterGroup::new("inner");
        inner.push_id(missing);
        let mut outer = ParameterGroup::new("outer");
        outer.push(inner.clone());

        let report = Validator::validate(&Entity::from(outer), &BTreeMap::new());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].entity, inner.meta.meta_id);
        assert_eq!(report.issues[0].problem, ValidationProblem::Dangling);
    }

    #[test]
    fn test_inline_parent_and_self_reference() {
        let mut node = Node::new("loop");
        node.parent = Some(Ref::inline(Node::new("parent")));
        node.children.push(Ref::Id(node.meta.meta_id));

        let report = Validator::validate(&Entity::from(node), &BTreeMap::new());
        let problems: Vec<_> = report.issues.iter().map(|i| i.problem.clone()).collect();
        assert!(problems.contains(&ValidationProblem::SelfReference));
        assert!(problems.contains(&ValidationProblem::InlineParent));
    }
}
