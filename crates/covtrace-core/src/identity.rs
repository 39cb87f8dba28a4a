//! Requirement identities and trace resolution
//!
//! Every requirement leaf gets an opaque identity (`requirement-00000001`,
//! ...) the first time it is seen. Trace records name requirements by name,
//! by path, or by a name relative to a category; the functions here turn
//! those references into identities inside a seeded structure, creating
//! structure for requirements nobody declared.

use crate::recording::RequirementRef;
use crate::structure::{
    Branch, Structure, StructureNode, add_branch, get_branch, normalize_name, requirement_paths,
};
use thiserror::Error;
use tracing::warn;

/// Hands out requirement identities. Never reuses or renumbers.
#[derive(Debug, Clone, Default)]
pub struct IdentityAllocator {
    last: u64,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> String {
        self.last += 1;
        format!("requirement-{:08}", self.last)
    }

    /// How many identities have been handed out so far.
    pub fn allocated(&self) -> u64 {
        self.last
    }
}

/// Why a reference could not be turned into a requirement identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("cannot resolve an empty requirement path")]
    EmptyPath,
    #[error("`{}` is a category, not a requirement", .path.join(" / "))]
    CategoryAsRequirement { path: Vec<String> },
    #[error("`{}` is a requirement and cannot contain other requirements", .path.join(" / "))]
    RequirementAsCategory { path: Vec<String> },
}

/// Normalize every key of a freshly parsed structure and give every unseeded
/// leaf a new identity.
///
/// Seeded leaves keep their identity, so calling this again on a seeded
/// structure only seeds leaves added since.
pub fn seed_structure(structure: &mut Structure, identities: &mut IdentityAllocator) {
    let entries = std::mem::take(structure);
    for (name, node) in entries {
        let name = normalize_name(&name);
        let node = match node {
            StructureNode::Category(mut children) if !children.is_empty() => {
                seed_structure(&mut children, identities);
                StructureNode::Category(children)
            }
            StructureNode::Requirement(Some(id)) => StructureNode::Requirement(Some(id)),
            _ => StructureNode::Requirement(Some(identities.allocate())),
        };

        merge_collision(name, node, structure, &mut Vec::new());
    }
}

/// Insert a seeded node whose name may already be taken after normalization.
/// Categories merge, and a category replaces a leaf of the same name.
fn merge_collision(name: String, node: StructureNode, target: &mut Structure, path: &mut Vec<String>) {
    path.push(name.clone());
    match target.get_mut(&name) {
        None => {
            target.insert(name, node);
        }
        Some(existing) => match (existing.is_leaf(), node) {
            (false, StructureNode::Category(children)) if !children.is_empty() => {
                if let StructureNode::Category(existing) = existing {
                    for (child, child_node) in children {
                        merge_collision(child, child_node, existing, path);
                    }
                }
            }
            (true, node) if !node.is_leaf() => {
                warn!(
                    path = %path.join(" / "),
                    "requirement and category collide after whitespace normalization, keeping the category"
                );
                *existing = node;
            }
            (false, _) => warn!(
                path = %path.join(" / "),
                "category and requirement collide after whitespace normalization, keeping the category"
            ),
            (true, _) => {}
        },
    }
    path.pop();
}

/// Find the first seeded requirement named `name`, in document order.
pub fn find_by_name(structure: &Structure, name: &str) -> Option<String> {
    requirement_paths(structure)
        .into_iter()
        .find(|candidate| candidate.name() == name)
        .map(|candidate| candidate.id)
}

/// Resolve a bare requirement name.
///
/// The first requirement (in document order) whose own name matches wins,
/// even when several categories hold a requirement of that name. An unknown
/// name is registered as a new top-level requirement.
pub fn resolve_by_name(
    name: &str,
    structure: &mut Structure,
    identities: &mut IdentityAllocator,
) -> Result<String, ResolveError> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(ResolveError::EmptyPath);
    }
    if let Some(id) = find_by_name(structure, &name) {
        return Ok(id);
    }
    resolve_by_path(&[name], structure, identities)
}

/// Resolve a full requirement path, creating categories and the requirement
/// itself when they do not exist yet.
pub fn resolve_by_path<S: AsRef<str>>(
    path: &[S],
    structure: &mut Structure,
    identities: &mut IdentityAllocator,
) -> Result<String, ResolveError> {
    let path: Vec<String> = path.iter().map(|s| normalize_name(s.as_ref())).collect();
    let Some((last, parents)) = path.split_last() else {
        return Err(ResolveError::EmptyPath);
    };

    let Some(parent) = add_branch(structure, parents) else {
        return Err(ResolveError::RequirementAsCategory {
            path: parents.to_vec(),
        });
    };

    let node = parent.entry_or_insert_with(last, || StructureNode::Requirement(None));
    if let Some(id) = node.identity() {
        return Ok(id.to_string());
    }
    if node.as_category().is_some() {
        return Err(ResolveError::CategoryAsRequirement { path: path.clone() });
    }

    let id = identities.allocate();
    *node = StructureNode::Requirement(Some(id.clone()));
    Ok(id)
}

/// Resolve a trace record's reference, relative to its category scope.
///
/// Inside a category, a bare name is looked up within that category's
/// subtree first, so same-named requirements in different categories stay
/// apart. Paths are always taken relative to the category.
pub fn resolve_reference(
    reference: &RequirementRef,
    category: &[String],
    structure: &mut Structure,
    identities: &mut IdentityAllocator,
) -> Result<String, ResolveError> {
    let category: Vec<String> = category.iter().map(|s| normalize_name(s)).collect();

    match reference {
        RequirementRef::Name(name) if category.is_empty() => {
            resolve_by_name(name, structure, identities)
        }
        RequirementRef::Name(name) => {
            let name = normalize_name(name);
            if name.is_empty() {
                return Err(ResolveError::EmptyPath);
            }
            if let Some(Branch::Category(subtree)) = get_branch(structure, &category) {
                if let Some(id) = find_by_name(subtree, &name) {
                    return Ok(id);
                }
            }
            let mut path = category;
            path.push(name);
            resolve_by_path(&path, structure, identities)
        }
        RequirementRef::Path(path) => {
            let full = [category.as_slice(), path.as_slice()].concat();
            resolve_by_path(&full, structure, identities)
        }
    }
}

/// Check that `path` could address a requirement: it must not name a
/// category, and nothing on the way to it may be a requirement. Paths that do
/// not exist yet are fine.
pub fn validate_path<S: AsRef<str>>(structure: &Structure, path: &[S]) -> Result<(), ResolveError> {
    let path: Vec<String> = path.iter().map(|s| normalize_name(s.as_ref())).collect();
    if path.is_empty() {
        return Err(ResolveError::EmptyPath);
    }

    let mut current = structure;
    for (depth, segment) in path.iter().enumerate() {
        let Some(node) = current.get(segment) else {
            return Ok(());
        };
        let is_last = depth + 1 == path.len();
        match node.as_category() {
            Some(_) if is_last => {
                return Err(ResolveError::CategoryAsRequirement { path: path.clone() });
            }
            Some(children) => current = children,
            None if is_last => return Ok(()),
            None => {
                return Err(ResolveError::RequirementAsCategory {
                    path: path[..=depth].to_vec(),
                });
            }
        }
    }
    Ok(())
}
