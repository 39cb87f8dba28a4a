//! Requirement structure trees
//!
//! A structure is an ordered mapping of names to nodes. A node is either a
//! category holding more nodes or a requirement leaf. Leaves start out
//! unseeded and receive an identity when the structure is seeded (see
//! [`crate::identity::seed_structure`]).
//!
//! Key order is document order: it is what [`leaf_names`] and
//! [`requirement_paths`] enumerate, and it decides which requirement wins when
//! a bare name matches more than one leaf.

use eyre::{Result, WrapErr};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a requirement structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureNode {
    /// A named group of requirements and sub-categories.
    Category(Structure),
    /// A requirement leaf, carrying its identity once seeded.
    Requirement(Option<String>),
}

impl StructureNode {
    /// Whether this node is a requirement. An empty category (`{}` on disk)
    /// is a requirement that has not been seeded yet.
    pub fn is_leaf(&self) -> bool {
        match self {
            Self::Requirement(_) => true,
            Self::Category(children) => children.is_empty(),
        }
    }

    /// The identity of a seeded requirement.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Requirement(Some(id)) => Some(id),
            _ => None,
        }
    }

    /// The children of a non-empty category.
    pub fn as_category(&self) -> Option<&Structure> {
        match self {
            Self::Category(children) if !children.is_empty() => Some(children),
            _ => None,
        }
    }
}

/// Ordered name → node mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    entries: Vec<(String, StructureNode)>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a structure from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).wrap_err("Failed to parse requirement structure JSON")
    }

    /// Builder: append an unseeded requirement.
    pub fn with_requirement(mut self, name: impl Into<String>) -> Self {
        self.insert(name, StructureNode::Requirement(None));
        self
    }

    /// Builder: append a category.
    pub fn with_category(mut self, name: impl Into<String>, children: Structure) -> Self {
        self.insert(name, StructureNode::Category(children));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&StructureNode> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StructureNode> {
        self.position(name).map(|i| &mut self.entries[i].1)
    }

    /// Insert a node. An existing key keeps its position and has its node
    /// replaced; the previous node is returned.
    pub fn insert(&mut self, name: impl Into<String>, node: StructureNode) -> Option<StructureNode> {
        let name = name.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, node)),
            None => {
                self.entries.push((name, node));
                None
            }
        }
    }

    /// Get the node for `name`, inserting the result of `f` if it is absent.
    pub fn entry_or_insert_with(
        &mut self,
        name: &str,
        f: impl FnOnce() -> StructureNode,
    ) -> &mut StructureNode {
        let index = match self.position(name) {
            Some(i) => i,
            None => {
                self.entries.push((name.to_string(), f()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructureNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut StructureNode)> {
        self.entries
            .iter_mut()
            .map(|(name, node)| (name.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == name)
    }
}

impl IntoIterator for Structure {
    type Item = (String, StructureNode);
    type IntoIter = std::vec::IntoIter<(String, StructureNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, StructureNode)> for Structure {
    fn from_iter<I: IntoIterator<Item = (String, StructureNode)>>(iter: I) -> Self {
        let mut structure = Structure::new();
        for (name, node) in iter {
            structure.insert(name, node);
        }
        structure
    }
}

/// Collapse internal whitespace and trim, so differently-spaced spellings of
/// a name collide.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize every key of `structure` without seeding it. Names that collide
/// after normalization are merged as [`merge_structure`] does, so a category
/// wins over a requirement of the same name.
pub fn normalize_keys(structure: Structure) -> Structure {
    let mut normalized = Structure::new();
    for (name, node) in structure {
        let node = match node {
            StructureNode::Category(children) => StructureNode::Category(normalize_keys(children)),
            leaf => leaf,
        };
        merge_structure(
            Structure::from_iter([(normalize_name(&name), node)]),
            &mut normalized,
        );
    }
    normalized
}

/// What a path addresses inside a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch<'a> {
    /// The root or a non-empty category.
    Category(&'a Structure),
    /// A requirement leaf, with its identity when seeded.
    Requirement(Option<&'a str>),
}

impl<'a> Branch<'a> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Branch::Requirement(_))
    }

    pub fn as_category(&self) -> Option<&'a Structure> {
        match self {
            Branch::Category(children) => Some(children),
            Branch::Requirement(_) => None,
        }
    }
}

/// Walk `path` without creating anything. An empty path addresses the root.
pub fn get_branch<'a, S: AsRef<str>>(structure: &'a Structure, path: &[S]) -> Option<Branch<'a>> {
    let Some((last, parents)) = path.split_last() else {
        return Some(Branch::Category(structure));
    };

    let mut current = structure;
    for segment in parents {
        current = current.get(segment.as_ref())?.as_category()?;
    }

    let node = current.get(last.as_ref())?;
    Some(match node {
        StructureNode::Category(children) if !children.is_empty() => Branch::Category(children),
        StructureNode::Category(_) => Branch::Requirement(None),
        StructureNode::Requirement(id) => Branch::Requirement(id.as_deref()),
    })
}

/// Walk `path`, creating empty categories as needed, and return the children
/// of the terminal category.
///
/// Unseeded leaves on the way are turned into categories. Returns `None` when
/// a seeded requirement sits on the path.
pub fn add_branch<'a, S: AsRef<str>>(
    structure: &'a mut Structure,
    path: &[S],
) -> Option<&'a mut Structure> {
    let mut current = structure;
    for segment in path {
        let node = current.entry_or_insert_with(segment.as_ref(), || {
            StructureNode::Category(Structure::new())
        });
        if let StructureNode::Requirement(None) = node {
            *node = StructureNode::Category(Structure::new());
        }
        match node {
            StructureNode::Category(children) => current = children,
            StructureNode::Requirement(_) => return None,
        }
    }
    Some(current)
}

/// Union `source` into `target` in place.
///
/// Keys missing from `target` are moved over as-is. Keys present on both
/// sides are merged recursively; shape disagreements are not reported here
/// and keep the target's node (see
/// [`crate::features::merge_feature_structure`] for the reporting variant).
pub fn merge_structure(source: Structure, target: &mut Structure) {
    for (name, incoming) in source {
        match target.get_mut(&name) {
            None => {
                target.insert(name, incoming);
            }
            Some(StructureNode::Category(existing)) => {
                if let StructureNode::Category(children) = incoming {
                    merge_structure(children, existing);
                }
            }
            Some(existing @ StructureNode::Requirement(None)) => {
                if incoming.as_category().is_some() {
                    *existing = incoming;
                }
            }
            Some(StructureNode::Requirement(Some(_))) => {}
        }
    }
}

/// Deep-copy a structure. Leaves of the copy are always unseeded.
pub fn clone_structure(source: &Structure) -> Structure {
    let mut target = Structure::new();
    clone_structure_into(source, &mut target);
    target
}

/// Deep-copy `source` into `target` without overwriting anything `target`
/// already holds.
pub fn clone_structure_into(source: &Structure, target: &mut Structure) {
    for (name, node) in source.iter() {
        match node.as_category() {
            None => {
                if !target.contains_key(name) {
                    target.insert(name, StructureNode::Requirement(None));
                }
            }
            Some(children) => match target.get_mut(name) {
                None => {
                    target.insert(name, StructureNode::Category(clone_structure(children)));
                }
                Some(StructureNode::Category(existing)) => clone_structure_into(children, existing),
                Some(StructureNode::Requirement(_)) => {}
            },
        }
    }
}

/// Number of category levels, counting the root. A structure with no nested
/// categories has depth 1.
pub fn depth(structure: &Structure) -> usize {
    1 + structure
        .iter()
        .filter_map(|(_, node)| node.as_category())
        .map(depth)
        .max()
        .unwrap_or(0)
}

/// All requirement names, in document order.
pub fn leaf_names(structure: &Structure) -> Vec<String> {
    let mut names = Vec::new();
    collect_leaf_names(structure, &mut names);
    names
}

fn collect_leaf_names(structure: &Structure, names: &mut Vec<String>) {
    for (name, node) in structure.iter() {
        match node.as_category() {
            Some(children) => collect_leaf_names(children, names),
            None => names.push(name.to_string()),
        }
    }
}

/// The full path of every requirement, seeded or not, in document order.
pub fn leaf_paths(structure: &Structure) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    collect_leaf_paths(structure, &mut Vec::new(), &mut paths);
    paths
}

fn collect_leaf_paths(structure: &Structure, prefix: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    for (name, node) in structure.iter() {
        prefix.push(name.to_string());
        match node.as_category() {
            Some(children) => collect_leaf_paths(children, prefix, paths),
            None => paths.push(prefix.clone()),
        }
        prefix.pop();
    }
}

/// A seeded requirement and the names leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementPath {
    pub id: String,
    pub path: Vec<String>,
}

impl RequirementPath {
    /// The requirement's own name (last path segment).
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }
}

/// Every seeded requirement with its full path, in document order. Unseeded
/// leaves are skipped.
pub fn requirement_paths(structure: &Structure) -> Vec<RequirementPath> {
    let mut paths = Vec::new();
    let mut prefix = Vec::new();
    collect_requirement_paths(structure, &mut prefix, &mut paths);
    paths
}

fn collect_requirement_paths(
    structure: &Structure,
    prefix: &mut Vec<String>,
    paths: &mut Vec<RequirementPath>,
) {
    for (name, node) in structure.iter() {
        prefix.push(name.to_string());
        match node {
            StructureNode::Category(children) => {
                collect_requirement_paths(children, prefix, paths)
            }
            StructureNode::Requirement(Some(id)) => paths.push(RequirementPath {
                id: id.clone(),
                path: prefix.clone(),
            }),
            StructureNode::Requirement(None) => {}
        }
        prefix.pop();
    }
}

// On disk, a requirement is `{}` or `null` and a category is a non-empty
// object. A string leaf is an identity from an earlier process; identities
// are not carried across runs, so it reads back as an unseeded requirement.

impl Serialize for Structure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, node) in &self.entries {
            map.serialize_entry(name, node)?;
        }
        map.end()
    }
}

impl Serialize for StructureNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StructureNode::Category(children) => children.serialize(serializer),
            StructureNode::Requirement(Some(id)) => serializer.serialize_str(id),
            StructureNode::Requirement(None) => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

fn read_entries<'de, A: MapAccess<'de>>(mut map: A) -> Result<Structure, A::Error> {
    let mut structure = Structure::new();
    while let Some((name, node)) = map.next_entry::<String, StructureNode>()? {
        structure.insert(name, node);
    }
    Ok(structure)
}

struct StructureVisitor;

impl<'de> Visitor<'de> for StructureVisitor {
    type Value = Structure;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a requirement structure object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Structure, E> {
        Ok(Structure::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Structure, E> {
        Ok(Structure::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Structure, A::Error> {
        read_entries(map)
    }
}

impl<'de> Deserialize<'de> for Structure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StructureVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = StructureNode;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a requirement (`{}`, null or a string) or a category object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<StructureNode, E> {
        Ok(StructureNode::Requirement(None))
    }

    fn visit_none<E: de::Error>(self) -> Result<StructureNode, E> {
        Ok(StructureNode::Requirement(None))
    }

    fn visit_str<E: de::Error>(self, _stale: &str) -> Result<StructureNode, E> {
        Ok(StructureNode::Requirement(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<StructureNode, A::Error> {
        let children = read_entries(map)?;
        if children.is_empty() {
            Ok(StructureNode::Requirement(None))
        } else {
            Ok(StructureNode::Category(children))
        }
    }
}

impl<'de> Deserialize<'de> for StructureNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}
