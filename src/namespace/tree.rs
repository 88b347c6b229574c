//! Arena-Indexed Namespace Tree
//!
//! Stores every addressable entity as a node in a flat arena:
//! - Each node owns an ordered list of child ids (insertion order)
//! - Removing a node detaches its whole subtree
//! - Node ids are never reused, so an id held across mutation
//!   can go stale but never points at a different node

use std::mem;

use log::debug;

use crate::error::{EngineError, Result};

use super::uri::{is_valid_segment, Uri};

/// Stable identity of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Entry<T> {
    segment: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    payload: T,
}

/// Hierarchical key space mapping URIs to payloads.
///
/// The root is implicit and carries no payload. Nodes live in an arena
/// indexed by [`NodeId`]; removing a node empties its slot but never
/// reuses it, so ids stay unique for the life of the namespace and the
/// arena grows with every insert.
#[derive(Debug, Clone)]
pub struct Namespace<T> {
    entries: Vec<Option<Entry<T>>>,
    roots: Vec<NodeId>,
    len: usize,
}

impl<T> Namespace<T> {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            roots: Vec::new(),
            len: 0,
        }
    }

    /// Number of live nodes (the root is not counted).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entry(&self, id: NodeId) -> Option<&Entry<T>> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry<T>> {
        self.entries.get_mut(id.0).and_then(Option::as_mut)
    }

    fn child_list(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self.entry(id).map(|e| e.children.as_slice()).unwrap_or(&[]),
        }
    }

    fn find_child(&self, parent: Option<NodeId>, segment: &str) -> Option<NodeId> {
        self.child_list(parent)
            .iter()
            .copied()
            .find(|id| self.entry(*id).map_or(false, |e| e.segment == segment))
    }

    /// Walks `uri` from the root. The root itself resolves to `None`.
    fn walk(&self, uri: &Uri) -> Result<Option<NodeId>> {
        let mut current = None;
        for segment in uri.segments() {
            match self.find_child(current, segment) {
                Some(id) => current = Some(id),
                None => {
                    return Err(EngineError::invalid_uri(
                        uri,
                        format!("segment '{}' not found", segment),
                    ))
                }
            }
        }
        Ok(current)
    }

    fn require(&self, uri: &Uri) -> Result<NodeId> {
        self.walk(uri)?
            .ok_or_else(|| EngineError::invalid_uri(uri, "the namespace root has no payload"))
    }

    /// Inserts `payload` at `uri`.
    ///
    /// Fails with `InvalidUri` if `uri` is the root, if any ancestor is
    /// missing, or if the terminal segment already exists.
    pub fn insert(&mut self, uri: &Uri, payload: T) -> Result<NodeId> {
        let (parent_uri, segment) = match (uri.parent(), uri.last()) {
            (Some(parent), Some(last)) => (parent, last.to_string()),
            _ => return Err(EngineError::invalid_uri(uri, "cannot insert at the namespace root")),
        };

        let parent = self.walk(&parent_uri)?;
        if self.find_child(parent, &segment).is_some() {
            return Err(EngineError::invalid_uri(uri, "a sibling with this name already exists"));
        }

        let id = NodeId(self.entries.len());
        self.entries.push(Some(Entry {
            segment,
            parent,
            children: Vec::new(),
            payload,
        }));

        match parent {
            None => self.roots.push(id),
            Some(parent_id) => {
                if let Some(entry) = self.entry_mut(parent_id) {
                    entry.children.push(id);
                }
            }
        }
        self.len += 1;

        Ok(id)
    }

    /// Returns the payload at `uri`.
    pub fn lookup(&self, uri: &Uri) -> Result<&T> {
        let id = self.require(uri)?;
        self.get(id)
            .ok_or_else(|| EngineError::invalid_uri(uri, "node was removed"))
    }

    /// Returns the payload at `uri` for mutation.
    pub fn lookup_mut(&mut self, uri: &Uri) -> Result<&mut T> {
        let id = self.require(uri)?;
        self.get_mut(id)
            .ok_or_else(|| EngineError::invalid_uri(uri, "node was removed"))
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.entry(id).map(|e| &e.payload)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.entry_mut(id).map(|e| &mut e.payload)
    }

    /// Id of the node at `uri`, or `None` for the root or a missing node.
    pub fn id_of(&self, uri: &Uri) -> Option<NodeId> {
        self.walk(uri).ok().flatten()
    }

    /// Parent id of a live node. Top-level nodes have no parent id.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|e| e.parent)
    }

    /// Rebuilds the URI of a live node.
    pub fn uri_of(&self, id: NodeId) -> Option<Uri> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.entry(node)?;
            segments.push(entry.segment.clone());
            current = entry.parent;
        }
        segments.reverse();
        Some(Uri::from_trusted(segments))
    }

    /// Replaces the payload at `uri` in place, returning the old payload.
    ///
    /// The node keeps its URI, id and children.
    pub fn replace(&mut self, uri: &Uri, payload: T) -> Result<T> {
        let slot = self.lookup_mut(uri)?;
        Ok(mem::replace(slot, payload))
    }

    /// Detaches the subtree at `uri` and returns its payloads in pre-order.
    pub fn remove(&mut self, uri: &Uri) -> Result<Vec<(Uri, T)>> {
        let id = self
            .walk(uri)?
            .ok_or_else(|| EngineError::invalid_uri(uri, "cannot remove the namespace root"))?;

        let mut order = Vec::new();
        self.collect_preorder(id, &mut order);
        let uris: Vec<Uri> = order.iter().filter_map(|node| self.uri_of(*node)).collect();

        match self.parent_of(id) {
            None => self.roots.retain(|child| *child != id),
            Some(parent_id) => {
                if let Some(entry) = self.entry_mut(parent_id) {
                    entry.children.retain(|child| *child != id);
                }
            }
        }

        let mut removed = Vec::with_capacity(order.len());
        for (node, node_uri) in order.into_iter().zip(uris) {
            if let Some(entry) = self.entries.get_mut(node.0).and_then(Option::take) {
                removed.push((node_uri, entry.payload));
            }
        }
        self.len -= removed.len();

        debug!("Removed '{}' ({} nodes)", uri, removed.len());
        Ok(removed)
    }

    fn collect_preorder(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        let children = self
            .entry(id)
            .map(|e| e.children.clone())
            .unwrap_or_default();
        for child in children {
            self.collect_preorder(child, out);
        }
    }

    /// Ordered names of the immediate children of `uri` (root allowed).
    pub fn children(&self, uri: &Uri) -> Result<Vec<String>> {
        let parent = self.walk(uri)?;
        Ok(self
            .child_list(parent)
            .iter()
            .filter_map(|id| self.entry(*id).map(|e| e.segment.clone()))
            .collect())
    }

    /// Ordered ids of the immediate children of `uri` (root allowed).
    pub fn child_ids(&self, uri: &Uri) -> Result<Vec<NodeId>> {
        let parent = self.walk(uri)?;
        Ok(self.child_list(parent).to_vec())
    }

    /// True if `uri` names the root or a live node.
    pub fn exists(&self, uri: &Uri) -> bool {
        self.walk(uri).is_ok()
    }

    /// True if `text` is a well-formed URI whose ancestors all exist,
    /// i.e. it either names a live node or could be inserted.
    pub fn is_valid(&self, text: &str) -> bool {
        match Uri::parse(text) {
            Ok(uri) => uri.parent().map_or(true, |parent| self.exists(&parent)),
            Err(_) => false,
        }
    }

    /// Generates a child name under `parent` that is not yet taken.
    ///
    /// Returns `prefix` itself if free, otherwise the first free
    /// `prefix_1`, `prefix_2`, ...
    pub fn unique_name(&self, parent: &Uri, prefix: &str) -> Result<String> {
        if !is_valid_segment(prefix) {
            return Err(EngineError::invalid_uri(
                prefix,
                "name prefix is not a valid segment",
            ));
        }
        let parent_id = self.walk(parent)?;
        if self.find_child(parent_id, prefix).is_none() {
            return Ok(prefix.to_string());
        }

        let mut index = 1usize;
        loop {
            let candidate = format!("{}_{}", prefix, index);
            if self.find_child(parent_id, &candidate).is_none() {
                return Ok(candidate);
            }
            index += 1;
        }
    }

    /// Live payloads in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (NodeId(i), &e.payload)))
    }

    /// Live payloads in arena order, mutable.
    pub fn payloads_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries
            .iter_mut()
            .filter_map(|e| e.as_mut().map(|e| &mut e.payload))
    }
}

impl<T> Default for Namespace<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(text: &str) -> Uri {
        Uri::parse(text).unwrap()
    }

    fn sample() -> Namespace<u32> {
        let mut ns = Namespace::new();
        ns.insert(&uri("a"), 1).unwrap();
        ns.insert(&uri("a.x"), 2).unwrap();
        ns.insert(&uri("a.y"), 3).unwrap();
        ns.insert(&uri("a.x.deep"), 4).unwrap();
        ns.insert(&uri("b"), 5).unwrap();
        ns
    }

    #[test]
    fn test_insert_and_lookup() {
        let ns = sample();
        assert_eq!(ns.len(), 5);
        assert_eq!(*ns.lookup(&uri("a.x.deep")).unwrap(), 4);
        assert_eq!(*ns.lookup(&uri("b")).unwrap(), 5);
    }

    #[test]
    fn test_insert_requires_ancestors() {
        let mut ns: Namespace<u32> = Namespace::new();
        let err = ns.insert(&uri("missing.child"), 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidUri { .. }));
        assert!(ns.is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicates_and_root() {
        let mut ns = sample();
        assert!(ns.insert(&uri("a.x"), 9).is_err());
        assert!(ns.insert(&Uri::root(), 9).is_err());
        assert_eq!(*ns.lookup(&uri("a.x")).unwrap(), 2);
    }

    #[test]
    fn test_lookup_missing_segment() {
        let ns = sample();
        let err = ns.lookup(&uri("a.z")).unwrap_err();
        assert!(err.to_string().contains("'z'"));
        assert!(ns.lookup(&Uri::root()).is_err());
    }

    #[test]
    fn test_children_are_ordered() {
        let ns = sample();
        assert_eq!(ns.children(&Uri::root()).unwrap(), vec!["a", "b"]);
        assert_eq!(ns.children(&uri("a")).unwrap(), vec!["x", "y"]);
        assert!(ns.children(&uri("a.x.deep")).unwrap().is_empty());
    }

    #[test]
    fn test_remove_returns_subtree_preorder() {
        let mut ns = sample();
        let removed = ns.remove(&uri("a")).unwrap();

        let uris: Vec<String> = removed.iter().map(|(u, _)| u.to_string()).collect();
        assert_eq!(uris, vec!["a", "a.x", "a.x.deep", "a.y"]);
        assert_eq!(ns.len(), 1);
        assert!(!ns.exists(&uri("a")));
        assert!(!ns.exists(&uri("a.x.deep")));
        assert_eq!(ns.children(&Uri::root()).unwrap(), vec!["b"]);
    }

    #[test]
    fn test_remove_root_fails() {
        let mut ns = sample();
        assert!(ns.remove(&Uri::root()).is_err());
        assert_eq!(ns.len(), 5);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut ns = sample();
        let old = ns.id_of(&uri("b")).unwrap();
        ns.remove(&uri("b")).unwrap();
        let new = ns.insert(&uri("b"), 6).unwrap();

        assert_ne!(old, new);
        assert!(ns.get(old).is_none());
        assert_eq!(ns.get(new), Some(&6));
    }

    #[test]
    fn test_replace_keeps_identity() {
        let mut ns = sample();
        let id = ns.id_of(&uri("a.x")).unwrap();
        let old = ns.replace(&uri("a.x"), 20).unwrap();

        assert_eq!(old, 2);
        assert_eq!(ns.id_of(&uri("a.x")), Some(id));
        assert_eq!(ns.children(&uri("a.x")).unwrap(), vec!["deep"]);
    }

    #[test]
    fn test_uri_of_round_trips() {
        let ns = sample();
        let id = ns.id_of(&uri("a.x.deep")).unwrap();
        assert_eq!(ns.uri_of(id).unwrap().to_string(), "a.x.deep");
    }

    #[test]
    fn test_unique_name() {
        let mut ns = sample();
        assert_eq!(ns.unique_name(&Uri::root(), "c").unwrap(), "c");
        assert_eq!(ns.unique_name(&Uri::root(), "a").unwrap(), "a_1");

        ns.insert(&uri("a_1"), 7).unwrap();
        assert_eq!(ns.unique_name(&Uri::root(), "a").unwrap(), "a_2");
        assert_eq!(ns.unique_name(&uri("a"), "x").unwrap(), "x_1");
        assert!(ns.unique_name(&Uri::root(), "bad name").is_err());
    }

    #[test]
    fn test_is_valid_and_exists() {
        let ns = sample();
        assert!(ns.is_valid("a.x"));
        assert!(ns.is_valid("a.new"));
        assert!(!ns.is_valid("missing.new"));
        assert!(!ns.is_valid("a..x"));

        assert!(ns.exists(&Uri::root()));
        assert!(ns.exists(&uri("a.y")));
        assert!(!ns.exists(&uri("a.q")));
    }

    #[test]
    fn test_payloads_mut() {
        let mut ns = sample();
        for value in ns.payloads_mut() {
            *value *= 10;
        }
        assert_eq!(*ns.lookup(&uri("a.x.deep")).unwrap(), 40);
        assert_eq!(ns.iter().count(), 5);
    }
}
