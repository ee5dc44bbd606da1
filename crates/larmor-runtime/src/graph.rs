#![forbid(unsafe_code)]

//! Boundary to the underlying data graph.
//!
//! The storage engine is an external collaborator: the framework sees it as
//! an opaque graph of elements addressed by [`DataId`], with a class tag, a
//! local key under its parent, and a flat set of tracked attributes. The
//! [`DataGraph`] trait is the full contract the lifecycle framework needs:
//! structural create/restore/delete/rename plus addressable attribute
//! reads and writes so the change funnel can build inverse actions.
//!
//! [`MemoryGraph`] is the in-crate reference implementation backing the test
//! suite and small scripting sessions.

use ahash::AHashMap;
use larmor_model::{AttrValue, TypeCode};

/// Opaque identity of one element in the underlying graph.
pub type DataId = u64;

/// Contract the framework requires of the storage engine.
///
/// `restore_element` recreates a previously deleted element *under its old
/// id*; the undo log depends on data identities staying stable across a
/// delete/undelete cycle so later recorded actions keep addressing the same
/// element.
pub trait DataGraph {
    /// Create a new element and return its fresh identity.
    fn create_element(&mut self, parent: Option<DataId>, class: &TypeCode, key: &str) -> DataId;

    /// Recreate a deleted element under its original identity.
    fn restore_element(&mut self, id: DataId, parent: Option<DataId>, class: &TypeCode, key: &str);

    /// Destroy an element. Returns `false` if it did not exist.
    fn delete_element(&mut self, id: DataId) -> bool;

    /// Change an element's local key.
    fn rename_element(&mut self, id: DataId, key: &str);

    /// True when the element exists.
    fn contains(&self, id: DataId) -> bool;

    /// The element's current local key.
    fn element_key(&self, id: DataId) -> Option<String>;

    /// The element's class tag.
    fn element_class(&self, id: DataId) -> Option<TypeCode>;

    /// The element's parent, if it exists (`Some(None)` for a root).
    fn element_parent(&self, id: DataId) -> Option<Option<DataId>>;

    /// Read one tracked attribute; unset attributes read as
    /// [`AttrValue::None`].
    fn read_attr(&self, id: DataId, attr: &str) -> AttrValue;

    /// Write one tracked attribute; writing [`AttrValue::None`] clears it.
    fn write_attr(&mut self, id: DataId, attr: &str, value: AttrValue);

    /// Snapshot every set attribute, for delete-undo capture.
    fn attr_snapshot(&self, id: DataId) -> Vec<(String, AttrValue)>;
}

struct ElementRecord {
    parent: Option<DataId>,
    class: TypeCode,
    key: String,
    attrs: AHashMap<String, AttrValue>,
}

/// In-memory reference implementation of [`DataGraph`].
#[derive(Default)]
pub struct MemoryGraph {
    elements: AHashMap<DataId, ElementRecord>,
    next_id: DataId,
}

impl MemoryGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when no elements exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl DataGraph for MemoryGraph {
    fn create_element(&mut self, parent: Option<DataId>, class: &TypeCode, key: &str) -> DataId {
        let id = self.next_id;
        self.next_id += 1;
        self.elements.insert(
            id,
            ElementRecord {
                parent,
                class: class.clone(),
                key: key.to_string(),
                attrs: AHashMap::new(),
            },
        );
        id
    }

    fn restore_element(&mut self, id: DataId, parent: Option<DataId>, class: &TypeCode, key: &str) {
        debug_assert!(
            !self.elements.contains_key(&id),
            "restore over a live element"
        );
        self.next_id = self.next_id.max(id + 1);
        self.elements.insert(
            id,
            ElementRecord {
                parent,
                class: class.clone(),
                key: key.to_string(),
                attrs: AHashMap::new(),
            },
        );
    }

    fn delete_element(&mut self, id: DataId) -> bool {
        self.elements.remove(&id).is_some()
    }

    fn rename_element(&mut self, id: DataId, key: &str) {
        if let Some(element) = self.elements.get_mut(&id) {
            element.key = key.to_string();
        }
    }

    fn contains(&self, id: DataId) -> bool {
        self.elements.contains_key(&id)
    }

    fn element_key(&self, id: DataId) -> Option<String> {
        self.elements.get(&id).map(|e| e.key.clone())
    }

    fn element_class(&self, id: DataId) -> Option<TypeCode> {
        self.elements.get(&id).map(|e| e.class.clone())
    }

    fn element_parent(&self, id: DataId) -> Option<Option<DataId>> {
        self.elements.get(&id).map(|e| e.parent)
    }

    fn read_attr(&self, id: DataId, attr: &str) -> AttrValue {
        self.elements
            .get(&id)
            .and_then(|e| e.attrs.get(attr).cloned())
            .unwrap_or(AttrValue::None)
    }

    fn write_attr(&mut self, id: DataId, attr: &str, value: AttrValue) {
        let Some(element) = self.elements.get_mut(&id) else {
            return;
        };
        if value.is_none() {
            element.attrs.remove(attr);
        } else {
            element.attrs.insert(attr.to_string(), value);
        }
    }

    fn attr_snapshot(&self, id: DataId) -> Vec<(String, AttrValue)> {
        let Some(element) = self.elements.get(&id) else {
            return Vec::new();
        };
        let mut attrs: Vec<_> = element
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        attrs.sort_by(|a, b| a.0.cmp(&b.0));
        attrs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(code: &str) -> TypeCode {
        TypeCode::new(code).unwrap()
    }

    #[test]
    fn create_and_read_back() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_element(None, &tc("PR"), "test");
        let child = graph.create_element(Some(root), &tc("SP"), "hsqc");

        assert_eq!(graph.element_key(child), Some("hsqc".to_string()));
        assert_eq!(graph.element_class(child), Some(tc("SP")));
        assert_eq!(graph.element_parent(child), Some(Some(root)));
        assert_eq!(graph.element_parent(root), Some(None));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn attrs_read_write_clear() {
        let mut graph = MemoryGraph::new();
        let id = graph.create_element(None, &tc("SP"), "s");

        assert_eq!(graph.read_attr(id, "comment"), AttrValue::None);
        graph.write_attr(id, "comment", AttrValue::from("noisy"));
        assert_eq!(graph.read_attr(id, "comment"), AttrValue::from("noisy"));

        graph.write_attr(id, "comment", AttrValue::None);
        assert_eq!(graph.read_attr(id, "comment"), AttrValue::None);
        assert!(graph.attr_snapshot(id).is_empty());
    }

    #[test]
    fn snapshot_is_sorted_and_complete() {
        let mut graph = MemoryGraph::new();
        let id = graph.create_element(None, &tc("PK"), "1");
        graph.write_attr(id, "height", AttrValue::Float(3.5));
        graph.write_attr(id, "comment", AttrValue::from("weak"));

        let snapshot = graph.attr_snapshot(id);
        assert_eq!(
            snapshot,
            vec![
                ("comment".to_string(), AttrValue::from("weak")),
                ("height".to_string(), AttrValue::Float(3.5)),
            ]
        );
    }

    #[test]
    fn restore_preserves_identity_and_advances_counter() {
        let mut graph = MemoryGraph::new();
        let id = graph.create_element(None, &tc("SP"), "s");
        assert!(graph.delete_element(id));
        assert!(!graph.contains(id));

        graph.restore_element(id, None, &tc("SP"), "s");
        assert!(graph.contains(id));

        // A fresh id never collides with the restored one.
        let fresh = graph.create_element(None, &tc("SP"), "t");
        assert_ne!(fresh, id);
    }

    #[test]
    fn delete_missing_is_false() {
        let mut graph = MemoryGraph::new();
        assert!(!graph.delete_element(99));
    }
}
