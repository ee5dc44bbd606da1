#![forbid(unsafe_code)]

//! Wrapper identity cache.
//!
//! Maps data-layer elements to generational wrapper handles and maintains
//! the Pid indices. One data element has at most one live wrapper at a time;
//! looking the same element up twice yields the same [`ObjHandle`].
//!
//! # Invariants
//!
//! 1. `by_pid` and `by_data` index exactly the live arena records; an entry
//!    in either map always resolves through [`WrapperCache::record`].
//! 2. A wrapper's `Pid` is derived from its parent's `Pid` plus its local
//!    key. Renaming an ancestor re-keys every live descendant.
//! 3. A stale handle (generation mismatch after invalidation) surfaces as
//!    [`AccessError::Stale`], never as silent misdirection to a reused slot.
//!
//! # Failure Modes
//!
//! Child-list memoisation is only trusted for declared parent/child class
//! pairs; undeclared pairs are recomputed on every query, trading speed for
//! correctness when wrapping happens out of band.

use std::fmt;

use ahash::{AHashMap, AHashSet};
use larmor_model::{Pid, TypeCode};
use tracing::debug;

use crate::arena::{Arena, ObjHandle};
use crate::graph::DataId;

/// Why a wrapper lookup or edit was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No live wrapper carries this identifier.
    NotFound(Pid),
    /// The handle points at an invalidated wrapper slot.
    Stale(ObjHandle),
    /// The requested identifier is already taken by a live wrapper.
    DuplicatePid(Pid),
    /// The data layer has no element with this id.
    UnknownElement(DataId),
    /// The project root cannot be deleted.
    RootProtected,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(pid) => write!(f, "no object with pid {pid}"),
            Self::Stale(handle) => write!(f, "stale wrapper handle {handle}"),
            Self::DuplicatePid(pid) => write!(f, "pid already in use: {pid}"),
            Self::UnknownElement(id) => write!(f, "no data element with id {id}"),
            Self::RootProtected => write!(f, "the project root cannot be deleted"),
        }
    }
}

impl std::error::Error for AccessError {}

/// Cached state for one live wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperRecord {
    pub pid: Pid,
    pub data_id: DataId,
    pub class: TypeCode,
    pub parent: Option<ObjHandle>,
    pub local_key: String,
}

/// Generational wrapper store with Pid and data-id indices.
pub struct WrapperCache {
    arena: Arena<WrapperRecord>,
    by_pid: AHashMap<Pid, ObjHandle>,
    by_data: AHashMap<DataId, ObjHandle>,
    /// Declared (parent class, child class) pairs whose child lists may be
    /// memoised.
    child_deps: AHashSet<(TypeCode, TypeCode)>,
    child_lists: AHashMap<(ObjHandle, TypeCode), Vec<ObjHandle>>,
}

impl Default for WrapperCache {
    fn default() -> Self {
        Self::new()
    }
}

impl WrapperCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            by_pid: AHashMap::new(),
            by_data: AHashMap::new(),
            child_deps: AHashSet::new(),
            child_lists: AHashMap::new(),
        }
    }

    /// Obtain the wrapper for a data element, creating it on first sight.
    ///
    /// Repeated calls for the same `data_id` return the existing handle and
    /// ignore the other arguments.
    pub fn wrap(
        &mut self,
        data_id: DataId,
        class: TypeCode,
        parent: Option<ObjHandle>,
        local_key: &str,
    ) -> Result<ObjHandle, AccessError> {
        if let Some(&existing) = self.by_data.get(&data_id) {
            return Ok(existing);
        }
        let pid = match parent {
            Some(parent_handle) => {
                let parent_record = self
                    .arena
                    .get(parent_handle)
                    .ok_or(AccessError::Stale(parent_handle))?;
                parent_record.pid.child(class.clone(), local_key)
            }
            None => Pid::new(class.clone(), [local_key]),
        };
        if self.by_pid.contains_key(&pid) {
            return Err(AccessError::DuplicatePid(pid));
        }
        let handle = self.arena.insert(WrapperRecord {
            pid: pid.clone(),
            data_id,
            class: class.clone(),
            parent,
            local_key: local_key.to_owned(),
        });
        self.by_pid.insert(pid, handle);
        self.by_data.insert(data_id, handle);
        if let Some(parent_handle) = parent {
            self.child_lists.remove(&(parent_handle, class));
        }
        Ok(handle)
    }

    /// Resolve an identifier to its live wrapper.
    pub fn get_by_pid(&self, pid: &Pid) -> Result<ObjHandle, AccessError> {
        self.by_pid
            .get(pid)
            .copied()
            .ok_or_else(|| AccessError::NotFound(pid.clone()))
    }

    /// The live wrapper for a data element, if one exists.
    #[must_use]
    pub fn get_by_data(&self, data_id: DataId) -> Option<ObjHandle> {
        self.by_data.get(&data_id).copied()
    }

    /// The record behind a handle, or [`AccessError::Stale`].
    pub fn record(&self, handle: ObjHandle) -> Result<&WrapperRecord, AccessError> {
        self.arena.get(handle).ok_or(AccessError::Stale(handle))
    }

    #[must_use]
    pub fn is_live(&self, handle: ObjHandle) -> bool {
        self.arena.contains(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Drop the wrapper for a deleted data element. Later uses of its old
    /// handle report [`AccessError::Stale`].
    pub fn invalidate(&mut self, data_id: DataId) -> Option<ObjHandle> {
        let handle = self.by_data.remove(&data_id)?;
        let record = self.arena.remove(handle)?;
        self.by_pid.remove(&record.pid);
        self.child_lists
            .retain(|(parent, _), _| *parent != handle);
        if let Some(parent_handle) = record.parent {
            self.child_lists
                .remove(&(parent_handle, record.class.clone()));
        }
        debug!(pid = %record.pid, %handle, "wrapper invalidated");
        Some(handle)
    }

    /// Re-key a wrapper, and transitively every live descendant whose `Pid`
    /// embeds it. The whole subtree's prospective identifiers are validated
    /// against the index before anything mutates; a collision anywhere
    /// rejects the rename and leaves the cache untouched. Returns
    /// `(previous, new)` identifiers of the renamed wrapper itself.
    pub fn rename(
        &mut self,
        handle: ObjHandle,
        new_key: &str,
    ) -> Result<(Pid, Pid), AccessError> {
        let record = self.arena.get(handle).ok_or(AccessError::Stale(handle))?;
        let previous_pid = record.pid.clone();
        let parent = record.parent;
        let class = record.class.clone();
        let new_pid = match parent {
            Some(parent_handle) => {
                let parent_record = self
                    .arena
                    .get(parent_handle)
                    .ok_or(AccessError::Stale(parent_handle))?;
                parent_record.pid.child(class.clone(), new_key)
            }
            None => Pid::new(class.clone(), [new_key]),
        };
        let plan = self.rekey_plan(handle, new_pid.clone())?;
        if let Some(record) = self.arena.get_mut(handle) {
            record.local_key = new_key.to_owned();
        }
        // Drop every superseded index entry before inserting any new one; a
        // pid freed by one node may be taken by another in the same plan.
        for (moved, pid) in &plan {
            if let Some(record) = self.arena.get(*moved) {
                if record.pid != *pid {
                    self.by_pid.remove(&record.pid);
                }
            }
        }
        for (moved, pid) in plan {
            if let Some(record) = self.arena.get_mut(moved) {
                if record.pid != pid {
                    record.pid = pid.clone();
                    self.by_pid.insert(pid, moved);
                }
            }
        }
        // Sibling ordering is by Pid, so the parent's memoised list is
        // stale now.
        if let Some(parent_handle) = parent {
            self.child_lists.remove(&(parent_handle, class));
        }
        debug!(previous = %previous_pid, new = %new_pid, "wrapper renamed");
        Ok((previous_pid, new_pid))
    }

    /// Compute the prospective `Pid` of `root` and every live descendant,
    /// ancestors first, and check each against the index. A prospective
    /// identifier already held by a wrapper outside the renamed subtree is
    /// a collision; one held inside the subtree is fine, it moves too.
    fn rekey_plan(
        &self,
        root: ObjHandle,
        root_pid: Pid,
    ) -> Result<Vec<(ObjHandle, Pid)>, AccessError> {
        let mut planned: AHashMap<ObjHandle, Pid> = AHashMap::new();
        planned.insert(root, root_pid.clone());
        let mut plan = vec![(root, root_pid)];
        let mut frontier = vec![root];
        while let Some(current) = frontier.pop() {
            let parent_pid = planned[&current].clone();
            for (child, record) in self.arena.iter() {
                if record.parent != Some(current) {
                    continue;
                }
                let pid = parent_pid.child(record.class.clone(), record.local_key.clone());
                planned.insert(child, pid.clone());
                plan.push((child, pid));
                frontier.push(child);
            }
        }
        for (moved, pid) in &plan {
            if let Some(&existing) = self.by_pid.get(pid) {
                if existing != *moved && !planned.contains_key(&existing) {
                    return Err(AccessError::DuplicatePid(pid.clone()));
                }
            }
        }
        Ok(plan)
    }

    /// Declare that child lists for this (parent class, child class) pair
    /// may be served from the memo.
    pub fn declare_child_dependency(&mut self, parent_class: TypeCode, child_class: TypeCode) {
        self.child_deps.insert((parent_class, child_class));
    }

    /// Live children of `parent` with the given class, ordered by `Pid`.
    ///
    /// Memoised when the class pair was declared, recomputed otherwise.
    pub fn children(
        &mut self,
        parent: ObjHandle,
        child_class: &TypeCode,
    ) -> Result<Vec<ObjHandle>, AccessError> {
        let parent_class = self.record(parent)?.class.clone();
        let memoised = self
            .child_deps
            .contains(&(parent_class, child_class.clone()));
        if memoised {
            if let Some(cached) = self.child_lists.get(&(parent, child_class.clone())) {
                return Ok(cached.clone());
            }
        }
        let list = self.compute_children(parent, child_class);
        if memoised {
            self.child_lists
                .insert((parent, child_class.clone()), list.clone());
        }
        Ok(list)
    }

    fn compute_children(&self, parent: ObjHandle, child_class: &TypeCode) -> Vec<ObjHandle> {
        let mut pairs: Vec<(Pid, ObjHandle)> = self
            .arena
            .iter()
            .filter(|(_, record)| {
                record.parent == Some(parent) && record.class == *child_class
            })
            .map(|(handle, record)| (record.pid.clone(), handle))
            .collect();
        pairs.sort();
        pairs.into_iter().map(|(_, handle)| handle).collect()
    }

    /// All live wrappers, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjHandle, &WrapperRecord)> {
        self.arena.iter()
    }
}

impl fmt::Debug for WrapperCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperCache")
            .field("live", &self.arena.len())
            .field("memoised_lists", &self.child_lists.len())
            .finish()
    }
}
