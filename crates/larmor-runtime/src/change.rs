#![forbid(unsafe_code)]

//! Recorded edits and their replay.
//!
//! Every mutation the project performs is recorded as an [`EditAction`]
//! holding both directions of the edit as plain data. Replay runs against a
//! [`ReplayWorld`] borrowed at call time, mutating the data graph and the
//! wrapper cache in lockstep and staging the callback infos the caller
//! dispatches after the borrow is released.
//!
//! # Invariants
//!
//! 1. Replay stages events, it never dispatches them; dispatch happens
//!    outside any `RefCell` borrow.
//! 2. `apply` followed by `unapply` restores the graph, attribute values,
//!    and Pid index to their prior state. Data ids are stable across
//!    delete/undelete; wrapper handles are not.

use std::fmt;

use larmor_model::{AttrValue, TypeCode};

use crate::cache::WrapperCache;
use crate::event::{CallbackInfo, EventDetail, Trigger};
use crate::graph::{DataGraph, DataId};
use crate::undo::{ReplayError, UndoableAction};

/// A caller-requested edit, addressed by wrapper handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Set (or with [`AttrValue::None`], clear) one attribute.
    SetAttr {
        target: crate::arena::ObjHandle,
        attr: String,
        value: AttrValue,
    },
    /// Change the object's local key.
    Rename {
        target: crate::arena::ObjHandle,
        key: String,
    },
}

/// One recorded mutation, with enough state to replay either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    Attr {
        data_id: DataId,
        attr: String,
        before: AttrValue,
        after: AttrValue,
    },
    Renamed {
        data_id: DataId,
        before: String,
        after: String,
    },
    Created {
        data_id: DataId,
        parent: Option<DataId>,
        class: TypeCode,
        key: String,
    },
    /// Deletion keeps a full attribute snapshot so undo can rebuild the
    /// element in place.
    Deleted {
        data_id: DataId,
        parent: Option<DataId>,
        class: TypeCode,
        key: String,
        attrs: Vec<(String, AttrValue)>,
    },
}

/// Mutable state a replay runs against, borrowed for the duration of one
/// undo or redo call.
pub struct ReplayWorld<'a, G: DataGraph> {
    pub graph: &'a mut G,
    pub cache: &'a mut WrapperCache,
    /// Events staged during replay, dispatched by the caller afterwards.
    pub events: &'a mut Vec<CallbackInfo>,
}

impl<G: DataGraph> fmt::Debug for ReplayWorld<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayWorld")
            .field("staged_events", &self.events.len())
            .finish()
    }
}

impl<'a, G: DataGraph> ReplayWorld<'a, G> {
    /// Stage a callback info for the live wrapper of `data_id`.
    fn stage(&mut self, trigger: Trigger, data_id: DataId, detail: EventDetail) {
        let Some(handle) = self.cache.get_by_data(data_id) else {
            return;
        };
        let Ok(record) = self.cache.record(handle) else {
            return;
        };
        self.events.push(CallbackInfo {
            trigger,
            object: handle,
            pid: record.pid.clone(),
            class: record.class.clone(),
            detail,
        });
    }

    /// Rebuild a deleted element and wrap it, staging the CREATE event.
    fn restore(
        &mut self,
        data_id: DataId,
        parent: Option<DataId>,
        class: &TypeCode,
        key: &str,
        attrs: &[(String, AttrValue)],
    ) -> Result<(), ReplayError> {
        let parent_handle = match parent {
            Some(parent_id) => Some(self.cache.get_by_data(parent_id).ok_or_else(|| {
                ReplayError::TargetMissing(format!("parent element {parent_id}"))
            })?),
            None => None,
        };
        self.graph.restore_element(data_id, parent, class, key);
        for (attr, value) in attrs {
            self.graph.write_attr(data_id, attr, value.clone());
        }
        self.cache
            .wrap(data_id, class.clone(), parent_handle, key)
            .map_err(|error| ReplayError::Failed(error.to_string()))?;
        self.stage(Trigger::Create, data_id, EventDetail::None);
        Ok(())
    }

    /// Stage WILL-DELETE, then destroy the element and its wrapper.
    fn destroy(&mut self, data_id: DataId) -> Result<(), ReplayError> {
        if !self.graph.contains(data_id) {
            return Err(ReplayError::TargetMissing(format!("element {data_id}")));
        }
        self.stage(Trigger::Delete, data_id, EventDetail::None);
        self.cache.invalidate(data_id);
        self.graph.delete_element(data_id);
        Ok(())
    }

    fn replay_attr(
        &mut self,
        data_id: DataId,
        attr: &str,
        value: &AttrValue,
        previous: &AttrValue,
    ) -> Result<(), ReplayError> {
        if !self.graph.contains(data_id) {
            return Err(ReplayError::TargetMissing(format!("element {data_id}")));
        }
        self.graph.write_attr(data_id, attr, value.clone());
        self.stage(
            Trigger::Change,
            data_id,
            EventDetail::Changed {
                attr: attr.to_owned(),
                previous: previous.clone(),
            },
        );
        Ok(())
    }

    fn replay_rename(&mut self, data_id: DataId, key: &str) -> Result<(), ReplayError> {
        let handle = self
            .cache
            .get_by_data(data_id)
            .ok_or_else(|| ReplayError::TargetMissing(format!("element {data_id}")))?;
        self.graph.rename_element(data_id, key);
        let (previous_pid, _) = self
            .cache
            .rename(handle, key)
            .map_err(|error| ReplayError::Failed(error.to_string()))?;
        let previous_key = previous_pid.last_field().to_owned();
        self.stage(
            Trigger::Rename,
            data_id,
            EventDetail::Renamed {
                previous_key,
                previous_pid,
            },
        );
        Ok(())
    }
}

impl<'a, G: DataGraph> UndoableAction<ReplayWorld<'a, G>> for EditAction {
    fn apply(&mut self, world: &mut ReplayWorld<'a, G>) -> Result<(), ReplayError> {
        match self {
            Self::Attr {
                data_id,
                attr,
                before,
                after,
            } => world.replay_attr(*data_id, attr, after, before),
            Self::Renamed { data_id, after, .. } => world.replay_rename(*data_id, after),
            Self::Created {
                data_id,
                parent,
                class,
                key,
            } => world.restore(*data_id, *parent, class, key, &[]),
            Self::Deleted { data_id, .. } => world.destroy(*data_id),
        }
    }

    fn unapply(&mut self, world: &mut ReplayWorld<'a, G>) -> Result<(), ReplayError> {
        match self {
            Self::Attr {
                data_id,
                attr,
                before,
                after,
            } => world.replay_attr(*data_id, attr, before, after),
            Self::Renamed {
                data_id, before, ..
            } => world.replay_rename(*data_id, before),
            Self::Created { data_id, .. } => world.destroy(*data_id),
            Self::Deleted {
                data_id,
                parent,
                class,
                key,
                attrs,
            } => world.restore(*data_id, *parent, class, key, attrs),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Attr { .. } => "set attribute",
            Self::Renamed { .. } => "rename",
            Self::Created { .. } => "create",
            Self::Deleted { .. } => "delete",
        }
    }
}
