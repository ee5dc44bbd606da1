#![forbid(unsafe_code)]

//! Mutation events and notifier payloads.
//!
//! The data graph produces four raw event kinds at well-defined points:
//! immediately after construction, immediately before teardown, and
//! immediately after a rename or tracked attribute write. The framework
//! translates each into a [`CallbackInfo`], the payload handed to every
//! matching subscriber. Payloads carry wrapper *handles*, never owned
//! wrappers, so a subscriber that stashes one cannot keep a deleted object
//! alive.

use bitflags::bitflags;
use larmor_model::{AttrValue, Pid, TypeCode};

use crate::arena::ObjHandle;
use crate::graph::DataId;

/// The kind of mutation a single dispatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A wrapper was created for a new data element.
    Create,
    /// The data element is about to be destroyed.
    Delete,
    /// The object's local key (and so its Pid) changed.
    Rename,
    /// A tracked attribute changed.
    Change,
}

bitflags! {
    /// Set of triggers a registration subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Triggers: u8 {
        const CREATE = 1;
        const DELETE = 1 << 1;
        const RENAME = 1 << 2;
        const CHANGE = 1 << 3;
    }
}

impl Trigger {
    /// The mask bit for this kind.
    #[must_use]
    pub fn mask(self) -> Triggers {
        match self {
            Self::Create => Triggers::CREATE,
            Self::Delete => Triggers::DELETE,
            Self::Rename => Triggers::RENAME,
            Self::Change => Triggers::CHANGE,
        }
    }
}

/// A low-level mutation report from the data graph.
///
/// The project resolves the wrapper (lazily for `ObjectCreated`) and fans
/// the event out through the router. Raw events describe mutations that
/// already happened in the graph, so delivering one never records undo.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// Emitted immediately after element construction.
    ObjectCreated { data_id: DataId },
    /// Emitted immediately before element teardown.
    ObjectWillDelete { data_id: DataId },
    /// Emitted immediately after a key change.
    AttributeRenamed { data_id: DataId, previous_key: String },
    /// Emitted immediately after a tracked attribute write.
    AttributeChanged {
        data_id: DataId,
        attr: String,
        previous: AttrValue,
    },
}

/// Pre-mutation detail attached to RENAME and CHANGE dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    /// CREATE and DELETE carry no previous value.
    None,
    /// The key and Pid the object had before the rename.
    Renamed {
        previous_key: String,
        previous_pid: Pid,
    },
    /// The attribute name and the value it held before the write.
    Changed { attr: String, previous: AttrValue },
}

/// Payload constructed per dispatch and handed to each subscriber.
///
/// Transient: built for one delivery, not retained by the framework.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackInfo {
    /// What happened.
    pub trigger: Trigger,
    /// Handle of the affected wrapper.
    pub object: ObjHandle,
    /// The object's Pid at dispatch time (post-mutation for renames).
    pub pid: Pid,
    /// The object's class tag.
    pub class: TypeCode,
    /// Previous value, where the trigger has one.
    pub detail: EventDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_masks_are_distinct() {
        let all = [
            Trigger::Create,
            Trigger::Delete,
            Trigger::Rename,
            Trigger::Change,
        ];
        let mut acc = Triggers::empty();
        for t in all {
            assert!(!acc.intersects(t.mask()));
            acc |= t.mask();
        }
        assert_eq!(acc, Triggers::all());
    }

    #[test]
    fn trigger_set_membership() {
        let set = Triggers::CREATE | Triggers::DELETE;
        assert!(set.contains(Trigger::Create.mask()));
        assert!(!set.contains(Trigger::Change.mask()));
    }
}
