#![forbid(unsafe_code)]

//! Project orchestration.
//!
//! The [`Project`] owns the data graph, the wrapper cache, the undo stack,
//! and the notifier router, and keeps them consistent through every edit.
//! Each mutating operation follows the same ordering: mutate the graph and
//! cache, record the inverse on the undo stack, then dispatch notifiers.
//!
//! # Invariants
//!
//! 1. All mutation happens under one `RefCell` borrow per call; notifier
//!    dispatch runs after the borrow is released, so callbacks may re-enter
//!    the project freely.
//! 2. Undo replay suppresses recording; undoing never grows the history.
//! 3. DELETE notifiers fire while the object is still readable. Deleting a
//!    subtree notifies leaves first.
//! 4. Raw events from the data layer update the wrapper cache and notify,
//!    but never record undo.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use larmor_model::{AttrValue, Pid, PidParseError, TypeCode};
use tracing::{debug, info_span};

use crate::arena::ObjHandle;
use crate::cache::{AccessError, WrapperCache};
use crate::change::{Change, EditAction, ReplayWorld};
use crate::event::{CallbackInfo, EventDetail, RawEvent, Trigger, Triggers};
use crate::graph::{DataGraph, DataId};
use crate::notifier::{NotificationBlock, NotifierId, NotifierRouter, NotifierScope, Subject};
use crate::undo::{ReplayFailure, UndoConfig, UndoStack};

/// Parameters for a new project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Root object key, also the first field of every Pid in the project.
    pub name: String,
    /// Retained undo waypoints.
    pub max_waypoints: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "untitled".to_owned(),
            max_waypoints: UndoConfig::default().max_waypoints,
        }
    }
}

impl ProjectConfig {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Failure to turn a Pid string into a live object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    Parse(PidParseError),
    Access(AccessError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "invalid pid: {error}"),
            Self::Access(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(error) => Some(error),
            Self::Access(error) => Some(error),
        }
    }
}

impl From<PidParseError> for ResolveError {
    fn from(error: PidParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<AccessError> for ResolveError {
    fn from(error: AccessError) -> Self {
        Self::Access(error)
    }
}

struct ProjectState<G: DataGraph> {
    graph: G,
    cache: WrapperCache,
    undo: UndoStack<EditAction>,
    root: ObjHandle,
}

/// The root handle of an object hierarchy.
///
/// Cloning produces another handle to the same project; all clones share
/// graph, cache, history, and router.
pub struct Project<G: DataGraph> {
    state: Rc<RefCell<ProjectState<G>>>,
    router: NotifierRouter,
}

impl<G: DataGraph> Clone for Project<G> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            router: self.router.clone(),
        }
    }
}

impl<G: DataGraph> fmt::Debug for Project<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Project")
            .field("objects", &state.cache.len())
            .field("waypoints", &state.undo.waypoint_depth())
            .field("can_undo", &state.undo.can_undo())
            .finish()
    }
}

/// Class tag carried by every project root.
pub const ROOT_CLASS: &str = "PR";

fn root_class() -> TypeCode {
    // "PR" contains no reserved characters, so this cannot fail.
    TypeCode::new(ROOT_CLASS).expect("static root class tag")
}

impl<G: DataGraph> Project<G> {
    /// Create a project over an empty data graph. The root element is
    /// created eagerly; it fires no notifier and records no undo.
    #[must_use]
    pub fn new(mut graph: G, config: ProjectConfig) -> Self {
        let class = root_class();
        let root_id = graph.create_element(None, &class, &config.name);
        let mut cache = WrapperCache::new();
        let root = cache
            .wrap(root_id, class, None, &config.name)
            .expect("empty cache accepts the root");
        Self {
            state: Rc::new(RefCell::new(ProjectState {
                graph,
                cache,
                undo: UndoStack::new(UndoConfig::new(config.max_waypoints)),
                root,
            })),
            router: NotifierRouter::new(),
        }
    }

    /// Handle of the root object.
    #[must_use]
    pub fn root(&self) -> ObjHandle {
        self.state.borrow().root
    }

    /// The root object's key (the project name).
    #[must_use]
    pub fn name(&self) -> String {
        let state = self.state.borrow();
        match state.cache.record(state.root) {
            Ok(record) => record.local_key.clone(),
            Err(_) => String::new(),
        }
    }

    /// Count of live wrapped objects, the root included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state.borrow().cache.len()
    }

    // -- lookup -----------------------------------------------------------

    /// Resolve a Pid string to a live object.
    pub fn resolve(&self, pid: &str) -> Result<ObjHandle, ResolveError> {
        let pid = Pid::parse(pid)?;
        Ok(self.get_by_pid(&pid)?)
    }

    pub fn get_by_pid(&self, pid: &Pid) -> Result<ObjHandle, AccessError> {
        self.state.borrow().cache.get_by_pid(pid)
    }

    pub fn pid_of(&self, handle: ObjHandle) -> Result<Pid, AccessError> {
        Ok(self.state.borrow().cache.record(handle)?.pid.clone())
    }

    pub fn class_of(&self, handle: ObjHandle) -> Result<TypeCode, AccessError> {
        Ok(self.state.borrow().cache.record(handle)?.class.clone())
    }

    /// The object's parent handle; `None` for the root.
    pub fn parent_of(&self, handle: ObjHandle) -> Result<Option<ObjHandle>, AccessError> {
        Ok(self.state.borrow().cache.record(handle)?.parent)
    }

    #[must_use]
    pub fn is_live(&self, handle: ObjHandle) -> bool {
        self.state.borrow().cache.is_live(handle)
    }

    /// Read one attribute. Unset attributes read as [`AttrValue::None`].
    pub fn attr(&self, handle: ObjHandle, attr: &str) -> Result<AttrValue, AccessError> {
        let state = self.state.borrow();
        let record = state.cache.record(handle)?;
        Ok(state.graph.read_attr(record.data_id, attr))
    }

    /// All set attributes, sorted by name.
    pub fn attr_snapshot(&self, handle: ObjHandle) -> Result<Vec<(String, AttrValue)>, AccessError> {
        let state = self.state.borrow();
        let record = state.cache.record(handle)?;
        Ok(state.graph.attr_snapshot(record.data_id))
    }

    /// Every live object's identifier, sorted.
    #[must_use]
    pub fn pids(&self) -> Vec<Pid> {
        let state = self.state.borrow();
        let mut pids: Vec<Pid> = state.cache.iter().map(|(_, record)| record.pid.clone()).collect();
        pids.sort();
        pids
    }

    /// Live children of `parent` with the given class, ordered by Pid.
    pub fn children(
        &self,
        parent: ObjHandle,
        child_class: &TypeCode,
    ) -> Result<Vec<ObjHandle>, AccessError> {
        self.state.borrow_mut().cache.children(parent, child_class)
    }

    /// Allow child-list memoisation for a (parent class, child class) pair.
    pub fn declare_child_dependency(&self, parent_class: TypeCode, child_class: TypeCode) {
        self.state
            .borrow_mut()
            .cache
            .declare_child_dependency(parent_class, child_class);
    }

    /// Declare class ancestry for notifier subject matching.
    pub fn declare_superclass(&self, child: TypeCode, parent: TypeCode) {
        self.router.declare_superclass(child, parent);
    }

    // -- notifiers --------------------------------------------------------

    pub fn register_notifier(
        &self,
        subject: Subject,
        triggers: Triggers,
        scope: NotifierScope,
        callback: impl Fn(&CallbackInfo) + 'static,
    ) -> NotifierId {
        self.router.register(subject, triggers, scope, callback)
    }

    pub fn unregister_notifier(&self, id: NotifierId) -> bool {
        self.router.unregister(id)
    }

    #[must_use]
    pub fn notifier_count(&self) -> usize {
        self.router.registration_count()
    }

    /// Suppress all notifications until the guard drops; queued events are
    /// discarded. For bulk imports.
    #[must_use]
    pub fn block_notifications(&self) -> NotificationBlock {
        self.router.block_all()
    }

    /// Queue notifications until the guard drops, then flush them minus the
    /// owner's own single-object registrations.
    #[must_use]
    pub fn block_echo(&self, owner: ObjHandle) -> NotificationBlock {
        self.router.block_echo(owner)
    }

    // -- mutation ---------------------------------------------------------

    /// Create a child object. Records undo and fires CREATE.
    pub fn create_object(
        &self,
        parent: ObjHandle,
        class: TypeCode,
        key: &str,
    ) -> Result<ObjHandle, AccessError> {
        let (handle, info) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let parent_record = state.cache.record(parent)?;
            let parent_id = parent_record.data_id;
            let pid = parent_record.pid.child(class.clone(), key);
            if state.cache.get_by_pid(&pid).is_ok() {
                return Err(AccessError::DuplicatePid(pid));
            }
            let data_id = state.graph.create_element(Some(parent_id), &class, key);
            let handle = state.cache.wrap(data_id, class.clone(), Some(parent), key)?;
            state.undo.push(EditAction::Created {
                data_id,
                parent: Some(parent_id),
                class: class.clone(),
                key: key.to_owned(),
            });
            debug!(%pid, "object created");
            (
                handle,
                CallbackInfo {
                    trigger: Trigger::Create,
                    object: handle,
                    pid,
                    class,
                    detail: EventDetail::None,
                },
            )
        };
        self.router.fire(info);
        Ok(handle)
    }

    /// Set one attribute. Writing the current value is a no-op: nothing is
    /// recorded and nothing fires.
    pub fn set_attr(
        &self,
        target: ObjHandle,
        attr: &str,
        value: AttrValue,
    ) -> Result<(), AccessError> {
        let info = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let record = state.cache.record(target)?;
            let data_id = record.data_id;
            let pid = record.pid.clone();
            let class = record.class.clone();
            let before = state.graph.read_attr(data_id, attr);
            if before == value {
                return Ok(());
            }
            state.graph.write_attr(data_id, attr, value.clone());
            state.undo.push(EditAction::Attr {
                data_id,
                attr: attr.to_owned(),
                before: before.clone(),
                after: value,
            });
            CallbackInfo {
                trigger: Trigger::Change,
                object: target,
                pid,
                class,
                detail: EventDetail::Changed {
                    attr: attr.to_owned(),
                    previous: before,
                },
            }
        };
        self.router.fire(info);
        Ok(())
    }

    /// Change an object's local key. Every live descendant is re-keyed;
    /// only the renamed object itself fires RENAME. Renaming to the current
    /// key is a no-op.
    pub fn rename(&self, target: ObjHandle, key: &str) -> Result<(), AccessError> {
        let info = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let record = state.cache.record(target)?;
            let data_id = record.data_id;
            let class = record.class.clone();
            let before = record.local_key.clone();
            if before == key {
                return Ok(());
            }
            // The cache validates key collisions, so it goes first; the
            // graph rename cannot fail after it succeeds.
            let (previous_pid, new_pid) = state.cache.rename(target, key)?;
            state.graph.rename_element(data_id, key);
            state.undo.push(EditAction::Renamed {
                data_id,
                before: before.clone(),
                after: key.to_owned(),
            });
            debug!(previous = %previous_pid, new = %new_pid, "object renamed");
            CallbackInfo {
                trigger: Trigger::Rename,
                object: target,
                pid: new_pid,
                class,
                detail: EventDetail::Renamed {
                    previous_key: before,
                    previous_pid,
                },
            }
        };
        self.router.fire(info);
        Ok(())
    }

    /// Delete an object and its whole subtree.
    ///
    /// DELETE notifiers fire leaves-first while every object is still
    /// readable; destruction happens afterwards, re-validating each object
    /// in case a callback already removed it.
    pub fn delete_object(&self, target: ObjHandle) -> Result<(), AccessError> {
        let infos = {
            let state = self.state.borrow();
            if target == state.root {
                return Err(AccessError::RootProtected);
            }
            state.cache.record(target)?;
            let mut order = vec![target];
            let mut frontier = vec![target];
            while let Some(current) = frontier.pop() {
                for (handle, record) in state.cache.iter() {
                    if record.parent == Some(current) {
                        order.push(handle);
                        frontier.push(handle);
                    }
                }
            }
            // Leaves first: children always hear DELETE before their parent.
            order.reverse();
            let mut infos = Vec::with_capacity(order.len());
            for handle in order {
                let record = state.cache.record(handle)?;
                infos.push(CallbackInfo {
                    trigger: Trigger::Delete,
                    object: handle,
                    pid: record.pid.clone(),
                    class: record.class.clone(),
                    detail: EventDetail::None,
                });
            }
            infos
        };

        for info in &infos {
            self.router.fire(info.clone());
        }

        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        for info in &infos {
            // A DELETE callback may itself have removed objects.
            let Ok(record) = state.cache.record(info.object) else {
                continue;
            };
            let data_id = record.data_id;
            let class = record.class.clone();
            let key = record.local_key.clone();
            let parent_id = match record.parent {
                Some(parent_handle) => state.cache.record(parent_handle).ok().map(|r| r.data_id),
                None => None,
            };
            let attrs = state.graph.attr_snapshot(data_id);
            state.cache.invalidate(data_id);
            state.graph.delete_element(data_id);
            state.undo.push(EditAction::Deleted {
                data_id,
                parent: parent_id,
                class,
                key,
                attrs,
            });
        }
        Ok(())
    }

    /// Apply one funnelled edit.
    pub fn mutate(&self, change: Change) -> Result<(), AccessError> {
        match change {
            Change::SetAttr {
                target,
                attr,
                value,
            } => self.set_attr(target, &attr, value),
            Change::Rename { target, key } => self.rename(target, &key),
        }
    }

    // -- history ----------------------------------------------------------

    /// Close the current undo group and open a new one.
    pub fn new_waypoint(&self, label: Option<&str>) {
        self.state.borrow_mut().undo.new_waypoint(label);
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.state.borrow().undo.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.state.borrow().undo.can_redo()
    }

    #[must_use]
    pub fn undo_label(&self) -> Option<String> {
        self.state.borrow().undo.next_undo_label().map(str::to_owned)
    }

    #[must_use]
    pub fn redo_label(&self) -> Option<String> {
        self.state.borrow().undo.next_redo_label().map(str::to_owned)
    }

    #[must_use]
    pub fn waypoint_depth(&self) -> usize {
        self.state.borrow().undo.waypoint_depth()
    }

    /// Revert the most recent waypoint group. Events for the reverted edits
    /// dispatch after the whole group has replayed.
    pub fn undo(&self) -> Option<Result<usize, ReplayFailure>> {
        let span = info_span!("undo.replay", direction = "undo").entered();
        let (result, events) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let mut events = Vec::new();
            let result = state.undo.undo(&mut ReplayWorld {
                graph: &mut state.graph,
                cache: &mut state.cache,
                events: &mut events,
            });
            (result, events)
        };
        drop(span);
        for info in events {
            self.router.fire(info);
        }
        result
    }

    /// Re-apply the most recently undone waypoint group.
    pub fn redo(&self) -> Option<Result<usize, ReplayFailure>> {
        let span = info_span!("undo.replay", direction = "redo").entered();
        let (result, events) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let mut events = Vec::new();
            let result = state.undo.redo(&mut ReplayWorld {
                graph: &mut state.graph,
                cache: &mut state.cache,
                events: &mut events,
            });
            (result, events)
        };
        drop(span);
        for info in events {
            self.router.fire(info);
        }
        result
    }

    /// Suspend undo recording until the guard drops. Guards nest.
    #[must_use]
    pub fn pause_recording(&self) -> RecordingPause<G> {
        self.state.borrow_mut().undo.suspend_recording();
        RecordingPause {
            state: Rc::clone(&self.state),
        }
    }

    // -- data-layer boundary ----------------------------------------------

    /// Translate one raw data-layer event into wrapper bookkeeping and a
    /// notifier dispatch. The graph mutation already happened on the data
    /// side, so nothing is recorded for undo.
    pub fn deliver_raw(&self, event: RawEvent) -> Result<(), AccessError> {
        match event {
            RawEvent::ObjectCreated { data_id } => {
                let info = {
                    let mut state = self.state.borrow_mut();
                    let handle = wrap_by_data(&mut state, data_id)?;
                    let record = state.cache.record(handle)?;
                    CallbackInfo {
                        trigger: Trigger::Create,
                        object: handle,
                        pid: record.pid.clone(),
                        class: record.class.clone(),
                        detail: EventDetail::None,
                    }
                };
                self.router.fire(info);
            }
            RawEvent::ObjectWillDelete { data_id } => {
                let info = {
                    let state = self.state.borrow();
                    let Some(handle) = state.cache.get_by_data(data_id) else {
                        // Never wrapped, so nobody is observing it.
                        return Ok(());
                    };
                    let record = state.cache.record(handle)?;
                    CallbackInfo {
                        trigger: Trigger::Delete,
                        object: handle,
                        pid: record.pid.clone(),
                        class: record.class.clone(),
                        detail: EventDetail::None,
                    }
                };
                self.router.fire(info);
                self.state.borrow_mut().cache.invalidate(data_id);
            }
            RawEvent::AttributeRenamed {
                data_id,
                previous_key,
            } => {
                let info = {
                    let mut state = self.state.borrow_mut();
                    let state = &mut *state;
                    let handle = state
                        .cache
                        .get_by_data(data_id)
                        .ok_or(AccessError::UnknownElement(data_id))?;
                    let key = state
                        .graph
                        .element_key(data_id)
                        .ok_or(AccessError::UnknownElement(data_id))?;
                    let (previous_pid, new_pid) = state.cache.rename(handle, &key)?;
                    CallbackInfo {
                        trigger: Trigger::Rename,
                        object: handle,
                        pid: new_pid,
                        class: state.cache.record(handle)?.class.clone(),
                        detail: EventDetail::Renamed {
                            previous_key,
                            previous_pid,
                        },
                    }
                };
                self.router.fire(info);
            }
            RawEvent::AttributeChanged {
                data_id,
                attr,
                previous,
            } => {
                let info = {
                    let state = self.state.borrow();
                    let handle = state
                        .cache
                        .get_by_data(data_id)
                        .ok_or(AccessError::UnknownElement(data_id))?;
                    let record = state.cache.record(handle)?;
                    CallbackInfo {
                        trigger: Trigger::Change,
                        object: handle,
                        pid: record.pid.clone(),
                        class: record.class.clone(),
                        detail: EventDetail::Changed { attr, previous },
                    }
                };
                self.router.fire(info);
            }
        }
        Ok(())
    }
}

/// Wrap `data_id`, wrapping unwrapped ancestors first so Pid derivation has
/// a parent record to build on.
fn wrap_by_data<G: DataGraph>(
    state: &mut ProjectState<G>,
    data_id: DataId,
) -> Result<ObjHandle, AccessError> {
    if let Some(handle) = state.cache.get_by_data(data_id) {
        return Ok(handle);
    }
    // Collect the unwrapped ancestor chain, nearest first.
    let mut chain = vec![data_id];
    let mut current = data_id;
    let parent_handle = loop {
        let parent = state
            .graph
            .element_parent(current)
            .ok_or(AccessError::UnknownElement(current))?;
        match parent {
            None => break None,
            Some(parent_id) => match state.cache.get_by_data(parent_id) {
                Some(handle) => break Some(handle),
                None => {
                    chain.push(parent_id);
                    current = parent_id;
                }
            },
        }
    };
    let mut parent_handle = parent_handle;
    let mut wrapped = None;
    for id in chain.into_iter().rev() {
        let class = state
            .graph
            .element_class(id)
            .ok_or(AccessError::UnknownElement(id))?;
        let key = state
            .graph
            .element_key(id)
            .ok_or(AccessError::UnknownElement(id))?;
        let handle = state.cache.wrap(id, class, parent_handle, &key)?;
        parent_handle = Some(handle);
        wrapped = Some(handle);
    }
    wrapped.ok_or(AccessError::UnknownElement(data_id))
}

/// RAII guard from [`Project::pause_recording`].
pub struct RecordingPause<G: DataGraph> {
    state: Rc<RefCell<ProjectState<G>>>,
}

impl<G: DataGraph> Drop for RecordingPause<G> {
    fn drop(&mut self) {
        self.state.borrow_mut().undo.resume_recording();
    }
}

impl<G: DataGraph> fmt::Debug for RecordingPause<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordingPause")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tc(code: &str) -> TypeCode {
        TypeCode::new(code).unwrap()
    }

    fn demo() -> Project<MemoryGraph> {
        Project::new(MemoryGraph::new(), ProjectConfig::named("demo"))
    }

    #[test]
    fn root_is_wrapped_eagerly() {
        let project = demo();
        assert_eq!(project.name(), "demo");
        assert_eq!(project.object_count(), 1);
        assert_eq!(project.resolve("PR:demo").unwrap(), project.root());
        assert!(!project.can_undo());
    }

    #[test]
    fn create_records_undo_and_fires() {
        let project = demo();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        project.register_notifier(
            Subject::Class(tc("SP")),
            Triggers::CREATE,
            NotifierScope::Project,
            move |info| log.borrow_mut().push(info.pid.to_string()),
        );

        project.new_waypoint(Some("add spectrum"));
        let spectrum = project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        assert_eq!(*seen.borrow(), vec!["SP:demo.hsqc"]);
        assert!(project.can_undo());
        assert_eq!(project.pid_of(spectrum).unwrap().to_string(), "SP:demo.hsqc");
    }

    #[test]
    fn duplicate_key_under_same_parent_is_rejected() {
        let project = demo();
        project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        assert!(matches!(
            project.create_object(project.root(), tc("SP"), "hsqc"),
            Err(AccessError::DuplicatePid(_))
        ));
        // The failed create left no orphan behind.
        assert_eq!(project.object_count(), 2);
    }

    #[test]
    fn set_attr_same_value_is_silent() {
        let project = demo();
        let fired = Rc::new(RefCell::new(0u32));
        let count = Rc::clone(&fired);
        project.register_notifier(
            Subject::Any,
            Triggers::CHANGE,
            NotifierScope::Project,
            move |_| *count.borrow_mut() += 1,
        );

        project.new_waypoint(None);
        project
            .set_attr(project.root(), "comment", AttrValue::from("x"))
            .unwrap();
        project
            .set_attr(project.root(), "comment", AttrValue::from("x"))
            .unwrap();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn undo_reverts_attr_and_fires_inverse_change() {
        let project = demo();
        project.new_waypoint(None);
        project
            .set_attr(project.root(), "comment", AttrValue::from("x"))
            .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        project.register_notifier(
            Subject::Any,
            Triggers::CHANGE,
            NotifierScope::Project,
            move |info| {
                if let EventDetail::Changed { previous, .. } = &info.detail {
                    log.borrow_mut().push(previous.clone());
                }
            },
        );

        project.undo().unwrap().unwrap();
        assert_eq!(project.attr(project.root(), "comment").unwrap(), AttrValue::None);
        // The inverse CHANGE reports the value being replaced.
        assert_eq!(*seen.borrow(), vec![AttrValue::from("x")]);
        assert!(!project.can_undo());
        assert!(project.can_redo());
    }

    #[test]
    fn undo_does_not_grow_history() {
        let project = demo();
        project.new_waypoint(None);
        project
            .set_attr(project.root(), "a", AttrValue::Int(1))
            .unwrap();
        let depth = project.waypoint_depth();
        project.undo().unwrap().unwrap();
        project.redo().unwrap().unwrap();
        assert_eq!(project.waypoint_depth(), depth);
    }

    #[test]
    fn delete_notifies_leaves_first_while_readable() {
        let project = demo();
        let spectrum = project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        let peak = project.create_object(spectrum, tc("PK"), "1").unwrap();

        let order = Rc::new(RefCell::new(Vec::new()));
        let reader = project.clone();
        let log = Rc::clone(&order);
        project.register_notifier(
            Subject::Any,
            Triggers::DELETE,
            NotifierScope::Project,
            move |info| {
                // Still readable during WILL-DELETE.
                assert!(reader.attr(info.object, "anything").is_ok());
                log.borrow_mut().push(info.pid.to_string());
            },
        );

        project.new_waypoint(Some("delete spectrum"));
        project.delete_object(spectrum).unwrap();
        assert_eq!(*order.borrow(), vec!["PK:demo.hsqc.1", "SP:demo.hsqc"]);
        assert!(!project.is_live(spectrum));
        assert!(!project.is_live(peak));
        assert_eq!(project.object_count(), 1);
    }

    #[test]
    fn undo_of_subtree_delete_restores_parent_before_child() {
        let project = demo();
        project.new_waypoint(Some("build"));
        let spectrum = project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        project.create_object(spectrum, tc("PK"), "1").unwrap();
        project
            .set_attr(spectrum, "scale", AttrValue::Float(1.5))
            .unwrap();

        project.new_waypoint(Some("delete"));
        project.delete_object(spectrum).unwrap();
        assert_eq!(project.object_count(), 1);

        project.undo().unwrap().unwrap();
        let restored = project.resolve("SP:demo.hsqc").unwrap();
        assert_eq!(project.attr(restored, "scale").unwrap(), AttrValue::Float(1.5));
        assert!(project.resolve("PK:demo.hsqc.1").is_ok());
        assert_eq!(project.object_count(), 3);
    }

    #[test]
    fn root_cannot_be_deleted() {
        let project = demo();
        assert_eq!(
            project.delete_object(project.root()),
            Err(AccessError::RootProtected)
        );
    }

    #[test]
    fn rename_rekeys_subtree_and_reports_previous_identity() {
        let project = demo();
        let spectrum = project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        project.create_object(spectrum, tc("PK"), "1").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        project.register_notifier(
            Subject::Any,
            Triggers::RENAME,
            NotifierScope::Project,
            move |info| {
                if let EventDetail::Renamed { previous_pid, .. } = &info.detail {
                    log.borrow_mut().push((previous_pid.to_string(), info.pid.to_string()));
                }
            },
        );

        project.new_waypoint(None);
        project.rename(spectrum, "noesy").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![("SP:demo.hsqc".to_string(), "SP:demo.noesy".to_string())]
        );
        assert!(project.resolve("PK:demo.noesy.1").is_ok());
        assert!(project.resolve("PK:demo.hsqc.1").is_err());

        project.undo().unwrap().unwrap();
        assert!(project.resolve("PK:demo.hsqc.1").is_ok());
    }

    #[test]
    fn pause_recording_skips_undo() {
        let project = demo();
        project.new_waypoint(None);
        {
            let _pause = project.pause_recording();
            project
                .set_attr(project.root(), "transient", AttrValue::Int(1))
                .unwrap();
        }
        assert!(!project.can_undo());
        // The write itself still happened.
        assert_eq!(
            project.attr(project.root(), "transient").unwrap(),
            AttrValue::Int(1)
        );
    }

    #[test]
    fn raw_created_event_wraps_lazily_with_ancestors() {
        let project = demo();
        // Mutate the graph out of band, as a data layer would.
        let (spectrum_id, peak_id) = {
            let mut state = project.state.borrow_mut();
            let state = &mut *state;
            let root_record = state.cache.record(state.root).unwrap();
            let root_id = root_record.data_id;
            let spectrum_id = state.graph.create_element(Some(root_id), &tc("SP"), "hsqc");
            let peak_id = state.graph.create_element(Some(spectrum_id), &tc("PK"), "1");
            (spectrum_id, peak_id)
        };

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        project.register_notifier(
            Subject::Any,
            Triggers::CREATE,
            NotifierScope::Project,
            move |info| log.borrow_mut().push(info.pid.to_string()),
        );

        project.deliver_raw(RawEvent::ObjectCreated { data_id: peak_id }).unwrap();
        // The peak and its unwrapped spectrum ancestor are both live now,
        // but only the reported element fires.
        assert_eq!(*seen.borrow(), vec!["PK:demo.hsqc.1"]);
        assert!(project.resolve("SP:demo.hsqc").is_ok());
        assert!(!project.can_undo(), "raw events record no undo");
        let _ = spectrum_id;
    }

    #[test]
    fn raw_will_delete_fires_then_invalidates() {
        let project = demo();
        let spectrum = project
            .create_object(project.root(), tc("SP"), "hsqc")
            .unwrap();
        let data_id = project.state.borrow().cache.record(spectrum).unwrap().data_id;

        let fired = Rc::new(RefCell::new(0u32));
        let count = Rc::clone(&fired);
        project.register_notifier(
            Subject::Any,
            Triggers::DELETE,
            NotifierScope::Project,
            move |_| *count.borrow_mut() += 1,
        );

        project.deliver_raw(RawEvent::ObjectWillDelete { data_id }).unwrap();
        assert_eq!(*fired.borrow(), 1);
        assert!(!project.is_live(spectrum));
    }
}
