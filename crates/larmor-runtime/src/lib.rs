#![forbid(unsafe_code)]

//! Larmor Runtime
//!
//! This crate provides the object lifecycle machinery that ties the model
//! crate's identifiers and values into a live, observable, undoable object
//! hierarchy.
//!
//! # Key Components
//!
//! - [`Project`] - Orchestrator owning graph, cache, history, and router
//! - [`WrapperCache`] - Generational wrapper store with Pid indices
//! - [`NotifierRouter`] - Registration, matching, and dispatch of callbacks
//! - [`UndoStack`] - Waypoint-grouped, bounded undo/redo history
//! - [`DataGraph`] - Trait boundary to the underlying data layer
//! - [`RawEvent`] - Mutation reports crossing that boundary inward
//!
//! # Role in Larmor
//! `larmor-runtime` is the orchestrator. It consumes edits through
//! [`Project`], mirrors them into the [`DataGraph`], records their inverses
//! on the [`UndoStack`], and fans resulting events out through the
//! [`NotifierRouter`]. `larmor-model` supplies the identifier and value
//! vocabulary; this crate supplies everything that moves.

pub mod arena;
pub mod cache;
pub mod change;
pub mod event;
pub mod graph;
pub mod notifier;
pub mod project;
pub mod undo;

pub use arena::{Arena, ObjHandle};
pub use cache::{AccessError, WrapperCache, WrapperRecord};
pub use change::{Change, EditAction, ReplayWorld};
pub use event::{CallbackInfo, EventDetail, RawEvent, Trigger, Triggers};
pub use graph::{DataGraph, DataId, MemoryGraph};
pub use notifier::{
    NotificationBlock, NotifierId, NotifierRouter, NotifierScope, Subject,
};
pub use project::{Project, ProjectConfig, RecordingPause, ResolveError, ROOT_CLASS};
pub use undo::{
    FnAction, ReplayError, ReplayFailure, UndoConfig, UndoStack, UndoableAction,
};
