#![forbid(unsafe_code)]

//! Undo/redo history.
//!
//! Split into the replayable-action contract ([`action`]) and the
//! waypoint-grouped stack that stores and replays them ([`stack`]).

pub mod action;
pub mod stack;

pub use action::{FnAction, ReplayError, UndoableAction};
pub use stack::{ReplayFailure, UndoConfig, UndoStack};
