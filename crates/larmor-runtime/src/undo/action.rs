#![forbid(unsafe_code)]

//! Replayable action trait.
//!
//! The undo stack stores values implementing [`UndoableAction`] and replays
//! them against a context supplied at call time. Keeping the context out of
//! the stored action is what lets one stack own actions that mutate state
//! the stack itself lives next to.

use std::fmt;

/// Why a single action failed to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The action's target no longer exists in the data layer.
    TargetMissing(String),
    /// The data layer rejected the replayed edit.
    Failed(String),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetMissing(what) => write!(f, "replay target missing: {what}"),
            Self::Failed(why) => write!(f, "replay failed: {why}"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// One recorded edit, replayable in either direction.
///
/// `apply` re-performs the edit (redo); `unapply` reverts it (undo). Both
/// receive a mutable context rather than capturing one, so implementations
/// stay plain data.
pub trait UndoableAction<Ctx> {
    fn apply(&mut self, ctx: &mut Ctx) -> Result<(), ReplayError>;
    fn unapply(&mut self, ctx: &mut Ctx) -> Result<(), ReplayError>;

    /// Short human-readable label, for history displays.
    fn label(&self) -> &str {
        "edit"
    }
}

/// Closure-backed action, mostly useful in tests and small tools.
pub struct FnAction<Ctx> {
    apply: Box<dyn FnMut(&mut Ctx) -> Result<(), ReplayError>>,
    unapply: Box<dyn FnMut(&mut Ctx) -> Result<(), ReplayError>>,
    label: String,
}

impl<Ctx> FnAction<Ctx> {
    pub fn new(
        label: impl Into<String>,
        apply: impl FnMut(&mut Ctx) -> Result<(), ReplayError> + 'static,
        unapply: impl FnMut(&mut Ctx) -> Result<(), ReplayError> + 'static,
    ) -> Self {
        Self {
            apply: Box::new(apply),
            unapply: Box::new(unapply),
            label: label.into(),
        }
    }
}

impl<Ctx> UndoableAction<Ctx> for FnAction<Ctx> {
    fn apply(&mut self, ctx: &mut Ctx) -> Result<(), ReplayError> {
        (self.apply)(ctx)
    }

    fn unapply(&mut self, ctx: &mut Ctx) -> Result<(), ReplayError> {
        (self.unapply)(ctx)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl<Ctx> fmt::Debug for FnAction<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("label", &self.label).finish()
    }
}
