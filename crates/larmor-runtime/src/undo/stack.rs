#![forbid(unsafe_code)]

//! Waypoint-grouped undo stack.
//!
//! Recorded actions accumulate into the open waypoint group; undo and redo
//! replay whole groups atomically. The cursor counts applied groups, so
//! `groups[..cursor]` is the undoable past and `groups[cursor..]` the
//! redoable future.
//!
//! # Invariants
//!
//! 1. Recording a new action truncates the redo future.
//! 2. Undo replays a group's actions in reverse recording order; redo
//!    replays them forward.
//! 3. Nothing records while a replay is in flight or while recording is
//!    suspended.
//! 4. When the waypoint limit is exceeded the oldest fully-undoable group
//!    is dropped; redo-future groups are never evicted by the limit.
//! 5. Every retained group holds at least one action: a requested waypoint
//!    only materialises when the first action is recorded into it, so an
//!    untouched waypoint never shows up as an undoable step.
//!
//! # Failure Modes
//!
//! A failed replay does not poison the stack: the cursor still moves past
//! the attempted group and the caller receives every per-action error. The
//! data layer may be partially reverted at that point, which the caller
//! surfaces rather than hiding.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, warn};

use super::action::{ReplayError, UndoableAction};

/// Tuning for an [`UndoStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoConfig {
    /// Maximum retained waypoint groups. `usize::MAX` means unbounded.
    pub max_waypoints: usize,
}

impl UndoConfig {
    #[must_use]
    pub fn new(max_waypoints: usize) -> Self {
        Self { max_waypoints }
    }

    /// Keep every waypoint.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_waypoints: usize::MAX,
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { max_waypoints: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackState {
    Idle,
    Replaying,
}

/// Marks the stack as replaying for one borrow scope and restores `Idle` on
/// drop, so a panicking action cannot leave the flag stuck.
struct ReplayGuard<'a> {
    state: &'a mut StackState,
}

impl<'a> ReplayGuard<'a> {
    fn enter(state: &'a mut StackState) -> Self {
        *state = StackState::Replaying;
        Self { state }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        *self.state = StackState::Idle;
    }
}

struct WaypointGroup<A> {
    label: Option<String>,
    items: Vec<A>,
}

impl<A> WaypointGroup<A> {
    fn new(label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_owned),
            items: Vec::new(),
        }
    }
}

/// Errors from replaying one waypoint group.
#[derive(Debug)]
pub struct ReplayFailure {
    /// Actions attempted in the group.
    pub attempted: usize,
    /// Per-action errors, in attempt order.
    pub errors: Vec<ReplayError>,
}

impl fmt::Display for ReplayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} replayed actions failed",
            self.errors.len(),
            self.attempted
        )
    }
}

impl std::error::Error for ReplayFailure {}

/// Bounded, waypoint-grouped undo history.
pub struct UndoStack<A> {
    groups: VecDeque<WaypointGroup<A>>,
    /// Count of applied groups; the redo future starts here.
    cursor: usize,
    /// A requested waypoint whose group has not materialised yet. Holds the
    /// label the first recorded action will open the group with.
    pending: Option<Option<String>>,
    state: StackState,
    suspended: u32,
    config: UndoConfig,
}

impl<A> UndoStack<A> {
    #[must_use]
    pub fn new(config: UndoConfig) -> Self {
        Self {
            groups: VecDeque::new(),
            cursor: 0,
            pending: None,
            state: StackState::Idle,
            suspended: 0,
            config,
        }
    }

    /// Close the current group; the next recorded action opens a new one.
    ///
    /// Opening a waypoint truncates the redo future. The new group is not
    /// created until something is recorded into it, so consecutive waypoints
    /// without edits collapse and only the latest label survives.
    pub fn new_waypoint(&mut self, label: Option<&str>) {
        if self.state == StackState::Replaying || self.suspended > 0 {
            return;
        }
        self.groups.truncate(self.cursor);
        self.pending = Some(label.map(str::to_owned));
    }

    /// Record one action into the open group.
    ///
    /// Recording before any waypoint auto-opens an unlabelled group.
    pub fn push(&mut self, item: A) {
        if self.state == StackState::Replaying {
            // Replay must never re-record; reaching here is a logic error.
            debug_assert!(false, "recording during replay");
            tracing::error!("action recorded during replay was dropped");
            return;
        }
        if self.suspended > 0 {
            return;
        }
        self.groups.truncate(self.cursor);
        match self.pending.take() {
            Some(label) => self.groups.push_back(WaypointGroup {
                label,
                items: Vec::new(),
            }),
            None if self.groups.is_empty() => self.groups.push_back(WaypointGroup::new(None)),
            None => {}
        }
        if let Some(group) = self.groups.back_mut() {
            group.items.push(item);
        }
        self.cursor = self.groups.len();
        self.enforce_limits();
    }

    /// Undo the most recent applied group.
    ///
    /// Returns `None` with nothing to undo. On `Err` some actions in the
    /// group failed; the cursor has still moved past the group.
    pub fn undo<Ctx>(&mut self, ctx: &mut Ctx) -> Option<Result<usize, ReplayFailure>>
    where
        A: UndoableAction<Ctx>,
    {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        let guard = ReplayGuard::enter(&mut self.state);
        let group = &mut self.groups[self.cursor];
        let attempted = group.items.len();
        let mut errors = Vec::new();
        for action in group.items.iter_mut().rev() {
            if let Err(error) = action.unapply(ctx) {
                warn!(label = action.label(), %error, "undo action failed");
                errors.push(error);
            }
        }
        drop(guard);
        debug!(attempted, failed = errors.len(), "undo group replayed");
        Some(if errors.is_empty() {
            Ok(attempted)
        } else {
            Err(ReplayFailure { attempted, errors })
        })
    }

    /// Redo the next undone group. Mirror of [`UndoStack::undo`].
    pub fn redo<Ctx>(&mut self, ctx: &mut Ctx) -> Option<Result<usize, ReplayFailure>>
    where
        A: UndoableAction<Ctx>,
    {
        if self.cursor >= self.groups.len() {
            return None;
        }
        let guard = ReplayGuard::enter(&mut self.state);
        let group = &mut self.groups[self.cursor];
        let attempted = group.items.len();
        let mut errors = Vec::new();
        for action in group.items.iter_mut() {
            if let Err(error) = action.apply(ctx) {
                warn!(label = action.label(), %error, "redo action failed");
                errors.push(error);
            }
        }
        drop(guard);
        self.cursor += 1;
        debug!(attempted, failed = errors.len(), "redo group replayed");
        Some(if errors.is_empty() {
            Ok(attempted)
        } else {
            Err(ReplayFailure { attempted, errors })
        })
    }

    /// Stop recording until the matching [`UndoStack::resume_recording`].
    /// Calls nest.
    pub fn suspend_recording(&mut self) {
        self.suspended += 1;
    }

    pub fn resume_recording(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.state == StackState::Replaying
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.suspended == 0 && self.state == StackState::Idle
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.groups.len()
    }

    /// Total retained groups, applied and undone.
    #[must_use]
    pub fn waypoint_depth(&self) -> usize {
        self.groups.len()
    }

    /// Groups currently applied (undoable).
    #[must_use]
    pub fn applied_depth(&self) -> usize {
        self.cursor
    }

    /// Label of the group the next undo would revert.
    #[must_use]
    pub fn next_undo_label(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|index| self.groups[index].label.as_deref())
    }

    /// Label of the group the next redo would re-apply.
    #[must_use]
    pub fn next_redo_label(&self) -> Option<&str> {
        self.groups.get(self.cursor).and_then(|g| g.label.as_deref())
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.cursor = 0;
        self.pending = None;
    }

    #[must_use]
    pub fn config(&self) -> UndoConfig {
        self.config
    }

    /// Evict oldest applied groups past the waypoint limit. The redo future
    /// is never evicted.
    fn enforce_limits(&mut self) {
        while self.groups.len() > self.config.max_waypoints && self.cursor > 0 {
            self.groups.pop_front();
            self.cursor -= 1;
        }
    }
}

impl<A> fmt::Debug for UndoStack<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoStack")
            .field("waypoints", &self.groups.len())
            .field("cursor", &self.cursor)
            .field("pending_waypoint", &self.pending.is_some())
            .field("state", &self.state)
            .field("suspended", &self.suspended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::action::FnAction;
    use super::*;

    type Stack = UndoStack<FnAction<Vec<i64>>>;

    fn push_append(stack: &mut Stack, value: i64) {
        stack.push(FnAction::new(
            format!("append {value}"),
            move |log: &mut Vec<i64>| {
                log.push(value);
                Ok(())
            },
            move |log: &mut Vec<i64>| {
                assert_eq!(log.pop(), Some(value));
                Ok(())
            },
        ));
    }

    #[test]
    fn undo_replays_group_in_reverse() {
        let mut stack = Stack::new(UndoConfig::default());
        let mut log = vec![1, 2, 3];
        stack.new_waypoint(Some("fill"));
        push_append(&mut stack, 2);
        push_append(&mut stack, 3);

        let outcome = stack.undo(&mut log).unwrap().unwrap();
        assert_eq!(outcome, 2);
        assert_eq!(log, vec![1]);
        assert!(!stack.can_undo());
        assert!(stack.can_redo());
    }

    #[test]
    fn redo_replays_forward() {
        let mut stack = Stack::new(UndoConfig::default());
        let mut log = vec![1, 2];
        stack.new_waypoint(None);
        push_append(&mut stack, 1);
        push_append(&mut stack, 2);

        stack.undo(&mut log).unwrap().unwrap();
        assert!(log.is_empty());
        stack.redo(&mut log).unwrap().unwrap();
        assert_eq!(log, vec![1, 2]);
        assert!(stack.redo(&mut log).is_none());
    }

    #[test]
    fn recording_truncates_redo_future() {
        let mut stack = Stack::new(UndoConfig::default());
        let mut log = vec![1];
        stack.new_waypoint(Some("one"));
        push_append(&mut stack, 1);
        stack.undo(&mut log).unwrap().unwrap();
        assert!(stack.can_redo());

        stack.new_waypoint(Some("two"));
        push_append(&mut stack, 9);
        assert!(!stack.can_redo());
        assert_eq!(stack.next_undo_label(), Some("two"));
    }

    #[test]
    fn push_before_waypoint_opens_unlabelled_group() {
        let mut stack = Stack::new(UndoConfig::default());
        push_append(&mut stack, 7);
        assert_eq!(stack.waypoint_depth(), 1);
        assert!(stack.can_undo());
        assert_eq!(stack.next_undo_label(), None);
    }

    #[test]
    fn consecutive_waypoints_collapse_to_latest_label() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(Some("first"));
        stack.new_waypoint(Some("second"));
        assert_eq!(stack.waypoint_depth(), 0);

        push_append(&mut stack, 1);
        assert_eq!(stack.waypoint_depth(), 1);
        assert_eq!(stack.next_undo_label(), Some("second"));
    }

    #[test]
    fn open_waypoint_without_edits_is_not_undoable() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(Some("empty"));
        assert!(!stack.can_undo());
        assert_eq!(stack.applied_depth(), 0);
        assert!(stack.undo(&mut Vec::new()).is_none());

        push_append(&mut stack, 1);
        assert!(stack.can_undo());
        assert_eq!(stack.next_undo_label(), Some("empty"));
    }

    #[test]
    fn panicking_action_leaves_stack_recording() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(Some("bad"));
        stack.push(FnAction::new(
            "explode",
            |_: &mut Vec<i64>| Ok(()),
            |_: &mut Vec<i64>| panic!("boom"),
        ));

        let mut log = Vec::new();
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| stack.undo(&mut log)));
        assert!(outcome.is_err());

        // The replay flag was released on unwind, so history keeps working.
        assert!(!stack.is_replaying());
        assert!(stack.is_recording());
        stack.new_waypoint(Some("after"));
        push_append(&mut stack, 1);
        log.push(1);
        stack.undo(&mut log).unwrap().unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn waypoint_limit_evicts_oldest() {
        let mut stack = Stack::new(UndoConfig::new(2));
        for value in 0..3 {
            stack.new_waypoint(Some(&format!("wp{value}")));
            push_append(&mut stack, value);
        }
        assert_eq!(stack.waypoint_depth(), 2);

        let mut log = vec![0, 1, 2];
        let mut undone = 0;
        while stack.undo(&mut log).is_some() {
            undone += 1;
        }
        // The oldest group was evicted; only the retained ones replay.
        assert_eq!(undone, 2);
        assert_eq!(log, vec![0]);
    }

    #[test]
    fn suspension_skips_recording_and_nests() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(None);
        stack.suspend_recording();
        stack.suspend_recording();
        push_append(&mut stack, 1);
        stack.resume_recording();
        push_append(&mut stack, 2);
        stack.resume_recording();
        push_append(&mut stack, 3);

        let mut log = vec![3];
        stack.undo(&mut log).unwrap().unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn failed_replay_reports_errors_and_moves_cursor() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(Some("bad"));
        stack.push(FnAction::new(
            "doomed",
            |_: &mut Vec<i64>| Ok(()),
            |_: &mut Vec<i64>| Err(ReplayError::Failed("gone".into())),
        ));

        let mut log = Vec::new();
        let failure = stack.undo(&mut log).unwrap().unwrap_err();
        assert_eq!(failure.attempted, 1);
        assert_eq!(failure.errors.len(), 1);
        assert!(!stack.can_undo());
        assert!(stack.can_redo());
    }

    #[test]
    fn clear_drops_everything() {
        let mut stack = Stack::new(UndoConfig::default());
        stack.new_waypoint(None);
        push_append(&mut stack, 1);
        stack.clear();
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
        assert_eq!(stack.waypoint_depth(), 0);
    }
}
