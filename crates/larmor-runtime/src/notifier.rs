#![forbid(unsafe_code)]

//! Notifier routing.
//!
//! The [`NotifierRouter`] translates mutation events into subscriber
//! callbacks. Registrations are matched on subject class (exact or via the
//! declared ancestry), trigger kind, and scope, and are invoked in
//! registration order.
//!
//! # Invariants
//!
//! 1. A retired registration is never fired; `Retired` is terminal.
//! 2. Single-object registrations retire automatically when their object is
//!    delivered (or discarded) a DELETE event; project-wide registrations
//!    retire only on explicit unregister.
//! 3. Reentrant `fire` from inside a callback is queued and delivered after
//!    the current dispatch completes; delivery never recurses.
//! 4. A callback panic is caught and logged; remaining subscribers in the
//!    same dispatch are still invoked.
//!
//! # Blocking scopes
//!
//! [`NotifierRouter::block_all`] queues every event and drops the queue when
//! the scope exits; bulk import uses this to avoid notification storms.
//! [`NotifierRouter::block_echo`] queues and then flushes in order on exit,
//! skipping single-object registrations on the owning wrapper, so a widget
//! does not redraw itself from its own edit while every other observer still
//! hears about it. Both are RAII guards and release on all exit paths.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use ahash::AHashMap;
use larmor_model::TypeCode;
use tracing::{debug, debug_span, warn};

use crate::arena::ObjHandle;
use crate::event::{CallbackInfo, Trigger, Triggers};

/// Opaque handle to one registration.
pub type NotifierId = u64;

/// What a registration listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// Every class.
    Any,
    /// One class, or any declared subclass of it.
    Class(TypeCode),
}

/// Where a registration listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierScope {
    /// Events for any object of the subject class.
    Project,
    /// Events for exactly one wrapper.
    Object(ObjHandle),
}

type Callback = Rc<dyn Fn(&CallbackInfo)>;

struct Registration {
    id: NotifierId,
    subject: Subject,
    triggers: Triggers,
    scope: NotifierScope,
    callback: Callback,
    retired: bool,
}

/// How a blocking scope disposes of its queue on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockMode {
    /// Drop queued events (hard blocking).
    Discard,
    /// Flush queued events, skipping single-object registrations on the
    /// owner (echo blocking).
    Echo(ObjHandle),
}

struct QueuedEvent {
    info: CallbackInfo,
    /// Single-object registrations on this wrapper are skipped at delivery.
    skip_owner: Option<ObjHandle>,
}

struct BlockFrame {
    token: u64,
    mode: BlockMode,
    queue: Vec<QueuedEvent>,
}

struct RouterInner {
    registrations: Vec<Registration>,
    next_id: NotifierId,
    /// Declared class ancestry: child class -> direct superclass.
    ancestry: AHashMap<TypeCode, TypeCode>,
    /// True while a dispatch loop is running.
    dispatching: bool,
    /// Events fired reentrantly during a dispatch.
    pending: VecDeque<QueuedEvent>,
    /// Active blocking scopes, innermost last.
    blocks: Vec<BlockFrame>,
    next_block_token: u64,
}

/// Registers, matches, and fires mutation callbacks.
///
/// Cloning a router produces another handle to the same registration table;
/// each project owns exactly one.
#[derive(Clone)]
pub struct NotifierRouter {
    inner: Rc<RefCell<RouterInner>>,
}

impl Default for NotifierRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotifierRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("NotifierRouter")
            .field("registrations", &inner.registrations.len())
            .field("blocks", &inner.blocks.len())
            .field("dispatching", &inner.dispatching)
            .finish()
    }
}

impl NotifierRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RouterInner {
                registrations: Vec::new(),
                next_id: 1,
                ancestry: AHashMap::new(),
                dispatching: false,
                pending: VecDeque::new(),
                blocks: Vec::new(),
                next_block_token: 1,
            })),
        }
    }

    /// Register a callback. Returns the handle used to unregister it.
    pub fn register(
        &self,
        subject: Subject,
        triggers: Triggers,
        scope: NotifierScope,
        callback: impl Fn(&CallbackInfo) + 'static,
    ) -> NotifierId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.registrations.push(Registration {
            id,
            subject,
            triggers,
            scope,
            callback: Rc::new(callback),
            retired: false,
        });
        id
    }

    /// Retire a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: NotifierId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let mut found = false;
        for registration in &mut inner.registrations {
            if registration.id == id && !registration.retired {
                registration.retired = true;
                found = true;
            }
        }
        inner.registrations.retain(|r| !r.retired);
        found
    }

    /// Declare that `child` is a subclass of `parent` for subject matching.
    pub fn declare_superclass(&self, child: TypeCode, parent: TypeCode) {
        self.inner.borrow_mut().ancestry.insert(child, parent);
    }

    /// Number of active registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.inner
            .borrow()
            .registrations
            .iter()
            .filter(|r| !r.retired)
            .count()
    }

    /// Fire one event through matching, blocking, and reentrancy handling.
    pub fn fire(&self, info: CallbackInfo) {
        self.submit(QueuedEvent {
            info,
            skip_owner: None,
        });
    }

    /// Begin a hard-blocking scope: queued events are dropped on exit.
    #[must_use]
    pub fn block_all(&self) -> NotificationBlock {
        self.push_block(BlockMode::Discard)
    }

    /// Begin an echo-blocking scope owned by `owner`: queued events are
    /// flushed in order on exit, skipping single-object registrations on
    /// `owner`.
    #[must_use]
    pub fn block_echo(&self, owner: ObjHandle) -> NotificationBlock {
        self.push_block(BlockMode::Echo(owner))
    }

    fn push_block(&self, mode: BlockMode) -> NotificationBlock {
        let mut inner = self.inner.borrow_mut();
        let token = inner.next_block_token;
        inner.next_block_token += 1;
        inner.blocks.push(BlockFrame {
            token,
            mode,
            queue: Vec::new(),
        });
        NotificationBlock {
            router: self.clone(),
            token,
        }
    }

    fn submit(&self, event: QueuedEvent) {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(frame) = inner.blocks.last_mut() {
                frame.queue.push(event);
                return;
            }
            if inner.dispatching {
                inner.pending.push_back(event);
                return;
            }
            inner.dispatching = true;
        }

        // Reset the dispatching flag even if delivery unwinds.
        let _guard = DispatchGuard {
            inner: Rc::clone(&self.inner),
        };
        let mut next = Some(event);
        while let Some(event) = next {
            self.deliver(event);
            next = self.inner.borrow_mut().pending.pop_front();
        }
    }

    /// Invoke every matching active registration, in registration order.
    fn deliver(&self, event: QueuedEvent) {
        let callbacks: Vec<Callback> = {
            let inner = self.inner.borrow();
            inner
                .registrations
                .iter()
                .filter(|r| inner.matches(r, &event))
                .map(|r| Rc::clone(&r.callback))
                .collect()
        };

        let _span = debug_span!(
            "notify.dispatch",
            trigger = ?event.info.trigger,
            pid = %event.info.pid,
            subscribers = callbacks.len(),
        )
        .entered();

        for callback in callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| callback(&event.info)));
            if result.is_err() {
                warn!(
                    pid = %event.info.pid,
                    trigger = ?event.info.trigger,
                    "notifier callback panicked; delivery continues"
                );
            }
        }

        if event.info.trigger == Trigger::Delete {
            self.retire_object(event.info.object);
        }
    }

    /// Retire every single-object registration on `object`.
    fn retire_object(&self, object: ObjHandle) {
        let mut inner = self.inner.borrow_mut();
        inner
            .registrations
            .retain(|r| r.scope != NotifierScope::Object(object));
    }

    /// Remove a blocking frame and dispose of its queue per its mode.
    fn finish_block(&self, token: u64) {
        let frame = {
            let mut inner = self.inner.borrow_mut();
            let Some(position) = inner.blocks.iter().rposition(|f| f.token == token) else {
                return;
            };
            inner.blocks.remove(position)
        };

        match frame.mode {
            BlockMode::Discard => {
                debug!(dropped = frame.queue.len(), "hard block dropped events");
                // Single-object registrations on dropped deletions still
                // retire; their object is gone and they can never fire.
                for event in &frame.queue {
                    if event.info.trigger == Trigger::Delete {
                        self.retire_object(event.info.object);
                    }
                }
            }
            BlockMode::Echo(owner) => {
                for mut event in frame.queue {
                    // An inner echo scope's filter wins if one was recorded.
                    event.skip_owner.get_or_insert(owner);
                    self.submit(event);
                }
            }
        }
    }

    /// Events queued in the block frame with this token.
    fn block_pending(&self, token: u64) -> usize {
        self.inner
            .borrow()
            .blocks
            .iter()
            .find(|f| f.token == token)
            .map_or(0, |f| f.queue.len())
    }
}

impl RouterInner {
    fn matches(&self, registration: &Registration, event: &QueuedEvent) -> bool {
        if registration.retired {
            return false;
        }
        if !registration.triggers.contains(event.info.trigger.mask()) {
            return false;
        }
        match registration.scope {
            NotifierScope::Project => {}
            NotifierScope::Object(target) => {
                if target != event.info.object {
                    return false;
                }
                if event.skip_owner == Some(target) {
                    return false;
                }
            }
        }
        match &registration.subject {
            Subject::Any => true,
            Subject::Class(class) => self.class_is_a(&event.info.class, class),
        }
    }

    /// Exact match, or `class` descends from `ancestor` in the declared
    /// ancestry. The walk is capped to guard against declaration cycles.
    fn class_is_a(&self, class: &TypeCode, ancestor: &TypeCode) -> bool {
        let mut current = class;
        for _ in 0..64 {
            if current == ancestor {
                return true;
            }
            match self.ancestry.get(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}

struct DispatchGuard {
    inner: Rc<RefCell<RouterInner>>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.inner.borrow_mut().dispatching = false;
    }
}

/// RAII guard for a notification blocking scope.
///
/// Dropping the guard ends the scope: a hard block drops its queue, an echo
/// block flushes it in order minus the owner's own single-object
/// registrations.
pub struct NotificationBlock {
    router: NotifierRouter,
    token: u64,
}

impl NotificationBlock {
    /// Number of events currently queued in this scope.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.router.block_pending(self.token)
    }
}

impl Drop for NotificationBlock {
    fn drop(&mut self) {
        self.router.finish_block(self.token);
    }
}

impl std::fmt::Debug for NotificationBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBlock")
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
