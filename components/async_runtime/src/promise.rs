//! Promise implementation following the Promise/A+ specification.
//!
//! A [`Promise`] is a shared handle to a settle-once state machine. Only the
//! [`Resolve`] and [`Reject`] functions handed to its executor can settle it.
//! Every reaction runs from a microtask deferred through the promise's
//! [`Scheduler`](crate::Scheduler), never synchronously from `then` or from a
//! settlement call.
//!
//! # Examples
//!
//! ```
//! use async_runtime::{EventLoop, Promise, PromiseState};
//! use core_types::{Function, Value};
//!
//! let mut event_loop = EventLoop::new();
//! let scheduler = event_loop.scheduler();
//!
//! let promise = Promise::new(&scheduler, |resolve, _reject| {
//!     resolve.call(Value::Smi(1));
//!     Ok(())
//! });
//! let chained = promise.then(
//!     Some(Function::new(|_, args| match Function::arg(&args, 0) {
//!         Value::Smi(n) => Ok(n.checked_add(1).map_or(Value::Double(f64::from(n) + 1.0), Value::Smi)),
//!         other => Ok(other),
//!     })),
//!     None,
//! );
//! assert_eq!(chained.state(), PromiseState::Pending);
//!
//! event_loop.run_until_done().unwrap();
//! assert_eq!(chained.result(), Some(Value::Smi(2)));
//! ```

use crate::task_queue::{MicroTask, SchedulerRef};
use core_types::{Function, JsError, JsResult, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// The state of a Promise.
///
/// Once settled (Fulfilled or Rejected), a Promise cannot change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// The initial state; the promise is neither fulfilled nor rejected.
    Pending,
    /// The promise has been resolved with a value.
    Fulfilled,
    /// The promise has been rejected with a reason.
    Rejected,
}

#[derive(Debug, Clone)]
enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

enum Status {
    Pending(Vec<PromiseReaction>),
    Settled(Settlement),
}

/// A reaction registered via `then`.
///
/// Consumed exactly once: scheduled when the parent settles, or at
/// registration if the parent already has.
struct PromiseReaction {
    on_fulfilled: Option<Function>,
    on_rejected: Option<Function>,
    resolve: Resolve,
    reject: Reject,
}

impl PromiseReaction {
    fn run(self, settlement: Settlement) {
        let (handler, argument, rejected) = match settlement {
            Settlement::Fulfilled(value) => (self.on_fulfilled, value, false),
            Settlement::Rejected(reason) => (self.on_rejected, reason, true),
        };
        match handler {
            Some(handler) => match handler.call(Value::Undefined, vec![argument]) {
                Ok(value) => self.resolve.call(value),
                Err(thrown) => self.reject.call(thrown),
            },
            None if rejected => self.reject.call(argument),
            None => self.resolve.call(argument),
        }
    }
}

struct PromiseRecord {
    id: u64,
    status: Status,
    scheduler: SchedulerRef,
}

/// A JavaScript Promise.
///
/// Cloning yields another handle to the same promise.
#[derive(Clone)]
pub struct Promise {
    record: Rc<RefCell<PromiseRecord>>,
}

impl Promise {
    /// Creates a promise and runs `executor` synchronously.
    ///
    /// The executor receives the promise's resolving functions. If it
    /// returns `Err`, the thrown value rejects the promise, unless one of the
    /// resolving functions was already called.
    pub fn new<F>(scheduler: &SchedulerRef, executor: F) -> Promise
    where
        F: FnOnce(Resolve, Reject) -> JsResult<()>,
    {
        let promise = Promise::pending(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        if let Err(thrown) = executor(resolve, reject.clone()) {
            trace!(promise = promise.id(), "executor threw");
            reject.call(thrown);
        }
        promise
    }

    pub(crate) fn pending(scheduler: &SchedulerRef) -> Promise {
        let id = NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed);
        trace!(promise = id, "promise created");
        Promise {
            record: Rc::new(RefCell::new(PromiseRecord {
                id,
                status: Status::Pending(Vec::new()),
                scheduler: Rc::clone(scheduler),
            })),
        }
    }

    /// Creates a fresh pair of resolving functions sharing one
    /// "already resolved" flag.
    pub(crate) fn resolving_functions(&self) -> (Resolve, Reject) {
        let already_resolved = Rc::new(Cell::new(false));
        (
            Resolve {
                promise: self.clone(),
                already_resolved: Rc::clone(&already_resolved),
            },
            Reject {
                promise: self.clone(),
                already_resolved,
            },
        )
    }

    /// Process-unique identifier, used in logs.
    pub fn id(&self) -> u64 {
        self.record.borrow().id
    }

    /// Current state.
    pub fn state(&self) -> PromiseState {
        match &self.record.borrow().status {
            Status::Pending(_) => PromiseState::Pending,
            Status::Settled(Settlement::Fulfilled(_)) => PromiseState::Fulfilled,
            Status::Settled(Settlement::Rejected(_)) => PromiseState::Rejected,
        }
    }

    /// Returns true while the promise is pending.
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The fulfillment value or rejection reason, once settled.
    pub fn result(&self) -> Option<Value> {
        match &self.record.borrow().status {
            Status::Pending(_) => None,
            Status::Settled(Settlement::Fulfilled(value))
            | Status::Settled(Settlement::Rejected(value)) => Some(value.clone()),
        }
    }

    /// Returns true if both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }

    /// Wraps this promise as a [`Value`].
    pub fn to_value(&self) -> Value {
        Value::native(Rc::clone(&self.record))
    }

    /// Recovers a promise from a [`Value`] produced by [`Promise::to_value`].
    pub fn from_value(value: &Value) -> Option<Promise> {
        value
            .downcast_native::<RefCell<PromiseRecord>>()
            .map(|record| Promise { record })
    }

    pub(crate) fn scheduler(&self) -> SchedulerRef {
        Rc::clone(&self.record.borrow().scheduler)
    }

    /// Registers fulfillment and rejection handlers.
    ///
    /// Returns a new pending promise immediately. Once this promise settles,
    /// the matching handler runs from a microtask with the result as its only
    /// argument; its return value resolves the returned promise, a thrown
    /// value rejects it. A missing handler passes the outcome through.
    pub fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Promise {
        let child = Promise::pending(&self.scheduler());
        let (resolve, reject) = child.resolving_functions();
        self.add_reaction(PromiseReaction {
            on_fulfilled,
            on_rejected,
            resolve,
            reject,
        });
        child
    }

    /// Dynamic form of [`Promise::then`]: non-callable arguments are ignored.
    pub fn then_values(&self, on_fulfilled: Value, on_rejected: Value) -> Promise {
        self.then(
            on_fulfilled.as_function().cloned(),
            on_rejected.as_function().cloned(),
        )
    }

    /// Registers a rejection handler; same as `then(None, on_rejected)`.
    pub fn catch(&self, on_rejected: Option<Function>) -> Promise {
        self.then(None, on_rejected)
    }

    /// Registers a handler that runs on either outcome.
    ///
    /// `on_finally` is called with no arguments and cannot see the outcome.
    /// The returned promise settles like this one, unless `on_finally` throws
    /// or returns a thenable that rejects; that reason then wins.
    pub fn finally(&self, on_finally: Option<Function>) -> Promise {
        let Some(on_finally) = on_finally else {
            return self.then(None, None);
        };
        let scheduler = self.scheduler();

        let on_fulfilled = {
            let (on_finally, scheduler) = (on_finally.clone(), scheduler.clone());
            Function::new(move |_, args| {
                let value = Function::arg(&args, 0);
                let outcome = on_finally.call(Value::Undefined, vec![])?;
                let restore = Function::new(move |_, _| Ok(value.clone()));
                Ok(Promise::resolve(&scheduler, outcome)
                    .then(Some(restore), None)
                    .to_value())
            })
        };
        let on_rejected = Function::new(move |_, args| {
            let reason = Function::arg(&args, 0);
            let outcome = on_finally.call(Value::Undefined, vec![])?;
            let rethrow = Function::new(move |_, _| Err(reason.clone()));
            Ok(Promise::resolve(&scheduler, outcome)
                .then(Some(rethrow), None)
                .to_value())
        });

        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    fn add_reaction(&self, reaction: PromiseReaction) {
        let (settlement, scheduler) = {
            let mut record = self.record.borrow_mut();
            let scheduler = Rc::clone(&record.scheduler);
            let id = record.id;
            match &mut record.status {
                Status::Pending(reactions) => {
                    reactions.push(reaction);
                    trace!(promise = id, queued = reactions.len(), "reaction queued");
                    return;
                }
                Status::Settled(settlement) => (settlement.clone(), scheduler),
            }
        };
        trace!(promise = self.id(), "reaction on settled promise");
        schedule_reaction(&scheduler, reaction, settlement);
    }

    /// Transitions out of Pending; no-op once settled.
    fn settle(&self, settlement: Settlement) {
        let (id, reactions, scheduler) = {
            let mut record = self.record.borrow_mut();
            let reactions = match &mut record.status {
                Status::Pending(reactions) => std::mem::take(reactions),
                Status::Settled(_) => return,
            };
            record.status = Status::Settled(settlement.clone());
            (record.id, reactions, Rc::clone(&record.scheduler))
        };

        match &settlement {
            Settlement::Fulfilled(_) => {
                debug!(promise = id, reactions = reactions.len(), "promise fulfilled")
            }
            Settlement::Rejected(reason) if reactions.is_empty() => {
                debug!(promise = id, reason = %reason, "promise rejected with no reactions")
            }
            Settlement::Rejected(_) => {
                debug!(promise = id, reactions = reactions.len(), "promise rejected")
            }
        }

        for reaction in reactions {
            schedule_reaction(&scheduler, reaction, settlement.clone());
        }
    }

    fn fulfill(&self, value: Value) {
        self.settle(Settlement::Fulfilled(value));
    }

    fn reject_with(&self, reason: Value) {
        self.settle(Settlement::Rejected(reason));
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("result", &self.result())
            .finish()
    }
}

fn schedule_reaction(scheduler: &SchedulerRef, reaction: PromiseReaction, settlement: Settlement) {
    scheduler.defer(MicroTask::new(move || reaction.run(settlement)));
}

/// Settles `promise` with `x`, unwrapping promises and thenables first.
fn resolve_promise_with(promise: &Promise, x: Value) {
    if let Some(other) = Promise::from_value(&x) {
        if other.ptr_eq(promise) {
            promise.reject_with(JsError::type_error("Chaining cycle detected for promise").into());
            return;
        }
        trace!(promise = promise.id(), adopted = other.id(), "adopting promise");
        let (resolve, reject) = promise.resolving_functions();
        other.add_reaction(PromiseReaction {
            on_fulfilled: None,
            on_rejected: None,
            resolve,
            reject,
        });
        return;
    }

    if x.is_object_like() && x.has_property("then") {
        // Read once: a getter may return a different function on each access.
        let then = match x.get_property("then") {
            Ok(then) => then,
            Err(thrown) => {
                promise.reject_with(thrown);
                return;
            }
        };
        if let Some(then) = then.as_function().cloned() {
            let target = promise.clone();
            promise.scheduler().defer(MicroTask::new(move || {
                trace!(promise = target.id(), "calling thenable");
                let (resolve_once, reject_once) = target.resolving_functions();
                let callbacks = vec![
                    Value::Function(resolve_once.to_function()),
                    Value::Function(reject_once.to_function()),
                ];
                if let Err(thrown) = then.call(x, callbacks) {
                    reject_once.call(thrown);
                }
            }));
            return;
        }
    }

    promise.fulfill(x);
}

/// The resolve half of a promise's resolving functions.
///
/// Shares an "already resolved" flag with its [`Reject`] twin; only the first
/// call of either has any effect.
#[derive(Clone)]
pub struct Resolve {
    promise: Promise,
    already_resolved: Rc<Cell<bool>>,
}

impl Resolve {
    /// Resolves the promise with `value`, unwrapping promises and thenables.
    pub fn call(&self, value: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        resolve_promise_with(&self.promise, value);
    }

    /// Returns true once either resolving function has been called.
    pub fn is_spent(&self) -> bool {
        self.already_resolved.get()
    }

    /// Exposes this resolving function as a callable value.
    pub fn to_function(&self) -> Function {
        let resolve = self.clone();
        Function::new(move |_, args| {
            resolve.call(Function::arg(&args, 0));
            Ok(Value::Undefined)
        })
    }
}

impl fmt::Debug for Resolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("promise", &self.promise.id())
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// The reject half of a promise's resolving functions.
///
/// Rejection reasons are taken verbatim, thenables included.
#[derive(Clone)]
pub struct Reject {
    promise: Promise,
    already_resolved: Rc<Cell<bool>>,
}

impl Reject {
    /// Rejects the promise with `reason`.
    pub fn call(&self, reason: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.reject_with(reason);
    }

    /// Returns true once either resolving function has been called.
    pub fn is_spent(&self) -> bool {
        self.already_resolved.get()
    }

    /// Exposes this resolving function as a callable value.
    pub fn to_function(&self) -> Function {
        let reject = self.clone();
        Function::new(move |_, args| {
            reject.call(Function::arg(&args, 0));
            Ok(Value::Undefined)
        })
    }
}

impl fmt::Debug for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("promise", &self.promise.id())
            .field("spent", &self.is_spent())
            .finish()
    }
}
