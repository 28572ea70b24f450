//! Static promise constructors and multi-promise combinators.

use crate::promise::{Promise, Reject, Resolve};
use crate::task_queue::SchedulerRef;
use core_types::{Function, JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A pending promise together with its resolving functions.
///
/// Lets a caller settle a promise from outside an executor, which is what
/// conformance harnesses drive.
///
/// ```
/// use async_runtime::{EventLoop, Promise, PromiseState};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let deferred = Promise::deferred(&event_loop.scheduler());
/// deferred.resolve.call(Value::Smi(7));
/// assert_eq!(deferred.promise.state(), PromiseState::Fulfilled);
/// ```
#[derive(Debug, Clone)]
pub struct Deferred {
    /// The controlled promise
    pub promise: Promise,
    /// Resolves `promise`
    pub resolve: Resolve,
    /// Rejects `promise`
    pub reject: Reject,
}

fn not_an_array() -> Value {
    JsError::type_error("argument must be an array").into()
}

impl Promise {
    /// Returns a promise resolved with `value`.
    ///
    /// A promise of this runtime is returned unchanged. Anything else goes
    /// through the resolution procedure, so thenables are adopted rather than
    /// used as the fulfillment value.
    pub fn resolve(scheduler: &SchedulerRef, value: Value) -> Promise {
        if let Some(promise) = Promise::from_value(&value) {
            return promise;
        }
        Promise::new(scheduler, move |resolve, _| {
            resolve.call(value);
            Ok(())
        })
    }

    /// Returns a promise rejected with `reason`.
    pub fn reject(scheduler: &SchedulerRef, reason: Value) -> Promise {
        Promise::new(scheduler, move |_, reject| {
            reject.call(reason);
            Ok(())
        })
    }

    /// Creates a pending promise and hands back its resolving functions.
    pub fn deferred(scheduler: &SchedulerRef) -> Deferred {
        let promise = Promise::pending(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        Deferred {
            promise,
            resolve,
            reject,
        }
    }

    /// Waits for every item of the array `items`.
    ///
    /// Fulfills with an array of results in input order. Items that are not
    /// promises count as already fulfilled. The first rejection rejects the
    /// aggregate. A non-array input rejects with a `TypeError`.
    pub fn all(scheduler: &SchedulerRef, items: Value) -> Promise {
        Promise::new(scheduler, move |resolve, reject| {
            let items = items.as_array().ok_or_else(not_an_array)?;
            if items.is_empty() {
                resolve.call(Value::array(vec![]));
                return Ok(());
            }

            let slots = Rc::new(AllSlots {
                values: RefCell::new(vec![Value::Undefined; items.len()]),
                remaining: Cell::new(items.len()),
                resolve,
            });
            for (index, item) in items.into_iter().enumerate() {
                match Promise::from_value(&item) {
                    Some(promise) => {
                        let slots = Rc::clone(&slots);
                        let on_fulfilled = Function::new(move |_, args| {
                            slots.fill(index, Function::arg(&args, 0));
                            Ok(Value::Undefined)
                        });
                        promise.then(Some(on_fulfilled), Some(reject.to_function()));
                    }
                    None => slots.fill(index, item),
                }
            }
            Ok(())
        })
    }

    /// Settles like whichever item of the array `items` settles first.
    ///
    /// Items that are not promises win immediately. An empty array fulfills
    /// with that same array. A non-array input rejects with a `TypeError`.
    pub fn race(scheduler: &SchedulerRef, items: Value) -> Promise {
        Promise::new(scheduler, move |resolve, reject| {
            let list = items.as_array().ok_or_else(not_an_array)?;
            if list.is_empty() {
                resolve.call(items);
                return Ok(());
            }

            for item in list {
                match Promise::from_value(&item) {
                    Some(promise) => {
                        promise.then(Some(resolve.to_function()), Some(reject.to_function()));
                    }
                    None => resolve.call(item),
                }
            }
            Ok(())
        })
    }
}

struct AllSlots {
    values: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
    resolve: Resolve,
}

impl AllSlots {
    fn fill(&self, index: usize, value: Value) {
        self.values.borrow_mut()[index] = value;
        let remaining = self.remaining.get() - 1;
        self.remaining.set(remaining);
        if remaining == 0 {
            let values = std::mem::take(&mut *self.values.borrow_mut());
            self.resolve.call(Value::array(values));
        }
    }
}
