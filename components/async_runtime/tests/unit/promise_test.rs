//! Unit tests for Promise

use crate::support::*;
use async_runtime::{EventLoop, EventLoopConfig, Promise, PromiseState};
use core_types::{ErrorKind, Function, JsError, Object, Value};
use std::cell::Cell;
use std::rc::Rc;

mod state_machine {
    use super::*;

    #[test]
    fn new_promise_is_pending() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |_, _| Ok(()));
        assert_eq!(promise.state(), PromiseState::Pending);
        assert!(promise.result().is_none());
    }

    #[test]
    fn executor_runs_synchronously() {
        let (_el, scheduler) = setup();
        let ran = Cell::new(false);
        let _promise = Promise::new(&scheduler, |_, _| {
            ran.set(true);
            Ok(())
        });
        assert!(ran.get());
    }

    #[test]
    fn resolve_with_plain_value_fulfills() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |resolve, _| {
            resolve.call(Value::Smi(42));
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::Smi(42)));
    }

    #[test]
    fn cannot_resolve_already_fulfilled_promise() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |resolve, reject| {
            resolve.call(Value::Smi(42));
            resolve.call(Value::Smi(100));
            reject.call(Value::from("late"));
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::Smi(42)));
    }

    #[test]
    fn cannot_resolve_already_rejected_promise() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |resolve, reject| {
            reject.call(Value::from("no"));
            resolve.call(Value::Smi(42));
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("no")));
    }

    #[test]
    fn executor_error_rejects() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |_, _| Err(JsError::error("oops").into()));
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::Error(JsError::error("oops"))));
    }

    #[test]
    fn executor_error_after_resolve_is_ignored() {
        let (_el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |resolve, _| {
            resolve.call(Value::Smi(1));
            Err(Value::from("ignored"))
        });
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::Smi(1)));
    }

    #[test]
    fn resolving_with_pending_promise_locks_out_reject() {
        let (mut el, scheduler) = setup();
        let inner = Promise::deferred(&scheduler);
        let outer = Promise::new(&scheduler, |resolve, reject| {
            resolve.call(inner.promise.to_value());
            reject.call(Value::from("too late"));
            Ok(())
        });
        assert!(outer.is_pending());

        inner.resolve.call(Value::from("inner"));
        el.run_until_done().unwrap();

        assert_eq!(outer.state(), PromiseState::Fulfilled);
        assert_eq!(outer.result(), Some(Value::from("inner")));
    }

    #[test]
    fn rejection_reason_is_not_unwrapped() {
        let (mut el, scheduler) = setup();
        let fulfilled = Promise::resolve(&scheduler, Value::Smi(1));
        let rejected = Promise::reject(&scheduler, fulfilled.to_value());
        el.run_until_done().unwrap();

        assert_eq!(rejected.state(), PromiseState::Rejected);
        let reason = rejected.result().unwrap();
        assert!(Promise::from_value(&reason).unwrap().ptr_eq(&fulfilled));
    }

    #[test]
    fn promises_have_distinct_ids() {
        let (_el, scheduler) = setup();
        let a = Promise::deferred(&scheduler).promise;
        let b = Promise::deferred(&scheduler).promise;
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn debug_output_shows_state() {
        let (_el, scheduler) = setup();
        let promise = Promise::resolve(&scheduler, Value::Smi(3));
        let debug = format!("{:?}", promise);
        assert!(debug.contains("Fulfilled"));
        assert!(debug.contains("Smi(3)"));
    }
}

mod chaining {
    use super::*;

    #[test]
    fn then_returns_new_pending_promise() {
        let (_el, scheduler) = setup();
        let promise = Promise::resolve(&scheduler, Value::Smi(1));
        let chained = promise.then(None, None);
        assert!(!chained.ptr_eq(&promise));
        assert_eq!(chained.state(), PromiseState::Pending);
    }

    #[test]
    fn then_returns_before_handlers_run() {
        let (mut el, scheduler) = setup();
        let log = Log::new();
        let promise = Promise::resolve(&scheduler, Value::Smi(1));
        promise.then(Some(log.tag("handler")), None);
        log.push("after then");
        el.run_until_done().unwrap();
        assert_eq!(log.entries(), strs(&["after then", "handler"]));
    }

    #[test]
    fn scenario_then_adds_one() {
        let (mut el, scheduler) = setup();
        let promise = Promise::new(&scheduler, |resolve, _| {
            resolve.call(Value::Smi(1));
            Ok(())
        })
        .then(Some(add(1)), None);
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::Smi(2)));
    }

    #[test]
    fn handlers_registered_before_settlement_run_in_order() {
        let (mut el, scheduler) = setup();
        let log = Log::new();
        let deferred = Promise::deferred(&scheduler);
        for label in ["a", "b", "c"] {
            deferred.promise.then(Some(log.tag(label)), None);
        }
        el.run_until_done().unwrap();
        assert_eq!(log.len(), 0);

        deferred.resolve.call(Value::Undefined);
        el.run_until_done().unwrap();
        assert_eq!(log.entries(), strs(&["a", "b", "c"]));
    }

    #[test]
    fn handlers_registered_after_settlement_still_run() {
        let (mut el, scheduler) = setup();
        let log = Log::new();
        let promise = Promise::resolve(&scheduler, Value::Smi(5));
        el.run_until_done().unwrap();

        promise.then(Some(log.record()), None);
        promise.then(Some(log.record()), None);
        el.run_until_done().unwrap();
        assert_eq!(log.entries(), vec![Value::Smi(5), Value::Smi(5)]);
    }

    #[test]
    fn handler_error_rejects_child() {
        let (mut el, scheduler) = setup();
        let child = Promise::resolve(&scheduler, Value::Smi(1))
            .then(Some(thrower(JsError::error("bad").into())), None);
        el.run_until_done().unwrap();
        assert_eq!(child.state(), PromiseState::Rejected);
        assert_eq!(child.result(), Some(Value::Error(JsError::error("bad"))));
    }

    #[test]
    fn fulfillment_falls_through_missing_handler() {
        let (mut el, scheduler) = setup();
        let end = Promise::resolve(&scheduler, Value::Smi(7))
            .then(None, Some(add(100)))
            .then(None, None)
            .then(Some(add(1)), None);
        el.run_until_done().unwrap();
        assert_eq!(end.result(), Some(Value::Smi(8)));
    }

    #[test]
    fn rejection_falls_through_missing_handler() {
        let (mut el, scheduler) = setup();
        let end = Promise::reject(&scheduler, Value::from("r"))
            .then(Some(add(1)), None)
            .then(None, None);
        el.run_until_done().unwrap();
        assert_eq!(end.state(), PromiseState::Rejected);
        assert_eq!(end.result(), Some(Value::from("r")));
    }

    #[test]
    fn then_values_ignores_non_callables() {
        let (mut el, scheduler) = setup();
        let fulfilled = Promise::resolve(&scheduler, Value::Smi(1))
            .then_values(Value::Smi(5), Value::Null);
        let rejected = Promise::reject(&scheduler, Value::from("r"))
            .then_values(Value::Undefined, Value::from("not a function"));
        el.run_until_done().unwrap();
        assert_eq!(fulfilled.result(), Some(Value::Smi(1)));
        assert_eq!(rejected.state(), PromiseState::Rejected);
        assert_eq!(rejected.result(), Some(Value::from("r")));
    }

    #[test]
    fn then_values_calls_function_values() {
        let (mut el, scheduler) = setup();
        let child = Promise::resolve(&scheduler, Value::Smi(1))
            .then_values(Value::Function(add(2)), Value::Undefined);
        el.run_until_done().unwrap();
        assert_eq!(child.result(), Some(Value::Smi(3)));
    }

    #[test]
    fn scenario_catch_recovers() {
        let (mut el, scheduler) = setup();
        let recovered = Promise::reject(&scheduler, Value::from("e")).catch(Some(handler(
            |reason| Ok(Value::from(format!("{}!", reason))),
        )));
        el.run_until_done().unwrap();
        assert_eq!(recovered.state(), PromiseState::Fulfilled);
        assert_eq!(recovered.result(), Some(Value::from("e!")));
    }

    #[test]
    fn catch_passes_fulfillment_through() {
        let (mut el, scheduler) = setup();
        let promise = Promise::resolve(&scheduler, Value::Smi(4)).catch(Some(add(10)));
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::Smi(4)));
    }

    #[test]
    fn handler_returning_promise_is_adopted() {
        let (mut el, scheduler) = setup();
        let inner = Promise::deferred(&scheduler);
        let inner_value = inner.promise.to_value();
        let child = Promise::resolve(&scheduler, Value::Smi(1))
            .then(Some(handler(move |_| Ok(inner_value.clone()))), None);
        el.run_until_done().unwrap();
        assert!(child.is_pending());

        inner.reject.call(Value::from("inner failed"));
        el.run_until_done().unwrap();
        assert_eq!(child.state(), PromiseState::Rejected);
        assert_eq!(child.result(), Some(Value::from("inner failed")));
    }

    #[test]
    fn handler_returning_its_own_child_rejects_with_cycle_error() {
        let (mut el, scheduler) = setup();
        let slot: Rc<std::cell::RefCell<Option<Promise>>> = Rc::default();
        let s = slot.clone();
        let child = Promise::resolve(&scheduler, Value::Smi(1)).then(
            Some(handler(move |_| {
                Ok(s.borrow().as_ref().map(Promise::to_value).unwrap_or_default())
            })),
            None,
        );
        *slot.borrow_mut() = Some(child.clone());
        el.run_until_done().unwrap();

        assert_eq!(child.state(), PromiseState::Rejected);
        match child.result() {
            Some(Value::Error(error)) => assert_eq!(error.kind, ErrorKind::TypeError),
            other => panic!("expected TypeError, got {:?}", other),
        }
    }
}

mod finally {
    use super::*;

    #[test]
    fn finally_runs_on_fulfillment_without_changing_value() {
        let (mut el, scheduler) = setup();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let child = Promise::resolve(&scheduler, Value::Smi(9)).finally(Some(Function::new(
            move |_, args| {
                assert!(args.is_empty());
                c.set(c.get() + 1);
                Ok(Value::from("ignored"))
            },
        )));
        el.run_until_done().unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(child.result(), Some(Value::Smi(9)));
    }

    #[test]
    fn finally_runs_on_rejection_without_changing_reason() {
        let (mut el, scheduler) = setup();
        let log = Log::new();
        let child = Promise::reject(&scheduler, Value::from("r")).finally(Some(log.tag("cleanup")));
        el.run_until_done().unwrap();
        assert_eq!(log.entries(), strs(&["cleanup"]));
        assert_eq!(child.state(), PromiseState::Rejected);
        assert_eq!(child.result(), Some(Value::from("r")));
    }

    #[test]
    fn finally_error_overrides_outcome() {
        let (mut el, scheduler) = setup();
        let child = Promise::resolve(&scheduler, Value::Smi(1))
            .finally(Some(thrower(Value::from("cleanup failed"))));
        el.run_until_done().unwrap();
        assert_eq!(child.state(), PromiseState::Rejected);
        assert_eq!(child.result(), Some(Value::from("cleanup failed")));
    }

    #[test]
    fn finally_waits_for_returned_promise() {
        let (mut el, scheduler) = setup();
        let gate = Promise::deferred(&scheduler);
        let gate_value = gate.promise.to_value();
        let child = Promise::resolve(&scheduler, Value::Smi(1))
            .finally(Some(Function::new(move |_, _| Ok(gate_value.clone()))));
        el.run_until_done().unwrap();
        assert!(child.is_pending());

        gate.resolve.call(Value::from("gate value"));
        el.run_until_done().unwrap();
        assert_eq!(child.result(), Some(Value::Smi(1)));
    }

    #[test]
    fn finally_returned_rejection_overrides_outcome() {
        let (mut el, scheduler) = setup();
        let s = scheduler.clone();
        let child = Promise::reject(&scheduler, Value::from("original")).finally(Some(
            Function::new(move |_, _| Ok(Promise::reject(&s, Value::from("override")).to_value())),
        ));
        el.run_until_done().unwrap();
        assert_eq!(child.state(), PromiseState::Rejected);
        assert_eq!(child.result(), Some(Value::from("override")));
    }

    #[test]
    fn finally_without_handler_passes_through() {
        let (mut el, scheduler) = setup();
        let child = Promise::resolve(&scheduler, Value::Smi(2)).finally(None);
        el.run_until_done().unwrap();
        assert_eq!(child.result(), Some(Value::Smi(2)));
    }
}

mod resolution {
    use super::*;

    #[test]
    fn adopts_own_promise_fulfillment() {
        let (mut el, scheduler) = setup();
        let inner = Promise::deferred(&scheduler);
        let outer = Promise::resolve(&scheduler, Value::Smi(0))
            .then(Some(handler({
                let v = inner.promise.to_value();
                move |_| Ok(v.clone())
            })), None);
        inner.resolve.call(Value::from("adopted"));
        el.run_until_done().unwrap();
        assert_eq!(outer.result(), Some(Value::from("adopted")));
    }

    #[test]
    fn scenario_throwing_then_rejects() {
        let (mut el, scheduler) = setup();
        let promise = Promise::resolve(
            &scheduler,
            thenable(Function::new(|_, _| Err(JsError::error("boom").into()))),
        );
        el.run_until_done().unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected);
        match promise.result() {
            Some(Value::Error(error)) => assert_eq!(error.message, "boom"),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn throwing_then_getter_rejects() {
        let (mut el, scheduler) = setup();
        let obj = Object::new().with_getter("then", thrower(Value::from("getter threw")));
        let promise = Promise::resolve(&scheduler, Value::Object(obj));
        el.run_until_done().unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("getter threw")));
    }

    #[test]
    fn then_getter_is_read_once() {
        let (mut el, scheduler) = setup();
        let reads = Rc::new(Cell::new(0));
        let r = reads.clone();
        let obj = Object::new().with_getter(
            "then",
            Function::new(move |_, _| {
                r.set(r.get() + 1);
                Ok(Value::Function(Function::new(|_, args| {
                    Function::arg(&args, 0)
                        .as_function()
                        .map(|resolve| resolve.call(Value::Undefined, vec![Value::Smi(1)]))
                        .unwrap_or(Ok(Value::Undefined))
                })))
            }),
        );
        let promise = Promise::resolve(&scheduler, Value::Object(obj));
        el.run_until_done().unwrap();
        assert_eq!(reads.get(), 1);
        assert_eq!(promise.result(), Some(Value::Smi(1)));
    }

    #[test]
    fn then_is_called_with_thenable_as_receiver() {
        let (mut el, scheduler) = setup();
        let obj = Object::new().with("value", Value::from("from receiver"));
        obj.set(
            "then",
            Function::new(|this, args| {
                let value = this.get_property("value")?;
                match Function::arg(&args, 0) {
                    Value::Function(resolve) => resolve.call(Value::Undefined, vec![value]),
                    _ => Ok(Value::Undefined),
                }
            }),
        );
        let promise = Promise::resolve(&scheduler, Value::Object(obj));
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::from("from receiver")));
    }

    #[test]
    fn non_callable_then_fulfills_with_object() {
        let (mut el, scheduler) = setup();
        let obj = Value::Object(Object::new().with("then", Value::Smi(5)));
        let promise = Promise::resolve(&scheduler, obj.clone());
        el.run_until_done().unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(obj));
    }

    #[test]
    fn callable_with_then_property_is_thenable() {
        let (mut el, scheduler) = setup();
        let func = Function::new(|_, _| Ok(Value::Undefined));
        func.properties().set(
            "then",
            Function::new(|_, args| match Function::arg(&args, 0) {
                Value::Function(resolve) => resolve.call(Value::Undefined, vec![Value::Smi(11)]),
                _ => Ok(Value::Undefined),
            }),
        );
        let promise = Promise::resolve(&scheduler, Value::Function(func));
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::Smi(11)));
    }

    #[test]
    fn thenable_calling_both_callbacks_keeps_first() {
        let (mut el, scheduler) = setup();
        let promise = Promise::resolve(
            &scheduler,
            thenable(Function::new(|_, args| {
                let resolve = Function::arg(&args, 0);
                let reject = Function::arg(&args, 1);
                reject.as_function().unwrap().call(Value::Undefined, vec![Value::from("first")])?;
                resolve.as_function().unwrap().call(Value::Undefined, vec![Value::from("second")])?;
                Ok(Value::Undefined)
            })),
        );
        el.run_until_done().unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("first")));
    }

    #[test]
    fn thenable_calling_resolve_twice_keeps_first() {
        let (mut el, scheduler) = setup();
        let promise = Promise::resolve(
            &scheduler,
            thenable(Function::new(|_, args| {
                let resolve = Function::arg(&args, 0);
                let resolve = resolve.as_function().unwrap();
                resolve.call(Value::Undefined, vec![Value::Smi(1)])?;
                resolve.call(Value::Undefined, vec![Value::Smi(2)])?;
                Ok(Value::Undefined)
            })),
        );
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::Smi(1)));
    }

    #[test]
    fn thenable_throwing_after_resolve_is_ignored() {
        let (mut el, scheduler) = setup();
        let promise = Promise::resolve(
            &scheduler,
            thenable(Function::new(|_, args| {
                Function::arg(&args, 0)
                    .as_function()
                    .unwrap()
                    .call(Value::Undefined, vec![Value::from("ok")])?;
                Err(Value::from("thrown afterwards"))
            })),
        );
        el.run_until_done().unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from("ok")));
    }

    #[test]
    fn nested_thenables_unwrap_fully() {
        let (mut el, scheduler) = setup();
        fn wrap(inner: Value) -> Value {
            thenable(Function::new(move |_, args| {
                Function::arg(&args, 0)
                    .as_function()
                    .unwrap()
                    .call(Value::Undefined, vec![inner.clone()])
            }))
        }
        let mut value = Value::from("core");
        for _ in 0..50 {
            value = wrap(value);
        }
        let promise = Promise::resolve(&scheduler, value);
        el.run_until_done().unwrap();
        assert_eq!(promise.result(), Some(Value::from("core")));
    }

    #[test]
    fn circular_thenables_exhaust_bounded_loop() {
        init_test_logging();
        let mut el = EventLoop::with_config(EventLoopConfig::bounded(1_000));
        let scheduler = el.scheduler();

        // a resolves with b, b resolves with a
        let a = Object::new();
        let b = Object::new();
        for (holder, target) in [(&a, &b), (&b, &a)] {
            let target = Value::Object(target.clone());
            holder.set(
                "then",
                Function::new(move |_, args| {
                    Function::arg(&args, 0)
                        .as_function()
                        .unwrap()
                        .call(Value::Undefined, vec![target.clone()])
                }),
            );
        }
        let promise = Promise::resolve(&scheduler, Value::Object(a));

        let error = el.run_until_done().unwrap_err();
        assert_eq!(error.kind, ErrorKind::InternalError);
        assert!(promise.is_pending());
    }

    #[test]
    fn other_implementation_promises_interoperate() {
        // A foreign promise exposes `then` that forwards to one of ours.
        let (mut el, scheduler) = setup();
        let backing = Promise::resolve(&scheduler, Value::Smi(21));
        let foreign = thenable(Function::new(move |_, args| {
            let child = backing.then_values(Function::arg(&args, 0), Function::arg(&args, 1));
            Ok(child.to_value())
        }));
        let result = Promise::resolve(&scheduler, foreign).then(Some(add(21)), None);
        el.run_until_done().unwrap();
        assert_eq!(result.result(), Some(Value::Smi(42)));
    }
}
