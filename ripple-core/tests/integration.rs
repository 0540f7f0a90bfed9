//! Integration Tests for Reactive System
//!
//! These tests verify that observables, effects, computed values and
//! schedulers work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::{
    BatchScheduler, DeferredScheduler, Effect, EffectOptions, PropertyKey, ReactiveError,
    Runtime, RuntimeConfig, TokioScheduler,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Test that an effect re-runs when a field it read is written.
#[test]
fn effect_reruns_on_write() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "x": 1 })).unwrap();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect(move || {
        let x = state_clone.get_as::<i64>("x").unwrap();
        log_clone.borrow_mut().push(x.to_string());
    });

    state.set("x", 2).unwrap();

    // Once at registration, once after the write
    assert_eq!(*log.borrow(), vec!["1", "2"]);
}

/// Test that writing a field nobody read wakes nothing.
#[test]
fn unrelated_field_does_not_trigger() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "x": 1, "y": 1 })).unwrap();
    let runs = Rc::new(Cell::new(0));

    let (state_clone, runs_clone) = (state.clone(), runs.clone());
    rt.effect(move || {
        state_clone.get("x");
        runs_clone.set(runs_clone.get() + 1);
    });

    state.set("y", 2).unwrap();
    assert_eq!(runs.get(), 1);
}

/// Test that cleanup drops subscriptions from a branch no longer taken.
#[test]
fn branch_switching_drops_stale_dependencies() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "ok": true, "text": "a" })).unwrap();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    let effect = rt.effect(move || {
        let text = if state_clone.get_as::<bool>("ok").unwrap() {
            state_clone.get_as::<String>("text").unwrap()
        } else {
            String::new()
        };
        log_clone.borrow_mut().push(text);
    });
    assert_eq!(effect.dependency_count(), 2);

    state.set("ok", false).unwrap();
    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(state.subscriber_count("text"), 0);

    // "text" is no longer read, so this must not re-run the effect
    state.set("text", "b").unwrap();
    assert_eq!(*log.borrow(), vec!["a", ""]);
    assert_eq!(effect.run_count(), 2);
}

/// Test that reads are attributed to the innermost running effect.
#[test]
fn nested_effects_attribute_reads_to_innermost() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "foo": 1, "bar": 1 })).unwrap();
    let log = log();

    let (rt_clone, state_clone, log_clone) = (rt.clone(), state.clone(), log.clone());
    let outer = rt.effect(move || {
        log_clone.borrow_mut().push("outer".into());

        let (state_inner, log_inner) = (state_clone.clone(), log_clone.clone());
        rt_clone.effect(move || {
            log_inner.borrow_mut().push("inner".into());
            state_inner.get("bar");
        });

        state_clone.get("foo");
    });

    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    assert_eq!(outer.dependency_count(), 1);
    assert_eq!(state.subscriber_count("foo"), 1);
    assert_eq!(state.subscriber_count("bar"), 1);

    // Only the inner effect read "bar"
    log.borrow_mut().clear();
    state.set("bar", 2).unwrap();
    assert_eq!(*log.borrow(), vec!["inner"]);
    assert_eq!(outer.run_count(), 1);

    // Re-running the outer effect registers a fresh inner effect
    log.borrow_mut().clear();
    state.set("foo", 2).unwrap();
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    assert_eq!(outer.run_count(), 2);
}

/// Test that an effect writing a field it reads runs once per trigger.
#[test]
fn self_increment_does_not_recurse() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "n": 0 })).unwrap();

    let state_clone = state.clone();
    let effect = rt.effect(move || {
        state_clone.update::<i64, _>("n", |n| n + 1).unwrap();
    });
    assert_eq!(effect.run_count(), 1);
    assert_eq!(state.get_as::<i64>("n").unwrap(), 1);

    state.set("n", 10).unwrap();
    assert_eq!(effect.run_count(), 2);
    assert_eq!(state.get_as::<i64>("n").unwrap(), 11);
}

/// Test that an effect writing a field it read from inside an untracked scope
/// still does not wake itself.
#[test]
fn untracked_self_write_does_not_recurse() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "n": 0 })).unwrap();

    let (rt_clone, state_clone) = (rt.clone(), state.clone());
    let effect = rt.effect(move || {
        let n = state_clone.get_as::<i64>("n").unwrap();
        // Bounded so a regression fails the assertion instead of overflowing
        if n < 50 {
            rt_clone.untracked(|| state_clone.set("n", n + 1)).unwrap();
        }
    });

    assert_eq!(effect.run_count(), 1);
    assert_eq!(state.get_as::<i64>("n").unwrap(), 1);
}

/// Test that writes made by one effect propagate to another.
#[test]
fn effect_writes_cascade_to_other_effects() {
    let rt = Runtime::new();
    let source = rt.observe(&json!({ "celsius": 0 })).unwrap();
    let derived = rt.observe(&json!({ "fahrenheit": 0 })).unwrap();
    let log = log();

    let (source_clone, derived_clone) = (source.clone(), derived.clone());
    rt.effect(move || {
        let c = source_clone.get_as::<f64>("celsius").unwrap();
        derived_clone.set("fahrenheit", c * 9.0 / 5.0 + 32.0).unwrap();
    });
    let (derived_clone, log_clone) = (derived.clone(), log.clone());
    rt.effect(move || {
        let f = derived_clone.get_as::<f64>("fahrenheit").unwrap();
        log_clone.borrow_mut().push(f.to_string());
    });

    source.set("celsius", 100).unwrap();
    assert_eq!(*log.borrow(), vec!["32", "212"]);
}

/// Test that a deferred scheduler moves the re-run after synchronous code.
#[test]
fn deferred_scheduler_reorders_runs() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "foo": 1 })).unwrap();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect_with(
        move || {
            let foo = state_clone.get_as::<i64>("foo").unwrap();
            log_clone.borrow_mut().push(foo.to_string());
        },
        EffectOptions::new().scheduler(DeferredScheduler::new(&rt)),
    );

    state.update::<i64, _>("foo", |n| n + 1).unwrap();
    log.borrow_mut().push("end".into());
    rt.run_until_idle().unwrap();

    assert_eq!(*log.borrow(), vec!["1", "end", "2"]);
}

/// Test that a batch scheduler runs an effect once, with the final state.
#[test]
fn batch_scheduler_deduplicates_runs() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "foo": 1 })).unwrap();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect_with(
        move || {
            let foo = state_clone.get_as::<i64>("foo").unwrap();
            log_clone.borrow_mut().push(foo.to_string());
        },
        EffectOptions::new().scheduler(BatchScheduler::new(&rt)),
    );

    state.update::<i64, _>("foo", |n| n + 1).unwrap();
    state.update::<i64, _>("foo", |n| n + 1).unwrap();
    rt.run_until_idle().unwrap();

    // Never "2"
    assert_eq!(*log.borrow(), vec!["1", "3"]);
}

/// Test that microtask flushes happen before deferred macrotasks.
#[test]
fn batch_flush_precedes_deferred_runs() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "x": 0 })).unwrap();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect_with(
        move || {
            state_clone.get("x");
            log_clone.borrow_mut().push("deferred".into());
        },
        EffectOptions::new().scheduler(DeferredScheduler::new(&rt)),
    );
    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect_with(
        move || {
            state_clone.get("x");
            log_clone.borrow_mut().push("batched".into());
        },
        EffectOptions::new().scheduler(BatchScheduler::new(&rt)),
    );
    log.borrow_mut().clear();

    state.set("x", 1).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*log.borrow(), vec!["batched", "deferred"]);
}

/// Test that a computed value caches and recomputes only after a change.
#[test]
fn computed_caches_until_dependency_changes() {
    let rt = Runtime::new();
    let a = rt.observe(&json!({ "x": 1, "y": 2 })).unwrap();
    let calls = Rc::new(Cell::new(0));

    let (a_clone, calls_clone) = (a.clone(), calls.clone());
    let sum = rt.computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        a_clone.get_as::<i64>("x").unwrap() + a_clone.get_as::<i64>("y").unwrap()
    });

    assert_eq!(sum.get(), 3);
    assert_eq!(sum.get(), 3);
    assert_eq!(calls.get(), 1);

    a.set("x", 10).unwrap();
    assert!(sum.is_dirty());
    assert_eq!(calls.get(), 1);

    assert_eq!(sum.get(), 12);
    assert_eq!(calls.get(), 2);
}

/// Test that an effect reading a computed value re-runs when its inputs change.
#[test]
fn computed_propagates_to_outer_effect() {
    let rt = Runtime::new();
    let a = rt.observe(&json!({ "x": 1, "y": 2 })).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let a_clone = a.clone();
    let sum = rt.computed(move || {
        a_clone.get_as::<i64>("x").unwrap() + a_clone.get_as::<i64>("y").unwrap()
    });
    let (sum_clone, seen_clone) = (sum.clone(), seen.clone());
    let outer = rt.effect(move || seen_clone.borrow_mut().push(sum_clone.get()));

    // The outer effect depends on the computed value, not on "x" or "y"
    assert_eq!(outer.dependency_count(), 1);
    assert_eq!(a.subscriber_count("x"), 1);
    assert_eq!(sum.dependent_count(), 1);

    a.set("x", 10).unwrap();
    a.set("y", 20).unwrap();
    assert_eq!(*seen.borrow(), vec![3, 12, 30]);
    assert_eq!(sum.compute_count(), 3);
}

/// Test that a chain of computed values feeds an effect.
#[test]
fn computed_chain_propagates_to_effect() {
    let rt = Runtime::new();
    let base = rt.observe(&json!({ "n": 1 })).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let base_clone = base.clone();
    let doubled = rt.computed(move || base_clone.get_as::<i64>("n").unwrap() * 2);
    let doubled_clone = doubled.clone();
    let label = rt.computed(move || format!("n*2={}", doubled_clone.get()));
    let (label_clone, seen_clone) = (label.clone(), seen.clone());
    rt.effect(move || seen_clone.borrow_mut().push(label_clone.get()));

    base.set("n", 4).unwrap();
    assert_eq!(*seen.borrow(), vec!["n*2=2", "n*2=8"]);
}

/// Test that a panicking effect leaves tracking intact for everything else.
#[test]
fn panicking_effect_does_not_corrupt_tracking() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "bad": 0, "good": 0 })).unwrap();

    let state_clone = state.clone();
    let failing = rt.effect_with(
        move || {
            state_clone.get("bad");
            panic!("effect failed");
        },
        EffectOptions::new().lazy(),
    );
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| failing.run()));
    assert!(result.is_err());
    assert!(!rt.is_tracking());

    // A later effect still gets its own reads, and only those
    let state_clone = state.clone();
    let healthy = rt.effect(move || {
        state_clone.get("good");
    });
    assert_eq!(healthy.dependency_count(), 1);
    assert_eq!(state.subscriber_count("good"), 1);
    assert_eq!(state.subscriber_count("bad"), 1);

    state.set("good", 1).unwrap();
    assert_eq!(healthy.run_count(), 2);
    assert_eq!(failing.run_count(), 1);
}

/// Test that a stopped effect is skipped even within the same notification.
#[test]
fn effect_stopped_mid_notification_is_skipped() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "x": 0 })).unwrap();
    let victim_runs = Rc::new(Cell::new(0));
    let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

    let (state_clone, victim_clone) = (state.clone(), victim.clone());
    rt.effect(move || {
        state_clone.get("x");
        if let Some(effect) = victim_clone.borrow().as_ref() {
            effect.stop();
        }
    });
    let (state_clone, runs_clone) = (state.clone(), victim_runs.clone());
    *victim.borrow_mut() = Some(rt.effect(move || {
        state_clone.get("x");
        runs_clone.set(runs_clone.get() + 1);
    }));

    state.set("x", 1).unwrap();
    assert_eq!(victim_runs.get(), 1);
}

/// Test that arrays are observed per index.
#[test]
fn array_elements_are_tracked_per_index() {
    let rt = Runtime::new();
    let list = rt.observe(&vec!["a", "b", "c"]).unwrap();
    let runs = Rc::new(Cell::new(0));

    let (list_clone, runs_clone) = (list.clone(), runs.clone());
    rt.effect(move || {
        list_clone.get(1usize);
        runs_clone.set(runs_clone.get() + 1);
    });

    list.set(0usize, "z").unwrap();
    assert_eq!(runs.get(), 1);

    list.set(1usize, "y").unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(list.to_value(), json!(["z", "y", "c"]));
}

/// Test that typed state round-trips through an observable.
#[test]
fn typed_state_snapshot() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Todo {
        title: String,
        done: bool,
    }

    let rt = Runtime::new();
    let todo = rt
        .observe(&Todo {
            title: "write tests".into(),
            done: false,
        })
        .unwrap();

    let todo_clone = todo.clone();
    let status = rt.computed(move || {
        if todo_clone.get_as::<bool>("done").unwrap() {
            "done"
        } else {
            "open"
        }
    });
    assert_eq!(status.get(), "open");

    todo.set("done", true).unwrap();
    assert_eq!(status.get(), "done");
    assert_eq!(
        todo.snapshot::<Todo>().unwrap(),
        Todo {
            title: "write tests".into(),
            done: true,
        }
    );
}

/// Test that only objects and arrays can be observed.
#[test]
fn scalars_cannot_be_observed() {
    let rt = Runtime::new();
    let err = rt.observe(&42).unwrap_err();
    assert!(matches!(err, ReactiveError::NotAnObject { .. }));
}

/// Test that symbol keys are tracked but stay out of snapshots.
#[test]
fn symbol_keys_are_private() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "visible": 1 })).unwrap();
    let secret = PropertyKey::symbol("secret");
    let runs = Rc::new(Cell::new(0));

    let (state_clone, secret_clone, runs_clone) = (state.clone(), secret.clone(), runs.clone());
    rt.effect(move || {
        state_clone.get(secret_clone.clone());
        runs_clone.set(runs_clone.get() + 1);
    });

    state.set(secret.clone(), "hidden").unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(state.to_value(), json!({ "visible": 1 }));

    // A different symbol with the same description is a different key
    state.set(PropertyKey::symbol("secret"), "other").unwrap();
    assert_eq!(runs.get(), 2);
}

/// Test that dropping every handle of an observable releases its entry.
#[test]
fn dropped_observable_releases_dependencies() {
    let rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));

    {
        let state = rt.observe(&json!({ "x": 1 })).unwrap();
        let (state_clone, runs_clone) = (state.clone(), runs.clone());
        let effect = rt.effect(move || {
            state_clone.get("x");
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(rt.tracked_targets(), 1);

        // The effect closure holds a handle, so stop it to break the cycle
        effect.stop();
    }

    assert_eq!(rt.tracked_targets(), 0);
    assert_eq!(runs.get(), 1);
}

/// Test that a runaway deferred effect is cut off by the task budget.
#[test]
fn task_budget_stops_runaway_effects() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_task_budget(50));
    let a = rt.observe(&json!({ "n": 0 })).unwrap();
    let b = rt.observe(&json!({ "n": 0 })).unwrap();
    let scheduler = DeferredScheduler::new(&rt);

    // Two effects that keep waking each other
    let (a_clone, b_clone) = (a.clone(), b.clone());
    rt.effect_with(
        move || {
            let n = a_clone.get_as::<i64>("n").unwrap();
            b_clone.set("n", n + 1).unwrap();
        },
        EffectOptions::new().scheduler(scheduler.clone()),
    );
    let (a_clone, b_clone) = (a.clone(), b.clone());
    rt.effect_with(
        move || {
            let n = b_clone.get_as::<i64>("n").unwrap();
            a_clone.set("n", n + 1).unwrap();
        },
        EffectOptions::new().scheduler(scheduler),
    );

    let err = rt.run_until_idle().unwrap_err();
    assert!(matches!(err, ReactiveError::TaskBudgetExceeded { budget: 50 }));
}

/// Test that effects scheduled onto a tokio local set run when it is driven.
#[tokio::test]
async fn tokio_scheduler_runs_effects_on_local_set() {
    let rt = Runtime::new();
    let state = rt.observe(&json!({ "count": 0 })).unwrap();
    let scheduler = TokioScheduler::new();
    let log = log();

    let (state_clone, log_clone) = (state.clone(), log.clone());
    rt.effect_with(
        move || {
            let count = state_clone.get_as::<i64>("count").unwrap();
            log_clone.borrow_mut().push(count.to_string());
        },
        EffectOptions::new().scheduler(scheduler.clone()),
    );

    state.set("count", 1).unwrap();
    log.borrow_mut().push("sync".into());
    scheduler.settle().await.unwrap();

    assert_eq!(*log.borrow(), vec!["0", "sync", "1"]);
}
