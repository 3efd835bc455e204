//! Property-based test generators using proptest.
//!
//! A [`NestingPlan`] describes one flow: scopes opened in order, optional
//! writes, and which scopes complete before being disposed in reverse.
//! [`NestingPlan::expected`] is the reference model the scope protocol is
//! checked against.

use crate::fixtures::TestEnv;
use crate::sample::{Hero, Superpower};
use proptest::prelude::*;
use txscope_core::ScopeError;

/// One scope in a [`NestingPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStep {
    /// Whether a read-only scope is requested.
    pub read_only: bool,
    /// Whether the scope is completed before disposal.
    pub complete: bool,
    /// Key written while this scope is on top, if any.
    pub write: Option<String>,
}

/// Scopes opened in order and disposed in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestingPlan {
    /// The steps; the first one opens the root.
    pub steps: Vec<ScopeStep>,
}

/// What running a [`NestingPlan`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Scopes created successfully.
    pub created: usize,
    /// Requests refused with a nesting violation.
    pub nesting_violations: usize,
    /// Keys committed to the store, sorted.
    pub committed: Vec<String>,
    /// Whether disposing the root returned an error.
    pub root_failed: bool,
}

impl NestingPlan {
    /// Computes the outcome the scope protocol must produce.
    ///
    /// Joined scopes inherit the root's read-only flag, so a writable
    /// request under a read-only root is refused and every scope under a
    /// writable root is writable.
    pub fn expected(&self) -> PlanOutcome {
        let Some(root) = self.steps.first() else {
            return PlanOutcome::default();
        };
        let accepted: Vec<&ScopeStep> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(i, step)| *i == 0 || !(root.read_only && !step.read_only))
            .map(|(_, step)| step)
            .collect();

        let all_completed = accepted.iter().all(|step| step.complete);
        let mut committed: Vec<String> = if !root.read_only && all_completed {
            accepted.iter().filter_map(|step| step.write.clone()).collect()
        } else {
            Vec::new()
        };
        committed.sort();
        committed.dedup();

        PlanOutcome {
            created: accepted.len(),
            nesting_violations: self.steps.len() - accepted.len(),
            committed,
            root_failed: !root.read_only && !all_completed,
        }
    }

    /// Runs the plan in a fresh flow of `env` and reports what happened.
    ///
    /// # Panics
    ///
    /// Panics on errors the plan cannot explain.
    pub fn run(&self, env: &TestEnv, collection: &str) -> PlanOutcome {
        let mut outcome = env.in_flow(|env| {
            let mut outcome = PlanOutcome::default();
            let mut handles = Vec::new();
            for step in &self.steps {
                let options = txscope_core::ScopeOptions::new().read_only(step.read_only);
                match env.scopes.create_with(options) {
                    Ok(handle) => {
                        if let (Some(key), false) = (&step.write, handle.is_read_only()) {
                            env.put(collection, key, "value");
                        }
                        handles.push((handle, step.complete));
                        outcome.created += 1;
                    }
                    Err(ScopeError::NestingViolation { .. }) => outcome.nesting_violations += 1,
                    Err(err) => panic!("unexpected creation error: {err}"),
                }
            }
            while let Some((handle, complete)) = handles.pop() {
                if complete {
                    handle.complete().expect("complete scope");
                }
                let result = handle.dispose();
                if handle.is_root() {
                    outcome.root_failed = result.is_err();
                }
            }
            env.assert_idle();
            outcome
        });
        outcome.committed = env
            .store
            .scan(collection)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        outcome
    }
}

/// Strategy for short lowercase keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for a single scope step.
pub fn scope_step_strategy() -> impl Strategy<Value = ScopeStep> {
    (any::<bool>(), prop::bool::weighted(0.8), prop::option::of(key_strategy())).prop_map(
        |(read_only, complete, write)| ScopeStep {
            read_only,
            complete,
            write,
        },
    )
}

/// Strategy for nesting plans of 1 to `max_depth` scopes.
pub fn nesting_plan_strategy(max_depth: usize) -> impl Strategy<Value = NestingPlan> {
    prop::collection::vec(scope_step_strategy(), 1..=max_depth.max(1))
        .prop_map(|steps| NestingPlan { steps })
}

/// Strategy for unsaved heroes with valid names.
pub fn hero_strategy() -> impl Strategy<Value = Hero> {
    (
        prop::string::string_regex("[A-Z][a-z]{2,12}").expect("Invalid regex"),
        prop::collection::vec(
            (
                prop::string::string_regex("[A-Z][a-z]{2,10}").expect("Invalid regex"),
                prop::string::string_regex("[a-z ]{0,30}").expect("Invalid regex"),
            ),
            0..3,
        ),
    )
        .prop_map(|(name, powers)| {
            powers
                .into_iter()
                .fold(Hero::new(name), |hero, (power, description)| {
                    hero.with_superpower(Superpower::new(power, description))
                })
        })
}
