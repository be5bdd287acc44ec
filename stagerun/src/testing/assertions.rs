//! Test assertions for run outcomes.

use crate::core::Outcome;
use std::fmt::Debug;

/// Asserts that the outcome succeeded.
pub fn assert_outcome_succeeded<T: Debug>(outcome: &Outcome<T>) {
    assert!(
        outcome.is_succeeded(),
        "Expected success, got errors: {:?}",
        outcome.errors()
    );
}

/// Asserts that the outcome failed.
pub fn assert_outcome_failed<T: Debug>(outcome: &Outcome<T>) {
    assert!(
        outcome.is_failed(),
        "Expected failure, got success with value {:?}",
        outcome.value()
    );
}

/// Asserts that the outcome failed with a cancellation entry.
pub fn assert_outcome_canceled<T: Debug>(outcome: &Outcome<T>) {
    assert!(
        outcome.is_canceled(),
        "Expected cancellation, got errors: {:?}",
        outcome.errors()
    );
}

/// Asserts the exact sequence of error codes.
pub fn assert_error_codes<T: Debug>(outcome: &Outcome<T>, expected: &[i32]) {
    let actual: Vec<i32> = outcome.errors().iter().map(|e| e.code).collect();
    assert_eq!(actual, expected, "Unexpected error codes: {:?}", outcome.errors());
}
