//! Success/failure value with an ordered error list.
//!
//! [`Outcome`] is the single source of truth a caller inspects after a run.
//! Outcomes combine with `+`: the right-hand value wins the payload slot and
//! the error lists are concatenated in encounter order. With
//! [`Outcome::identity`] as the neutral element this forms a monoid, which is
//! what the weighted runner folds step results with.

use crate::errors::StagerunError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Numeric codes attached to [`ErrorEntry`] values produced by the runners.
pub mod codes {
    /// Unclassified error.
    pub const GENERIC: i32 = 0;
    /// A step body returned an error.
    pub const STEP_FAILED: i32 = 1;
    /// The run observed a cancellation request before launching a step.
    pub const OPERATION_CANCELED: i32 = 2;
    /// A step body panicked.
    pub const STEP_PANICKED: i32 = 3;
}

/// A single `(code, message)` error entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// The error code.
    pub code: i32,
    /// Human readable message.
    pub message: String,
}

impl ErrorEntry {
    /// Creates a new error entry.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a step failure entry.
    #[must_use]
    pub fn step_failed(message: impl Into<String>) -> Self {
        Self::new(codes::STEP_FAILED, message)
    }

    /// Creates a cancellation entry.
    #[must_use]
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(codes::OPERATION_CANCELED, message)
    }

    /// Creates a panic entry.
    #[must_use]
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(codes::STEP_PANICKED, message)
    }

    /// Returns true if this entry classifies a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.code == codes::OPERATION_CANCELED
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Discriminated success/failure value carrying a payload.
///
/// `is_succeeded() == errors().is_empty()` always holds; there is no way to
/// construct a failed outcome without at least one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome<T> {
    value: T,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

impl<T> Outcome<T> {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    /// Creates a failed outcome with a single entry.
    #[must_use]
    pub fn failure(value: T, error: ErrorEntry) -> Self {
        Self {
            value,
            errors: vec![error],
        }
    }

    /// Creates an outcome from a value and a list of entries.
    ///
    /// An empty list yields a success.
    #[must_use]
    pub fn with_errors(value: T, errors: Vec<ErrorEntry>) -> Self {
        Self { value, errors }
    }

    /// Creates a failed outcome from a step error.
    #[must_use]
    pub fn from_error(value: T, error: &anyhow::Error) -> Self {
        Self::failure(value, ErrorEntry::step_failed(format!("{error:#}")))
    }

    /// Creates a cancellation-classified failed outcome.
    #[must_use]
    pub fn canceled(value: T, reason: impl Into<String>) -> Self {
        Self::failure(value, ErrorEntry::canceled(reason))
    }

    /// Returns true if there are no errors.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there is at least one error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if any entry classifies a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.errors.iter().any(ErrorEntry::is_canceled)
    }

    /// Returns the payload.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the outcome, returning the payload regardless of success.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the ordered error list.
    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Returns the first error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&ErrorEntry> {
        self.errors.first()
    }

    /// Appends an error entry, turning the outcome into a failure.
    pub fn push_error(&mut self, error: ErrorEntry) {
        self.errors.push(error);
    }

    /// Replaces the payload, keeping the error list.
    #[must_use]
    pub fn with_value<U>(self, value: U) -> Outcome<U> {
        Outcome {
            value,
            errors: self.errors,
        }
    }

    /// Maps the payload, keeping the error list.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        Outcome {
            value: f(self.value),
            errors: self.errors,
        }
    }

    /// Combines with an outcome computed from this one's payload.
    #[must_use]
    pub fn and_then_value<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        let mut errors = self.errors;
        let next = f(self.value);
        errors.extend(next.errors);
        Outcome {
            value: next.value,
            errors,
        }
    }

    /// Associative combination: right value wins, errors concatenate.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        let mut errors = self.errors;
        errors.extend(other.errors);
        Self {
            value: other.value,
            errors,
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, Vec<ErrorEntry>> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(self.errors)
        }
    }

    /// Converts into a `Result` carrying a [`StagerunError`].
    ///
    /// A cancellation entry wins and yields [`StagerunError::Cancelled`] with
    /// its reason. Any other failure yields [`StagerunError::StepFailed`]
    /// under `label`, with every message joined in encounter order.
    ///
    /// # Errors
    ///
    /// Returns the error describing a failed outcome.
    pub fn into_run_result(self, label: impl Into<String>) -> Result<T, StagerunError> {
        if self.errors.is_empty() {
            return Ok(self.value);
        }
        if let Some(entry) = self.errors.iter().find(|e| e.is_canceled()) {
            return Err(StagerunError::Cancelled(entry.message.clone()));
        }
        let message = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(StagerunError::step_failed(label, message))
    }
}

impl<T: Default> Outcome<T> {
    /// The neutral element: success with a default payload.
    #[must_use]
    pub fn identity() -> Self {
        Self::success(T::default())
    }

    /// Folds outcomes left to right starting from [`Outcome::identity`].
    #[must_use]
    pub fn fold<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        outcomes.into_iter().fold(Self::identity(), Self::combine)
    }
}

impl<T: Default> Default for Outcome<T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T> Add for Outcome<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.combine(rhs)
    }
}

impl<T> AddAssign for Outcome<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.errors.extend(rhs.errors);
        self.value = rhs.value;
    }
}
