//! Progress snapshot value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable `(max, current, description, sender)` progress tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Upper bound of the progress scale.
    pub max: Option<u64>,
    /// Current position on the scale.
    pub current: Option<u64>,
    /// What is being worked on.
    pub description: Option<String>,
    /// Who reported it (e.g. the owning step).
    pub sender: Option<String>,
}

impl ProgressSnapshot {
    /// Creates a snapshot with a position on a scale.
    #[must_use]
    pub fn new(max: u64, current: u64) -> Self {
        Self {
            max: Some(max),
            current: Some(current),
            description: None,
            sender: None,
        }
    }

    /// Creates a text-only snapshot.
    #[must_use]
    pub fn message(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Returns `current / max` in `[0, 1]`, if both are known and `max > 0`.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match (self.max, self.current) {
            (Some(max), Some(current)) if max > 0 => {
                Some((current.min(max) as f64) / (max as f64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description.as_deref().unwrap_or_default())
    }
}

impl From<ProgressSnapshot> for String {
    fn from(snapshot: ProgressSnapshot) -> Self {
        snapshot.description.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_description() {
        let snapshot = ProgressSnapshot::new(4, 1).with_description("copying");
        assert_eq!(snapshot.to_string(), "copying");
        assert_eq!(String::from(snapshot), "copying");
    }

    #[test]
    fn test_display_without_description() {
        assert_eq!(ProgressSnapshot::new(1, 1).to_string(), "");
    }

    #[test]
    fn test_fraction() {
        assert_eq!(ProgressSnapshot::new(4, 1).fraction(), Some(0.25));
        assert_eq!(ProgressSnapshot::new(0, 0).fraction(), None);
        assert_eq!(ProgressSnapshot::message("x").fraction(), None);
    }

    #[test]
    fn test_builder() {
        let snapshot = ProgressSnapshot::message("indexing").with_sender("step-2");
        assert_eq!(snapshot.description.as_deref(), Some("indexing"));
        assert_eq!(snapshot.sender.as_deref(), Some("step-2"));
        assert!(snapshot.max.is_none());
    }
}
