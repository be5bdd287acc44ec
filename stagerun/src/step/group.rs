//! Grouping of steps by priority/sequence key.

use std::collections::BTreeMap;

/// Anything that can be scheduled by priority group.
pub trait Sequenced {
    /// The priority/sequence key; `None` means "no priority".
    fn sequence(&self) -> Option<i32>;

    /// Disabled items are never scheduled.
    fn is_enabled(&self) -> bool;
}

/// The set of items sharing one key: the unit of concurrency.
#[derive(Debug, Clone)]
pub struct StepGroup<T> {
    /// The shared key.
    pub key: Option<i32>,
    /// Members with their declaration index.
    pub members: Vec<(usize, T)>,
}

impl<T> StepGroup<T> {
    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the declaration indices of the members.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.members.iter().map(|(i, _)| *i).collect()
    }
}

/// Derives the execution plan for a run.
///
/// Disabled items are dropped. If no enabled item declares a key, every
/// item becomes its own group in declaration order, so they run one at a
/// time. Otherwise items are grouped by key in ascending order; `None`
/// sorts before every explicit key. Declaration order is kept inside a
/// group.
pub fn plan_groups<T>(items: &[T]) -> Vec<StepGroup<T>>
where
    T: Sequenced + Clone,
{
    let enabled = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_enabled());

    if !items.iter().any(|i| i.is_enabled() && i.sequence().is_some()) {
        return enabled
            .map(|(index, item)| StepGroup {
                key: None,
                members: vec![(index, item.clone())],
            })
            .collect();
    }

    let mut by_key: BTreeMap<Option<i32>, Vec<(usize, T)>> = BTreeMap::new();
    for (index, item) in enabled {
        by_key
            .entry(item.sequence())
            .or_default()
            .push((index, item.clone()));
    }

    by_key
        .into_iter()
        .map(|(key, members)| StepGroup { key, members })
        .collect()
}
