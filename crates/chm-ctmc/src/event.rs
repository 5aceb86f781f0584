use serde::{Deserialize, Serialize};

/// A single state change at one site, at a time relative to the branch.
///
/// Times are fractions of the branch in `[0, 1]`; 0 is the parent end and 1
/// the child end. Events are never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterEvent {
    /// Site (character) index.
    pub site: usize,
    /// State entered at `time`.
    pub state: usize,
    /// Relative time on the branch.
    pub time: f64,
}

impl CharacterEvent {
    /// Creates a new event.
    pub fn new(site: usize, state: usize, time: f64) -> Self {
        Self { site, state, time }
    }
}

/// Stable index of an event within a branch arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u32);

impl EventId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the event inside its arena.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}
