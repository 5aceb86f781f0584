#![deny(missing_docs)]
#![doc = "Continuous-time Markov engine over per-branch character histories: event arenas, composable rate modifiers, forward simulation, endpoint-conditioned resampling and path likelihoods."]

/// Endpoint-conditioned simulation, resampling and scoring on a tree.
pub mod engine;
/// Immutable state-change events.
pub mod event;
/// Base rate matrix composed with the modifier set.
pub mod generator;
/// Arena-backed per-branch histories.
pub mod history;
/// Pluggable multiplicative rate modifiers.
pub mod modifier;
/// Closed-form two-state transition probabilities.
pub mod transition;

pub use engine::{HistoryConfig, HistoryCtmc};
pub use event::{CharacterEvent, EventId};
pub use generator::{Candidate, RateGenerator, RateMatrix};
pub use history::BranchHistory;
pub use modifier::{ModifierConfig, ModifyRate, NodeContext, RateModifier};
pub use transition::TwoStateTransition;

/// State index treated as "absent" when counting occupied sites.
pub const OFF_STATE: usize = 0;
