//! Multiplicative rate modifiers.
//!
//! A modifier maps the full current state vector, a candidate event, the
//! elapsed age and an optional node context to a non-negative factor. The
//! realized rate of an event is the base rate times the clock rate times the
//! product of every modifier in the generator's set.

mod adjacency;
mod class_table;
mod config;
mod distance;
mod geography;
mod range;
mod state_count;

pub use adjacency::AdjacencyWindow;
pub use class_table::ClassTable;
pub use config::{EpochConfig, ModifierConfig};
pub use distance::PhyloDistance;
pub use geography::{Coordinate, DistanceMetric, EpochGeography};
pub use range::RangeContext;
pub use state_count::StateCount;

use serde::{Deserialize, Serialize};

use crate::event::CharacterEvent;

/// Optional position of the branch being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeContext {
    /// Node at the child end of the branch.
    pub node: usize,
    /// Age of the child end.
    pub age: f64,
    /// Length of the branch.
    pub branch_length: f64,
}

/// Behaviour shared by every rate modifier variant.
pub trait ModifyRate {
    /// Multiplier applied to `event` given the current state vector.
    ///
    /// Must be pure: identical inputs give identical outputs.
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        age: f64,
        node: Option<&NodeContext>,
    ) -> f64;

    /// Multiplier used when sites evolve independently of each other.
    fn site_multiplier(&self, _from: usize, _to: usize, _site: usize, _age: f64) -> f64 {
        1.0
    }

    /// Recomputes derived caches after a parameter change.
    fn update(&mut self) {}

    /// Short identifier used in logs and summaries.
    fn name(&self) -> &'static str;
}

/// Closed set of modifier variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RateModifier {
    /// Neighbouring sites sharing the candidate state.
    Adjacency(AdjacencyWindow),
    /// Distance-decayed gain rates (phylogenetic distance or host switch).
    PhyloDistance(PhyloDistance),
    /// Sparse connectivity between present sites.
    RangeContext(RangeContext),
    /// Lookup table indexed by site class and event class.
    ClassTable(ClassTable),
    /// Power law in the number of sites sharing the target state.
    StateCount(StateCount),
    /// Epoch-dependent area availability and dispersal.
    Geography(EpochGeography),
}

impl RateModifier {
    fn inner(&self) -> &dyn ModifyRate {
        match self {
            RateModifier::Adjacency(inner) => inner,
            RateModifier::PhyloDistance(inner) => inner,
            RateModifier::RangeContext(inner) => inner,
            RateModifier::ClassTable(inner) => inner,
            RateModifier::StateCount(inner) => inner,
            RateModifier::Geography(inner) => inner,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ModifyRate {
        match self {
            RateModifier::Adjacency(inner) => inner,
            RateModifier::PhyloDistance(inner) => inner,
            RateModifier::RangeContext(inner) => inner,
            RateModifier::ClassTable(inner) => inner,
            RateModifier::StateCount(inner) => inner,
            RateModifier::Geography(inner) => inner,
        }
    }
}

impl ModifyRate for RateModifier {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        age: f64,
        node: Option<&NodeContext>,
    ) -> f64 {
        self.inner().compute_multiplier(current, event, age, node)
    }

    fn site_multiplier(&self, from: usize, to: usize, site: usize, age: f64) -> f64 {
        self.inner().site_multiplier(from, to, site, age)
    }

    fn update(&mut self) {
        self.inner_mut().update()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

impl From<AdjacencyWindow> for RateModifier {
    fn from(inner: AdjacencyWindow) -> Self {
        RateModifier::Adjacency(inner)
    }
}

impl From<PhyloDistance> for RateModifier {
    fn from(inner: PhyloDistance) -> Self {
        RateModifier::PhyloDistance(inner)
    }
}

impl From<RangeContext> for RateModifier {
    fn from(inner: RangeContext) -> Self {
        RateModifier::RangeContext(inner)
    }
}

impl From<ClassTable> for RateModifier {
    fn from(inner: ClassTable) -> Self {
        RateModifier::ClassTable(inner)
    }
}

impl From<StateCount> for RateModifier {
    fn from(inner: StateCount) -> Self {
        RateModifier::StateCount(inner)
    }
}

impl From<EpochGeography> for RateModifier {
    fn from(inner: EpochGeography) -> Self {
        RateModifier::Geography(inner)
    }
}

pub(crate) fn config_error(code: &str, message: &str) -> chm_core::ChmError {
    chm_core::ChmError::Config(chm_core::ErrorInfo::new(code, message))
}
