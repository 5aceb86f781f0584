use chm_core::errors::{ChmError, ErrorInfo};

use crate::event::{CharacterEvent, EventId};
use crate::OFF_STATE;

/// Latent event path along one branch.
///
/// Events live in an arena and are referenced by [`EventId`]. The endpoint
/// vectors hold one id per site (time 0 for the parent end, time 1 for the
/// child end) and `events` holds the interior events sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchHistory {
    arena: Vec<CharacterEvent>,
    parent: Vec<EventId>,
    child: Vec<EventId>,
    events: Vec<EventId>,
}

impl BranchHistory {
    /// Creates an event-free history whose endpoints both equal `states`.
    pub fn new(states: &[usize]) -> Self {
        let mut arena = Vec::with_capacity(states.len() * 2);
        let mut parent = Vec::with_capacity(states.len());
        let mut child = Vec::with_capacity(states.len());
        for (site, &state) in states.iter().enumerate() {
            parent.push(EventId::new(arena.len()));
            arena.push(CharacterEvent::new(site, state, 0.0));
            child.push(EventId::new(arena.len()));
            arena.push(CharacterEvent::new(site, state, 1.0));
        }
        Self {
            arena,
            parent,
            child,
            events: Vec::new(),
        }
    }

    /// Number of sites tracked by the history.
    pub fn num_sites(&self) -> usize {
        self.parent.len()
    }

    /// State of `site` at the parent end.
    pub fn parent_state(&self, site: usize) -> usize {
        self.arena[self.parent[site].index()].state
    }

    /// State of `site` at the child end.
    pub fn child_state(&self, site: usize) -> usize {
        self.arena[self.child[site].index()].state
    }

    /// Parent-end state vector.
    pub fn parent_states(&self) -> Vec<usize> {
        (0..self.num_sites()).map(|site| self.parent_state(site)).collect()
    }

    /// Child-end state vector.
    pub fn child_states(&self) -> Vec<usize> {
        (0..self.num_sites()).map(|site| self.child_state(site)).collect()
    }

    /// Replaces the parent-end state of `site`.
    pub fn set_parent_state(&mut self, site: usize, state: usize) {
        self.parent[site] = EventId::new(self.arena.len());
        self.arena.push(CharacterEvent::new(site, state, 0.0));
        self.maybe_compact();
    }

    /// Replaces the child-end state of `site`.
    pub fn set_child_state(&mut self, site: usize, state: usize) {
        self.child[site] = EventId::new(self.arena.len());
        self.arena.push(CharacterEvent::new(site, state, 1.0));
        self.maybe_compact();
    }

    /// Interior events in time order.
    pub fn events(&self) -> impl Iterator<Item = &CharacterEvent> + '_ {
        self.events.iter().map(move |id| &self.arena[id.index()])
    }

    /// Number of interior events.
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Interior events restricted to `site`, in time order.
    pub fn site_events(&self, site: usize) -> Vec<CharacterEvent> {
        self.events().filter(|event| event.site == site).copied().collect()
    }

    /// Inserts an interior event, keeping time order. Interior events lie
    /// strictly between the endpoints.
    pub fn push_event(&mut self, event: CharacterEvent) -> Result<(), ChmError> {
        if event.site >= self.num_sites() {
            return Err(ChmError::Model(
                ErrorInfo::new("event-site-out-of-range", "event site exceeds site count")
                    .with_context("site", event.site.to_string())
                    .with_context("num_sites", self.num_sites().to_string()),
            ));
        }
        if !(event.time > 0.0 && event.time < 1.0) {
            return Err(ChmError::Model(
                ErrorInfo::new("event-time-out-of-range", "event time must lie in (0, 1)")
                    .with_context("time", event.time.to_string()),
            ));
        }
        let id = EventId::new(self.arena.len());
        self.arena.push(event);
        let position = self
            .events
            .partition_point(|other| self.arena[other.index()].time <= event.time);
        self.events.insert(position, id);
        Ok(())
    }

    /// Drops the interior events of `sites` and inserts `replacement`.
    ///
    /// Events in `replacement` must belong to `sites`; events of other sites
    /// are left untouched.
    pub fn replace_sites(
        &mut self,
        sites: &[usize],
        replacement: &[CharacterEvent],
    ) -> Result<(), ChmError> {
        if let Some(stray) = replacement.iter().find(|event| !sites.contains(&event.site)) {
            return Err(ChmError::Model(
                ErrorInfo::new("replacement-site-mismatch", "replacement event outside site subset")
                    .with_context("site", stray.site.to_string()),
            ));
        }
        let arena = &self.arena;
        self.events
            .retain(|id| !sites.contains(&arena[id.index()].site));
        for event in replacement {
            self.push_event(*event)?;
        }
        self.compact();
        Ok(())
    }

    /// Returns `true` when replaying the events from the parent states
    /// reproduces the child states exactly.
    pub fn is_consistent(&self) -> bool {
        let mut states = self.parent_states();
        for event in self.events() {
            states[event.site] = event.state;
        }
        states == self.child_states()
    }

    /// Smallest number of occupied sites observed along the branch,
    /// including both endpoints.
    pub fn min_occupied(&self) -> usize {
        let mut states = self.parent_states();
        let mut occupied = count_occupied(&states);
        let mut min = occupied;
        for event in self.events() {
            let before = states[event.site] != OFF_STATE;
            let after = event.state != OFF_STATE;
            states[event.site] = event.state;
            match (before, after) {
                (true, false) => occupied -= 1,
                (false, true) => occupied += 1,
                _ => {}
            }
            min = min.min(occupied);
        }
        min
    }

    fn maybe_compact(&mut self) {
        let live = self.parent.len() + self.child.len() + self.events.len();
        if self.arena.len() > 4 * live + 16 {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let mut arena = Vec::with_capacity(self.parent.len() * 2 + self.events.len());
        let mut relocate = |id: &mut EventId, source: &[CharacterEvent]| {
            let moved = EventId::new(arena.len());
            arena.push(source[id.index()]);
            *id = moved;
        };
        let source = std::mem::take(&mut self.arena);
        for id in self.parent.iter_mut() {
            relocate(id, &source);
        }
        for id in self.child.iter_mut() {
            relocate(id, &source);
        }
        for id in self.events.iter_mut() {
            relocate(id, &source);
        }
        self.arena = arena;
    }
}

/// Number of sites whose state differs from the off state.
pub fn count_occupied(states: &[usize]) -> usize {
    states.iter().filter(|&&state| state != OFF_STATE).count()
}
