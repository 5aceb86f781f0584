use chm_core::errors::{ChmError, ErrorInfo};

use super::{ModifyRate, NodeContext};
use crate::event::CharacterEvent;

/// Multipliers looked up by (site class, event class).
///
/// Each site belongs to a site class and each `(from, to)` transition to an
/// event class. The multiplier is `table[site_class][event_class]` scaled by
/// the number of event classes, so a table whose rows average to one leaves
/// the mean rate unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    site_classes: Vec<usize>,
    event_classes: Vec<Vec<usize>>,
    table: Vec<Vec<f64>>,
}

impl ClassTable {
    /// Validates and builds the table.
    ///
    /// `event_classes` is a `num_states x num_states` matrix of event class
    /// indices; diagonal entries are ignored.
    pub fn new(
        site_classes: Vec<usize>,
        event_classes: Vec<Vec<usize>>,
        table: Vec<Vec<f64>>,
    ) -> Result<Self, ChmError> {
        let num_event_classes = table.first().map(Vec::len).unwrap_or(0);
        if table.is_empty() || num_event_classes == 0 {
            return Err(ChmError::Config(ErrorInfo::new(
                "class-table-empty",
                "class table needs at least one site class and one event class",
            )));
        }
        for (row_idx, row) in table.iter().enumerate() {
            if row.len() != num_event_classes {
                return Err(ChmError::Config(
                    ErrorInfo::new("class-table-shape", "class table rows differ in length")
                        .with_context("row", row_idx.to_string()),
                ));
            }
            if row.iter().any(|value| !value.is_finite() || *value < 0.0) {
                return Err(ChmError::Config(
                    ErrorInfo::new("class-table-value", "class multipliers must be non-negative")
                        .with_context("row", row_idx.to_string()),
                ));
            }
        }
        if let Some(class) = site_classes.iter().find(|&&class| class >= table.len()) {
            return Err(ChmError::Config(
                ErrorInfo::new("site-class-range", "site class exceeds table rows")
                    .with_context("class", class.to_string())
                    .with_context("rows", table.len().to_string()),
            ));
        }
        let num_states = event_classes.len();
        for (from, row) in event_classes.iter().enumerate() {
            if row.len() != num_states {
                return Err(ChmError::Config(
                    ErrorInfo::new("event-class-shape", "event class matrix must be square")
                        .with_context("row", from.to_string()),
                ));
            }
            for (to, &class) in row.iter().enumerate() {
                if from != to && class >= num_event_classes {
                    return Err(ChmError::Config(
                        ErrorInfo::new("event-class-range", "event class exceeds table columns")
                            .with_context("from", from.to_string())
                            .with_context("to", to.to_string()),
                    ));
                }
            }
        }
        Ok(Self {
            site_classes,
            event_classes,
            table,
        })
    }

    /// Number of event classes (table columns).
    pub fn num_event_classes(&self) -> usize {
        self.table[0].len()
    }
}

impl ModifyRate for ClassTable {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        _age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        let from = current[event.site];
        if from == event.state {
            return 0.0;
        }
        let site_class = self.site_classes[event.site];
        let event_class = self.event_classes[from][event.state];
        self.table[site_class][event_class] * self.num_event_classes() as f64
    }

    fn name(&self) -> &'static str {
        "class-table"
    }
}
