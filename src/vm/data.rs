//! This module contains miscellaneous small data-types that are used by the
//! interpreter.

use std::collections::HashMap;

use crate::program::Location;

/// A container that tracks how many times a single machine state has visited
/// each program location.
///
/// This enforces the per-state loop bound: a state may visit each location at
/// most `visits_per_location` times.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VisitedLocations {
    visits_per_location: usize,
    data:                HashMap<Location, usize>,
}

impl VisitedLocations {
    /// Constructs a new container that permits `visits_per_location` visits to
    /// each location.
    #[must_use]
    pub fn new(visits_per_location: usize) -> Self {
        let data = HashMap::default();

        Self {
            visits_per_location,
            data,
        }
    }

    /// Marks `location` as having been visited once more, returning the new
    /// number of visits.
    pub fn mark_visited(&mut self, location: Location) -> usize {
        let count = self.data.entry(location).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Gets the number of times that `location` has been visited.
    #[must_use]
    pub fn visit_count(&self, location: Location) -> usize {
        self.data.get(&location).copied().unwrap_or(0)
    }

    /// Checks whether `location` has been visited more often than permitted.
    #[must_use]
    pub fn exceeded(&self, location: Location) -> bool {
        self.visit_count(location) > self.visits_per_location
    }

    /// Gets the number of distinct locations visited.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        program::{Location, MethodId},
        vm::data::VisitedLocations,
    };

    #[test]
    fn tracks_visits_against_the_limit() {
        let location = Location::new(MethodId::new(0), 3);
        let mut visited = VisitedLocations::new(2);

        assert_eq!(visited.mark_visited(location), 1);
        assert_eq!(visited.mark_visited(location), 2);
        assert!(!visited.exceeded(location));
        assert_eq!(visited.mark_visited(location), 3);
        assert!(visited.exceeded(location));
        assert_eq!(visited.distinct(), 1);
    }
}
