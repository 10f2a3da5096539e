// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::query::QueryParams;

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    Back,
    Forward,
}

/// Back/forward stacks of listing queries. A move is only committed once the
/// target listing actually loads, so a failed load leaves both stacks alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavigationHistory {
    back: Vec<QueryParams>,
    forward: Vec<QueryParams>,
    pending: Option<(Travel, QueryParams)>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_go(&self, travel: Travel) -> bool {
        !self.stack(travel).is_empty()
    }

    pub fn len(&self, travel: Travel) -> usize {
        self.stack(travel).len()
    }

    /// Marks a move as in flight and returns the query to load.
    pub fn begin(&mut self, travel: Travel) -> Option<QueryParams> {
        let target = self.stack(travel).last()?.clone();
        self.pending = Some((travel, target.clone()));
        Some(target)
    }

    /// Settles a finished load of `to` while `from` was shown. Loads that
    /// match the pending move shift one entry across; any other change of
    /// query is a fresh navigation and drops the forward stack.
    pub fn arrive(&mut self, from: &QueryParams, to: &QueryParams) {
        match self.pending.take() {
            Some((Travel::Back, target)) if target == *to => {
                self.back.pop();
                push_bounded(&mut self.forward, from.clone());
            }
            Some((Travel::Forward, target)) if target == *to => {
                self.forward.pop();
                push_bounded(&mut self.back, from.clone());
            }
            _ if from != to => {
                push_bounded(&mut self.back, from.clone());
                self.forward.clear();
            }
            _ => {}
        }
    }

    fn stack(&self, travel: Travel) -> &[QueryParams] {
        match travel {
            Travel::Back => &self.back,
            Travel::Forward => &self.forward,
        }
    }
}

fn push_bounded(stack: &mut Vec<QueryParams>, query: QueryParams) {
    if stack.last() == Some(&query) {
        return;
    }
    stack.push(query);
    if stack.len() > HISTORY_LIMIT {
        stack.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::{HISTORY_LIMIT, NavigationHistory, Travel};
    use crate::query::QueryParams;

    fn q(raw: &str) -> QueryParams {
        QueryParams::parse(raw)
    }

    #[test]
    fn back_then_forward_walks_the_same_queries() {
        let mut history = NavigationHistory::new();
        history.arrive(&q("page=1"), &q("page=2"));
        history.arrive(&q("page=2"), &q("page=3"));
        assert_eq!(history.len(Travel::Back), 2);

        let target = history.begin(Travel::Back);
        assert_eq!(target, Some(q("page=2")));
        history.arrive(&q("page=3"), &q("page=2"));
        assert_eq!(history.len(Travel::Back), 1);
        assert_eq!(history.len(Travel::Forward), 1);

        assert_eq!(history.begin(Travel::Forward), Some(q("page=3")));
        history.arrive(&q("page=2"), &q("page=3"));
        assert!(!history.can_go(Travel::Forward));
        assert_eq!(history.len(Travel::Back), 2);
    }

    #[test]
    fn fresh_navigation_drops_forward_entries() {
        let mut history = NavigationHistory::new();
        history.arrive(&q("page=1"), &q("page=2"));
        history.begin(Travel::Back);
        history.arrive(&q("page=2"), &q("page=1"));
        assert!(history.can_go(Travel::Forward));

        history.arrive(&q("page=1"), &q("sort=env"));
        assert!(!history.can_go(Travel::Forward));
        assert_eq!(history.begin(Travel::Back), Some(q("page=1")));
    }

    #[test]
    fn reload_and_failed_moves_leave_stacks_alone() {
        let mut history = NavigationHistory::new();
        history.arrive(&q("page=1"), &q("page=1"));
        assert!(!history.can_go(Travel::Back));
        assert_eq!(history.begin(Travel::Back), None);

        history.arrive(&q("page=1"), &q("page=2"));
        history.begin(Travel::Back);
        // The back target never loaded; a reload of the current page follows.
        history.arrive(&q("page=2"), &q("page=2"));
        assert_eq!(history.len(Travel::Back), 1);
        assert!(!history.can_go(Travel::Forward));
    }

    #[test]
    fn stacks_are_bounded() {
        let mut history = NavigationHistory::new();
        for page in 0..HISTORY_LIMIT + 10 {
            history.arrive(&q(&format!("page={page}")), &q(&format!("page={}", page + 1)));
        }
        assert_eq!(history.len(Travel::Back), HISTORY_LIMIT);
        assert_eq!(
            history.begin(Travel::Back),
            Some(q(&format!("page={}", HISTORY_LIMIT + 9)))
        );
    }
}
