use std::collections::VecDeque;

use crate::types::{PositionMap, Thought};

/// State captured right before a destructive command.
#[derive(Clone, Debug, PartialEq)]
pub struct HistorySnapshot {
    pub thoughts: Vec<Thought>,
    pub positions: PositionMap,
}

/// LIFO of snapshots. Unbounded unless built with [`HistoryStack::with_limit`],
/// in which case the oldest snapshot is dropped first.
#[derive(Debug, Default)]
pub struct HistoryStack {
    snapshots: VecDeque<HistorySnapshot>,
    limit: Option<usize>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            limit: Some(limit.max(1)),
        }
    }

    pub fn push(&mut self, thoughts: Vec<Thought>, positions: PositionMap) {
        self.snapshots.push_back(HistorySnapshot {
            thoughts,
            positions,
        });
        if let Some(limit) = self.limit {
            while self.snapshots.len() > limit {
                self.snapshots.pop_front();
            }
        }
    }

    pub fn pop(&mut self) -> Option<HistorySnapshot> {
        self.snapshots.pop_back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ThoughtId, Vec2};

    fn snapshot_of(ids: &[u64]) -> (Vec<Thought>, PositionMap) {
        let thoughts = ids
            .iter()
            .map(|&id| Thought::new(ThoughtId(id), format!("t{id}")))
            .collect();
        let positions = ids
            .iter()
            .map(|&id| (ThoughtId(id), Vec2::new(id as f32, id as f32 * 2.0)))
            .collect();
        (thoughts, positions)
    }

    mod push_pop {
        use super::*;

        #[test]
        fn pops_in_reverse_order() {
            let mut history = HistoryStack::new();
            let (t1, p1) = snapshot_of(&[1]);
            let (t2, p2) = snapshot_of(&[1, 2]);
            history.push(t1.clone(), p1.clone());
            history.push(t2.clone(), p2.clone());

            assert_eq!(history.pop().map(|s| s.thoughts), Some(t2));
            assert_eq!(history.pop().map(|s| s.positions), Some(p1));
            assert!(history.is_empty());
        }

        #[test]
        fn pop_on_empty_is_none() {
            let mut history = HistoryStack::new();
            assert!(history.pop().is_none());
        }
    }

    mod limit {
        use super::*;

        #[test]
        fn unbounded_by_default() {
            let mut history = HistoryStack::new();
            for i in 0..500 {
                let (t, p) = snapshot_of(&[i]);
                history.push(t, p);
            }
            assert_eq!(history.len(), 500);
        }

        #[test]
        fn drops_oldest_past_limit() {
            let mut history = HistoryStack::with_limit(2);
            for i in 1..=3 {
                let (t, p) = snapshot_of(&[i]);
                history.push(t, p);
            }
            assert_eq!(history.len(), 2);
            assert_eq!(history.pop().unwrap().thoughts[0].id, ThoughtId(3));
            assert_eq!(history.pop().unwrap().thoughts[0].id, ThoughtId(2));
            assert!(history.pop().is_none());
        }

        #[test]
        fn zero_limit_still_keeps_latest() {
            let mut history = HistoryStack::with_limit(0);
            let (t, p) = snapshot_of(&[5]);
            history.push(t, p);
            assert_eq!(history.len(), 1);
        }
    }
}
