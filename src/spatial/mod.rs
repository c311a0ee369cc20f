use std::collections::HashMap;

use crate::types::Vec2;

/// Axis-aligned bounds, `min` inclusive and `max` inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn from_center(center: Vec2, half: Vec2) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Uniform grid broad phase. Each slot is registered in every cell its
/// bounds touch, so a query only has to look at the cells it covers.
#[derive(Debug)]
pub struct SpatialHash {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "broad-phase cell must have a positive size"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn rebuild<I>(&mut self, bounds: I)
    where
        I: IntoIterator<Item = (usize, Aabb)>,
    {
        self.cells.clear();
        for (slot, aabb) in bounds {
            let (lo, hi) = self.cell_range(&aabb);
            for cy in lo.1..=hi.1 {
                for cx in lo.0..=hi.0 {
                    self.cells.entry((cx, cy)).or_default().push(slot);
                }
            }
        }
    }

    /// Slots whose cells intersect `aabb`, sorted and without duplicates.
    pub fn query(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        out.clear();
        let (lo, hi) = self.cell_range(aabb);
        for cy in lo.1..=hi.1 {
            for cx in lo.0..=hi.0 {
                if let Some(slots) = self.cells.get(&(cx, cy)) {
                    out.extend_from_slice(slots);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
    }

    fn cell_range(&self, aabb: &Aabb) -> ((i32, i32), (i32, i32)) {
        (self.cell_key(aabb.min), self.cell_key(aabb.max))
    }

    fn cell_key(&self, pos: Vec2) -> (i32, i32) {
        let cx = (pos.x / self.cell_size).floor() as i32;
        let cy = (pos.y / self.cell_size).floor() as i32;
        (cx, cy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::from_center(Vec2::new(x, y), Vec2::new(half, half))
    }

    mod aabb {
        use super::*;

        #[test]
        fn contains_edges() {
            let b = boxed(0.0, 0.0, 5.0);
            assert!(b.contains(Vec2::new(5.0, -5.0)));
            assert!(!b.contains(Vec2::new(5.1, 0.0)));
        }
    }

    mod new {
        use super::*;

        #[test]
        #[should_panic(expected = "broad-phase cell must have a positive size")]
        fn rejects_zero_cell() {
            SpatialHash::new(0.0);
        }

        #[test]
        #[should_panic(expected = "broad-phase cell must have a positive size")]
        fn rejects_nan_cell() {
            SpatialHash::new(f32::NAN);
        }
    }

    mod query {
        use super::*;

        #[test]
        fn large_box_spans_several_cells() {
            let mut hash = SpatialHash::new(10.0);
            hash.rebuild([(0, boxed(15.0, 15.0, 12.0))]);
            assert!(hash.cells.len() >= 9);
            let mut out = Vec::new();
            hash.query(&boxed(24.0, 24.0, 1.0), &mut out);
            assert_eq!(out, vec![0]);
        }

        #[test]
        fn reports_each_slot_once() {
            let mut hash = SpatialHash::new(10.0);
            hash.rebuild([(3, boxed(10.0, 10.0, 9.0)), (7, boxed(12.0, 12.0, 9.0))]);
            let mut out = Vec::new();
            hash.query(&boxed(10.0, 10.0, 9.0), &mut out);
            assert_eq!(out, vec![3, 7]);
        }

        #[test]
        fn far_query_is_empty() {
            let mut hash = SpatialHash::new(10.0);
            hash.rebuild([(0, boxed(5.0, 5.0, 2.0))]);
            let mut out = vec![42];
            hash.query(&boxed(500.0, 500.0, 2.0), &mut out);
            assert!(out.is_empty());
        }

        #[test]
        fn rebuild_discards_previous_layout() {
            let mut hash = SpatialHash::new(10.0);
            hash.rebuild([(0, boxed(5.0, 5.0, 2.0))]);
            hash.rebuild([(1, boxed(55.0, 55.0, 2.0))]);
            let mut out = Vec::new();
            hash.query(&boxed(5.0, 5.0, 2.0), &mut out);
            assert!(out.is_empty());
            hash.clear();
            hash.query(&boxed(55.0, 55.0, 2.0), &mut out);
            assert!(out.is_empty());
        }
    }
}
