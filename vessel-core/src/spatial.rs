//! Range queries over bounded items.

use ahash::AHashMap;
use glam::DVec3;

use crate::segment::Aabb;

/// Answers "which items might overlap this box".
///
/// Results may include false positives; callers run the exact predicate.
pub trait SpatialIndex<T> {
    fn query(&self, bounds: &Aabb, visitor: &mut dyn FnMut(&T));
}

/// Upper bound on cells an item is registered in, or a query visits,
/// before falling back to a linear list.
const MAX_CELLS: i64 = 4096;

type CellKey = (i64, i64, i64);

/// Uniform spatial hash.
///
/// Each item is registered in every cell its bounds touch, except items
/// spanning more than [`MAX_CELLS`] cells, which every query checks
/// directly. Queries visit matching items once each, in insertion order.
#[derive(Debug)]
pub struct UniformGrid<T> {
    items: Vec<(Aabb, T)>,
    cells: AHashMap<CellKey, Vec<usize>>,
    oversized: Vec<usize>,
    inv_cell: f64,
}

impl<T> UniformGrid<T> {
    pub fn new(cell: f64) -> Self {
        let cell = if cell.is_finite() && cell > 0.0 { cell } else { 1.0 };
        Self {
            items: Vec::new(),
            cells: AHashMap::default(),
            oversized: Vec::new(),
            inv_cell: 1.0 / cell,
        }
    }

    /// Builds a grid with a cell size matched to the mean item extent.
    pub fn from_items(items: impl IntoIterator<Item = (Aabb, T)>) -> Self {
        let items: Vec<(Aabb, T)> = items.into_iter().collect();
        let mean_extent = if items.is_empty() {
            1.0
        } else {
            items
                .iter()
                .map(|(b, _)| b.extent().max_element())
                .sum::<f64>()
                / items.len() as f64
        };
        let mut grid = Self::new(mean_extent);
        for (bounds, item) in items {
            grid.insert(bounds, item);
        }
        grid
    }

    pub fn insert(&mut self, bounds: Aabb, item: T) {
        let index = self.items.len();
        let (lo, hi) = (self.key(bounds.min), self.key(bounds.max));
        if cell_count(lo, hi) > MAX_CELLS {
            self.oversized.push(index);
            self.items.push((bounds, item));
            return;
        }
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    self.cells.entry((x, y, z)).or_default().push(index);
                }
            }
        }
        self.items.push((bounds, item));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn key(&self, p: DVec3) -> CellKey {
        (
            floor_sat(p.x * self.inv_cell),
            floor_sat(p.y * self.inv_cell),
            floor_sat(p.z * self.inv_cell),
        )
    }
}

impl<T> SpatialIndex<T> for UniformGrid<T> {
    fn query(&self, bounds: &Aabb, visitor: &mut dyn FnMut(&T)) {
        let (lo, hi) = (self.key(bounds.min), self.key(bounds.max));
        let mut hits: Vec<usize> = if cell_count(lo, hi) > MAX_CELLS {
            (0..self.items.len()).collect()
        } else {
            let mut hits = self.oversized.clone();
            for x in lo.0..=hi.0 {
                for y in lo.1..=hi.1 {
                    for z in lo.2..=hi.2 {
                        if let Some(ids) = self.cells.get(&(x, y, z)) {
                            hits.extend_from_slice(ids);
                        }
                    }
                }
            }
            hits.sort_unstable();
            hits.dedup();
            hits
        };
        hits.retain(|&i| self.items[i].0.intersects(bounds));
        for i in hits {
            visitor(&self.items[i].1);
        }
    }
}

/// Number of cells in the box from `lo` to `hi`, saturating.
fn cell_count(lo: CellKey, hi: CellKey) -> i64 {
    let span = |a: i64, b: i64| b.saturating_sub(a).saturating_add(1);
    span(lo.0, hi.0)
        .saturating_mul(span(lo.1, hi.1))
        .saturating_mul(span(lo.2, hi.2))
}

#[inline]
fn floor_sat(x: f64) -> i64 {
    if !x.is_finite() {
        return if x.is_sign_positive() { i64::MAX } else { i64::MIN };
    }
    x.floor() as i64
}
