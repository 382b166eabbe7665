use crate::core::geo::Point;
use crate::prelude::HashMap;
use serde::{Deserialize, Serialize};

/// Screen-space label rectangle, top-left origin, pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl ScreenBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Box of the given size centred on `center`
    pub fn centered(center: Point, w: f64, h: f64) -> Self {
        Self::new(center.x - w / 2.0, center.y - h / 2.0, w, h)
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Interiors overlap; shared edges do not count
    pub fn intersects(&self, other: &ScreenBox) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Fixed-cell spatial hash over accepted screen boxes.
///
/// Every box is registered in each cell it covers, so a query only has to
/// look at the cells around the probe box.
#[derive(Debug, Clone)]
pub struct ScreenGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    boxes: Vec<ScreenBox>,
}

impl ScreenGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::default(),
            boxes: Vec::new(),
        }
    }

    fn cell_of(&self, v: f64) -> i64 {
        (v / self.cell_size).floor() as i64
    }

    fn cell_span(&self, b: &ScreenBox) -> (i64, i64, i64, i64) {
        (
            self.cell_of(b.x),
            self.cell_of(b.right()),
            self.cell_of(b.y),
            self.cell_of(b.bottom()),
        )
    }

    /// Whether `probe` overlaps any stored box, checking the covered cells
    /// and their neighbours.
    pub fn collides(&self, probe: &ScreenBox) -> bool {
        let (x0, x1, y0, y1) = self.cell_span(probe);
        for cx in (x0 - 1)..=(x1 + 1) {
            for cy in (y0 - 1)..=(y1 + 1) {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                if bucket.iter().any(|&i| self.boxes[i].intersects(probe)) {
                    return true;
                }
            }
        }
        false
    }

    pub fn insert(&mut self, b: ScreenBox) {
        let idx = self.boxes.len();
        self.boxes.push(b);
        let (x0, x1, y0, y1) = self.cell_span(&b);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.cells.entry((cx, cy)).or_default().push(idx);
            }
        }
    }

    /// Insert unless it collides. Returns whether the box was accepted.
    pub fn try_insert(&mut self, b: ScreenBox) -> bool {
        if self.collides(&b) {
            return false;
        }
        self.insert(b);
        true
    }

    pub fn boxes(&self) -> &[ScreenBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.boxes.clear();
    }
}
