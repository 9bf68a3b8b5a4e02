//! Fast Marching Method time field that orders pixels for inpainting

use super::heap::IndexedHeap;
use crate::types::Label;
use ndarray::Array2;

/// A pixel whose arrival time has just been frozen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub row: usize,
    pub col: usize,
    /// Arrival time including the field's offset
    pub time: f64,
}

/// Labeled grid plus the wavefront heap
///
/// Known pixels are seeds at time 0. Inside pixels are reached through the
/// 4-connected upwind solution of `|grad T| = 1`.
#[derive(Debug, Clone)]
pub struct TimeField {
    rows: usize,
    cols: usize,
    labels: Array2<Label>,
    times: Array2<f64>,
    heap: IndexedHeap,
    offset: f64,
    // Everything before this linear index has left the Inside state
    scan_cursor: usize,
}

impl TimeField {
    /// Build the field from an initial domain and seed the wavefront
    ///
    /// `offset` is added to every reported time.
    pub fn from_domain(labels: Array2<Label>, offset: f64) -> Self {
        let (rows, cols) = labels.dim();
        let times = labels.mapv(|l| if l == Label::Known { 0.0 } else { f64::INFINITY });
        let mut field = Self {
            rows,
            cols,
            labels,
            times,
            heap: IndexedHeap::new(rows * cols),
            offset,
            scan_cursor: 0,
        };
        field.seed_band();
        field
    }

    /// Current domain labels
    pub fn labels(&self) -> &Array2<Label> {
        &self.labels
    }

    pub fn label(&self, row: usize, col: usize) -> Label {
        self.labels[(row, col)]
    }

    /// Arrival time without the offset; `+inf` until reached
    pub fn time(&self, row: usize, col: usize) -> f64 {
        self.times[(row, col)]
    }

    /// Number of pixels currently on the wavefront
    pub fn band_len(&self) -> usize {
        self.heap.len()
    }

    /// Freeze the next pixel in arrival order and advance the wavefront
    ///
    /// The returned pixel is labelled `ToInpaint`; call [`mark_known`](Self::mark_known)
    /// once it has been reconstructed.
    pub fn pop_next(&mut self) -> Option<Resolved> {
        loop {
            if let Some(entry) = self.heap.pop() {
                let (row, col) = (entry.pixel / self.cols, entry.pixel % self.cols);
                self.labels[(row, col)] = Label::ToInpaint;
                self.times[(row, col)] = entry.time;

                for (nr, nc) in self.neighbors(row, col) {
                    self.update_neighbor(nr, nc);
                }

                return Some(Resolved {
                    row,
                    col,
                    time: self.offset + entry.time,
                });
            }

            // Nothing reachable is left; restart from an isolated Inside pixel
            let (row, col) = self.next_unreached()?;
            self.labels[(row, col)] = Label::Band;
            self.heap.push(row * self.cols + col, f64::INFINITY);
        }
    }

    /// Finish the transition of a reconstructed pixel
    pub fn mark_known(&mut self, row: usize, col: usize) {
        debug_assert_eq!(self.labels[(row, col)], Label::ToInpaint);
        self.labels[(row, col)] = Label::Known;
    }

    fn seed_band(&mut self) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if self.labels[(row, col)] != Label::Inside {
                    continue;
                }
                let touches_frozen = self
                    .neighbors(row, col)
                    .any(|(nr, nc)| self.labels[(nr, nc)].is_frozen());
                if touches_frozen {
                    let time = self.solve(row, col);
                    self.labels[(row, col)] = Label::Band;
                    self.heap.push(row * self.cols + col, time);
                }
            }
        }
    }

    fn update_neighbor(&mut self, row: usize, col: usize) {
        match self.labels[(row, col)] {
            Label::Inside => {
                let time = self.solve(row, col);
                self.labels[(row, col)] = Label::Band;
                self.heap.push(row * self.cols + col, time);
            }
            Label::Band => {
                let time = self.solve(row, col);
                self.heap.decrease_key(row * self.cols + col, time);
            }
            Label::Known | Label::ToInpaint => {}
        }
    }

    fn next_unreached(&mut self) -> Option<(usize, usize)> {
        let total = self.rows * self.cols;
        while self.scan_cursor < total {
            let (row, col) = (self.scan_cursor / self.cols, self.scan_cursor % self.cols);
            if self.labels[(row, col)] == Label::Inside {
                return Some((row, col));
            }
            self.scan_cursor += 1;
        }
        None
    }

    /// Smallest frozen time along one axis, `+inf` if none
    fn axis_min(&self, a: Option<(usize, usize)>, b: Option<(usize, usize)>) -> f64 {
        [a, b]
            .into_iter()
            .flatten()
            .filter(|&p| self.labels[p].is_frozen())
            .map(|p| self.times[p])
            .fold(f64::INFINITY, f64::min)
    }

    /// Upwind solution of the eikonal equation from frozen neighbors
    fn solve(&self, row: usize, col: usize) -> f64 {
        let up = row.checked_sub(1).map(|r| (r, col));
        let down = (row + 1 < self.rows).then_some((row + 1, col));
        let left = col.checked_sub(1).map(|c| (row, c));
        let right = (col + 1 < self.cols).then_some((row, col + 1));

        let a = self.axis_min(up, down);
        let b = self.axis_min(left, right);
        eikonal_update(a, b)
    }

    fn neighbors(&self, row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> {
        let (rows, cols) = (self.rows, self.cols);
        [
            (row.wrapping_sub(1), col),
            (row + 1, col),
            (row, col.wrapping_sub(1)),
            (row, col + 1),
        ]
        .into_iter()
        .filter(move |&(r, c)| r < rows && c < cols)
    }
}

/// Combine the two axis minima into an arrival time
///
/// Never produces NaN: infinite inputs take the one-sided branch.
pub fn eikonal_update(a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo.is_infinite() {
        return f64::INFINITY;
    }
    if hi.is_infinite() || hi - lo >= 1.0 {
        return lo + 1.0;
    }
    let diff = hi - lo;
    let time = (lo + hi + (2.0 - diff * diff).sqrt()) / 2.0;
    time.max(hi)
}
