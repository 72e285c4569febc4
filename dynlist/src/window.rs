use alloc::vec::Vec;
use core::cmp;

use serde_json::Value;

use crate::{Bounds, ListWindow};

/// Bounds, offset and capacity of a materialized window over a remote list.
///
/// Positions handled here are *window positions*: `0` is `bounds.minimum_inclusive`, and the
/// container's first slot sits at `offset`. Container-local index `i` therefore maps to window
/// position `offset + i` and to absolute index `minimum_inclusive + offset + i`.
///
/// Window positions are taken as `i128` so that absolute indexes from the wire can be converted
/// without overflow, whatever the bounds.
///
/// Invariant: `offset + container.len() <= max_items` after every operation that is given the
/// container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetWindow {
    bounds: Bounds,
    offset: usize,
    max_items: usize,
}

impl OffsetWindow {
    /// Creates a window starting at `start_index`.
    ///
    /// Returns `None` unless `minimum_inclusive <= start_index < maximum_exclusive`.
    pub fn new(bounds: Bounds, start_index: i64) -> Option<Self> {
        if bounds.minimum_inclusive > start_index || bounds.maximum_exclusive <= start_index {
            return None;
        }
        let offset = usize::try_from(start_index.abs_diff(bounds.minimum_inclusive))
            .unwrap_or(usize::MAX);
        Some(Self {
            bounds,
            offset,
            max_items: bounds.span(),
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Converts an absolute remote index to a window position.
    pub fn position_of(&self, index: i64) -> i128 {
        i128::from(index) - i128::from(self.bounds.minimum_inclusive)
    }

    /// Converts a window position back to an absolute remote index.
    pub fn absolute_index(&self, position: usize) -> i64 {
        let abs = i128::from(self.bounds.minimum_inclusive) + position as i128;
        i64::try_from(abs).unwrap_or(i64::MAX)
    }

    /// Whether a window position lies before the first materialized slot.
    pub fn precedes_window(&self, position: i128) -> bool {
        position < self.offset as i128
    }

    /// Trims items that would not fit between the window start and the upper bound.
    pub fn fit(&mut self, items: &mut dyn ListWindow) {
        let len = items.len();
        let room = self.max_items.saturating_sub(self.offset);
        if len > room {
            ldebug!(len, room, "OffsetWindow::fit: trimming initial items");
            items.remove(room, len - room);
        }
    }

    /// Replace-in-place write of `values` starting at window position `position`.
    ///
    /// Slots overlapping the materialized window are replaced; values falling directly before
    /// the window are prepended (consuming offset slack) and values directly after it are
    /// appended. Values beyond capacity are dropped. A write that would leave a gap, or that
    /// has nothing left after clipping, fails.
    pub fn write(&mut self, items: &mut dyn ListWindow, position: i128, values: Vec<Value>) -> bool {
        if values.is_empty() || position < 0 {
            return false;
        }
        let offset = self.offset as i128;
        let end = offset + items.len() as i128;
        let cap = self.max_items as i128;
        let n = values.len() as i128;
        if position > end || position + n < offset || position >= cap {
            return false;
        }

        let mut values = values;
        if position + n > cap {
            values.truncate((cap - position) as usize);
        }
        let n = values.len() as i128;

        let prepend_count = (offset - position).clamp(0, n) as usize;
        let mut rest = values.split_off(prepend_count);
        let prepend = values;

        let overlap_start = cmp::max(position, offset);
        let overlap_end = cmp::min(position + n, end);
        let overlap_count = (overlap_end - overlap_start).max(0) as usize;
        let append = rest.split_off(overlap_count);
        let overlap = rest;

        if !overlap.is_empty() && !items.replace((overlap_start - offset) as usize, overlap) {
            return false;
        }
        if !append.is_empty() {
            let at = items.len();
            if !items.insert(at, append) {
                return false;
            }
        }
        if !prepend.is_empty() {
            let count = prepend.len();
            if !items.insert(0, prepend) {
                return false;
            }
            self.offset -= count;
        }
        true
    }

    /// Inserts `values` at window position `position`, shifting later slots.
    ///
    /// The position must fall inside the materialized window or directly after it.
    pub fn insert(&mut self, items: &mut dyn ListWindow, position: i128, values: Vec<Value>) -> bool {
        let Some(local) = self.local_index(items.len(), position) else {
            return false;
        };
        if values.is_empty() {
            return false;
        }
        items.insert(local, values)
    }

    /// Overwrites the single materialized slot at window position `position`.
    pub fn replace(&mut self, items: &mut dyn ListWindow, position: i128, value: Value) -> bool {
        let len = items.len();
        match self.local_index(len, position) {
            Some(local) if local < len => items.replace(local, alloc::vec![value]),
            _ => false,
        }
    }

    /// Removes `count` materialized slots starting at window position `position`.
    pub fn remove(&mut self, items: &mut dyn ListWindow, position: i128, count: usize) -> bool {
        let len = items.len();
        let Some(local) = self.local_index(len, position) else {
            return false;
        };
        if count == 0 || local.saturating_add(count) > len {
            return false;
        }
        items.remove(local, count)
    }

    fn local_index(&self, len: usize, position: i128) -> Option<usize> {
        let local = position - self.offset as i128;
        if local < 0 || local > len as i128 {
            return None;
        }
        Some(local as usize)
    }

    /// Moves a finite upper bound up by `count` after items were inserted.
    pub fn grow(&mut self, count: usize) {
        if !self.bounds.has_finite_max() {
            return;
        }
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        self.bounds.maximum_exclusive = self
            .bounds
            .maximum_exclusive
            .saturating_add(count)
            .min(crate::UNBOUNDED_MAX - 1);
        self.max_items = self.bounds.span();
    }

    /// Moves a finite upper bound down by `count` after items were removed.
    pub fn shrink(&mut self, count: usize) {
        if !self.bounds.has_finite_max() {
            return;
        }
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        self.bounds.maximum_exclusive = self.bounds.maximum_exclusive.saturating_sub(count);
        self.max_items = self.bounds.span();
    }

    /// Tightens the bounds. Widening requests are ignored.
    ///
    /// Returns whether either bound moved. When a container is supplied it is reshaped to the
    /// new extent: slots that fall below the new lower bound are trimmed from the front (after
    /// consuming offset slack), slots beyond the new capacity are trimmed from the tail, and a
    /// collapsed extent (`max <= min`) clears it and resets the bounds to `(0, 0)`.
    pub fn update_bounds(
        &mut self,
        mut items: Option<&mut dyn ListWindow>,
        minimum_inclusive: i64,
        maximum_exclusive: i64,
    ) -> bool {
        let mut changed = false;

        if minimum_inclusive > self.bounds.minimum_inclusive {
            let delta = usize::try_from(minimum_inclusive.abs_diff(self.bounds.minimum_inclusive))
                .unwrap_or(usize::MAX);
            let absorbed = cmp::min(delta, self.offset);
            self.offset -= absorbed;
            self.bounds.minimum_inclusive = minimum_inclusive;
            changed = true;

            let trim = delta - absorbed;
            if let Some(items) = items.as_deref_mut() {
                let trim = cmp::min(trim, items.len());
                if trim > 0 {
                    ltrace!(trim, "OffsetWindow::update_bounds: trimming front");
                    items.remove(0, trim);
                }
            }
        }

        if maximum_exclusive < self.bounds.maximum_exclusive {
            self.bounds.maximum_exclusive = maximum_exclusive;
            changed = true;
        }

        if self.bounds.maximum_exclusive <= self.bounds.minimum_inclusive {
            self.bounds = Bounds::new(0, 0);
            self.max_items = 0;
            self.offset = 0;
            if let Some(items) = items {
                let len = items.len();
                if len > 0 {
                    items.remove(0, len);
                }
            }
            return changed;
        }

        self.max_items = self.bounds.span();
        self.offset = cmp::min(self.offset, self.max_items);
        if let Some(items) = items {
            let len = items.len();
            let room = self.max_items - self.offset;
            if len > room {
                ltrace!(trim = len - room, "OffsetWindow::update_bounds: trimming tail");
                items.remove(room, len - room);
            }
        }
        changed
    }

    /// Computes the fetches needed to serve container-local index `index`.
    ///
    /// Returns `(backward, forward)` as `(window position, count)` pairs: `backward` covers up
    /// to `chunk` slots before the window when `index` is within one chunk of its start,
    /// `forward` up to `chunk` slots after it when `index` is within one chunk of its end.
    pub fn demand(
        &self,
        index: usize,
        len: usize,
        chunk: usize,
    ) -> (Option<(usize, usize)>, Option<(usize, usize)>) {
        if chunk == 0 {
            return (None, None);
        }

        let backward = if self.offset > 0 && index < chunk {
            let count = cmp::min(self.offset, chunk);
            Some((self.offset - count, count))
        } else {
            None
        };

        let end = self.offset.saturating_add(len);
        let forward = if end < self.max_items && index.saturating_add(chunk) >= len {
            let count = cmp::min(chunk, self.max_items - end);
            Some((end, count))
        } else {
            None
        };

        (backward, forward)
    }
}
