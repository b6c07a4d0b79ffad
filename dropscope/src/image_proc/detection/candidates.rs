//! Candidate circles and the accepted/rejected bookkeeping around them.

use serde::{Deserialize, Serialize};

/// A detected circle in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Circle {
    pub x: i32,
    pub y: i32,
    pub r: i32,
}

impl Circle {
    pub fn new(x: i32, y: i32, r: i32) -> Self {
        Self { x, y, r }
    }

    /// Disks overlap when the squared center distance is below `(r1 + r2)²`.
    pub fn overlaps(&self, other: &Circle) -> bool {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let reach = (self.r + other.r) as i64;
        reach * reach > dx * dx + dy * dy
    }
}

/// Ordered candidate set during detection.
///
/// `accepted` keeps detection-completion order: first-pass circles in
/// detector order, merged circles appended as clusters are resolved.
/// `rejected` keeps every circle removed along the way, for display only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    accepted: Vec<Circle>,
    rejected: Vec<Circle>,
}

impl CandidateSet {
    pub fn new(circles: Vec<Circle>) -> Self {
        Self {
            accepted: circles,
            rejected: Vec::new(),
        }
    }

    pub fn accepted(&self) -> &[Circle] {
        &self.accepted
    }

    pub fn rejected(&self) -> &[Circle] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Move every accepted circle matching `predicate` to the rejected list,
    /// preserving relative order on both sides. Returns how many moved.
    pub fn reject_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Circle) -> bool,
    {
        let before = self.accepted.len();
        let mut kept = Vec::with_capacity(before);
        for circle in self.accepted.drain(..) {
            if predicate(&circle) {
                self.rejected.push(circle);
            } else {
                kept.push(circle);
            }
        }
        self.accepted = kept;
        before - self.accepted.len()
    }

    /// Replace every accepted circle overlapping `merged` with `merged` itself.
    ///
    /// Removal and insertion happen together; the returned circles are the
    /// ones that were replaced.
    pub fn replace_cluster(&mut self, merged: Circle) -> Vec<Circle> {
        let mut replaced = Vec::new();
        self.accepted.retain(|c| {
            if merged.overlaps(c) {
                replaced.push(*c);
                false
            } else {
                true
            }
        });
        self.rejected.extend(replaced.iter().copied());
        self.accepted.push(merged);
        replaced
    }

    pub fn into_parts(self) -> (Vec<Circle>, Vec<Circle>) {
        (self.accepted, self.rejected)
    }
}
