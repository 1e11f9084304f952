//! Neighbourhood plumbing shared by smoothing, plateau detection, basin growth
//! and Laplacian lookups: connectivity, boundary policies and a reusable
//! bounded breadth-first search.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 4-connected offsets as `(dx, dy)`.
pub const N4_OFFSETS: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
/// 8-connected offsets as `(dx, dy)`.
pub const N8_OFFSETS: [(isize, isize); 8] =
    [(1, 0), (-1, 0), (0, 1), (0, -1), (1, 1), (1, -1), (-1, 1), (-1, -1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connectivity {
    #[serde(alias = "4")]
    Four,
    #[serde(alias = "8")]
    Eight,
}

impl Connectivity {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &N4_OFFSETS,
            Connectivity::Eight => &N8_OFFSETS,
        }
    }
}

/// What an out-of-range neighbour index becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    /// Reflect into range without repeating the edge sample (`-1 → 1`).
    Mirror,
    /// Snap to the nearest edge sample.
    Clamp,
    /// Drop the neighbour.
    Skip,
}

/// Map index `i` onto `0..n` under `policy`. `None` when the neighbour is dropped.
pub fn resolve_index(i: isize, n: usize, policy: BoundaryPolicy) -> Option<usize> {
    if n == 0 {
        return None;
    }
    if i >= 0 && (i as usize) < n {
        return Some(i as usize);
    }
    match policy {
        BoundaryPolicy::Skip => None,
        BoundaryPolicy::Clamp => Some(i.clamp(0, n as isize - 1) as usize),
        BoundaryPolicy::Mirror => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * (n as isize - 1);
            let m = i.rem_euclid(period);
            Some(if m < n as isize { m } else { period - m } as usize)
        }
    }
}

/// Visit marks plus queue for repeated bounded searches over one grid.
///
/// Marks are compared against a per-search token instead of being cleared,
/// so starting a search is O(1). When the token reaches its limit the marks
/// are wiped once and counting restarts from 1.
#[derive(Debug, Clone)]
pub struct GridBfs {
    width: usize,
    height: usize,
    marks: Vec<u32>,
    token: u32,
    token_limit: u32,
    resets: usize,
    queue: VecDeque<usize>,
}

impl GridBfs {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            marks: vec![0; width * height],
            token: 0,
            token_limit: u32::MAX,
            resets: 0,
            queue: VecDeque::new(),
        }
    }

    /// Lower the wrap point (at least 1).
    pub fn with_token_limit(mut self, limit: u32) -> Self {
        self.token_limit = limit.max(1);
        self
    }

    /// Start a new search; marks from earlier searches become stale.
    pub fn begin(&mut self) {
        if self.token >= self.token_limit {
            self.marks.fill(0);
            self.token = 0;
            self.resets += 1;
        }
        self.token += 1;
    }

    #[inline]
    pub fn is_marked(&self, idx: usize) -> bool {
        self.marks[idx] == self.token
    }

    #[inline]
    pub fn mark(&mut self, idx: usize) {
        self.marks[idx] = self.token;
    }

    /// Grid `(width, height)` the marks cover.
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn token(&self) -> u32 {
        self.token
    }

    /// Times the marks have been wiped.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// In-grid neighbour of `idx` at offset `(dx, dy)` under `policy`.
    pub fn neighbour(&self, idx: usize, dx: isize, dy: isize, policy: BoundaryPolicy) -> Option<usize> {
        let (x, y) = ((idx % self.width) as isize, (idx / self.width) as isize);
        let nx = resolve_index(x + dx, self.width, policy)?;
        let ny = resolve_index(y + dy, self.height, policy)?;
        Some(ny * self.width + nx)
    }

    /// Breadth-first flood from `seed` in a fresh search. A neighbour joins
    /// when `admit(idx)` holds. Visited cells are written to `out`, seed first.
    pub fn flood<F>(
        &mut self,
        seed: usize,
        connectivity: Connectivity,
        policy: BoundaryPolicy,
        mut admit: F,
        out: &mut Vec<usize>,
    ) where
        F: FnMut(usize) -> bool,
    {
        out.clear();
        self.begin();
        self.queue.clear();
        self.mark(seed);
        self.queue.push_back(seed);
        while let Some(idx) = self.queue.pop_front() {
            out.push(idx);
            for &(dx, dy) in connectivity.offsets() {
                let Some(n) = self.neighbour(idx, dx, dy, policy) else { continue };
                if self.is_marked(n) || !admit(n) {
                    continue;
                }
                self.mark(n);
                self.queue.push_back(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_index_policies() {
        assert_eq!(resolve_index(-1, 5, BoundaryPolicy::Mirror), Some(1));
        assert_eq!(resolve_index(5, 5, BoundaryPolicy::Mirror), Some(3));
        assert_eq!(resolve_index(-9, 5, BoundaryPolicy::Mirror), Some(1));
        assert_eq!(resolve_index(-1, 1, BoundaryPolicy::Mirror), Some(0));
        assert_eq!(resolve_index(-3, 5, BoundaryPolicy::Clamp), Some(0));
        assert_eq!(resolve_index(7, 5, BoundaryPolicy::Clamp), Some(4));
        assert_eq!(resolve_index(5, 5, BoundaryPolicy::Skip), None);
        assert_eq!(resolve_index(2, 5, BoundaryPolicy::Skip), Some(2));
        assert_eq!(resolve_index(0, 0, BoundaryPolicy::Clamp), None);
    }

    #[test]
    fn flood_respects_connectivity() {
        // Diagonal line of admitted cells on a 3×3 grid.
        let open = [true, false, false, false, true, false, false, false, true];
        let mut bfs = GridBfs::new(3, 3);
        let mut out = Vec::new();
        bfs.flood(0, Connectivity::Four, BoundaryPolicy::Skip, |i| open[i], &mut out);
        assert_eq!(out, vec![0]);
        bfs.flood(0, Connectivity::Eight, BoundaryPolicy::Skip, |i| open[i], &mut out);
        assert_eq!(out, vec![0, 4, 8]);
    }

    #[test]
    fn token_wrap_wipes_stale_marks() {
        let mut bfs = GridBfs::new(4, 1).with_token_limit(2);
        let mut out = Vec::new();
        bfs.flood(0, Connectivity::Four, BoundaryPolicy::Skip, |_| true, &mut out);
        assert_eq!(out.len(), 4);
        bfs.flood(3, Connectivity::Four, BoundaryPolicy::Skip, |i| i >= 2, &mut out);
        assert_eq!(out, vec![3, 2]);
        assert_eq!(bfs.resets(), 0);

        // Third search wraps: token restarts at 1, which the first search
        // used, so every mark must have been wiped.
        bfs.flood(1, Connectivity::Four, BoundaryPolicy::Skip, |_| true, &mut out);
        assert_eq!(bfs.resets(), 1);
        assert_eq!(bfs.token(), 1);
        let mut sorted = out.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn mirror_neighbours_stay_in_grid() {
        let bfs = GridBfs::new(3, 2);
        assert_eq!(bfs.neighbour(0, -1, 0, BoundaryPolicy::Mirror), Some(1));
        assert_eq!(bfs.neighbour(5, 0, 1, BoundaryPolicy::Mirror), Some(2));
        assert_eq!(bfs.neighbour(5, 1, 0, BoundaryPolicy::Skip), None);
    }
}
