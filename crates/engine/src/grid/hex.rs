use std::fmt;

use serde::{Deserialize, Serialize};

/// Axial hex coordinate. The implicit third cube axis is `s = -q - r`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

const AXIAL_DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

impl HexCoord {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn s(self) -> i32 {
        -self.q - self.r
    }

    pub fn distance(self, other: HexCoord) -> u32 {
        let dq = self.q.abs_diff(other.q);
        let dr = self.r.abs_diff(other.r);
        let ds = self.s().abs_diff(other.s());
        (dq + dr + ds) / 2
    }

    pub fn is_adjacent(self, other: HexCoord) -> bool {
        self.distance(other) == 1
    }

    /// Neighbors in a fixed E, NE, NW, W, SW, SE order.
    pub fn neighbors(self) -> [HexCoord; 6] {
        AXIAL_DIRECTIONS.map(|(dq, dr)| HexCoord {
            q: self.q + dq,
            r: self.r + dr,
        })
    }

    /// Every cell within `radius`, ordered by distance, then `q`, then `r`.
    pub fn cells_within(self, radius: u32) -> Vec<HexCoord> {
        let radius = radius as i32;
        let mut cells = Vec::new();
        for dq in -radius..=radius {
            let r_min = (-radius).max(-dq - radius);
            let r_max = radius.min(-dq + radius);
            for dr in r_min..=r_max {
                cells.push(HexCoord {
                    q: self.q + dq,
                    r: self.r + dr,
                });
            }
        }
        cells.sort_by_key(|cell| (self.distance(*cell), cell.q, cell.r));
        cells
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}
