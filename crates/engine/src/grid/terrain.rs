use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::HexCoord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Plains,
    Forest,
    Hills,
    Water,
    Mountain,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementClass {
    #[default]
    Infantry,
    Cavalry,
    Siege,
    Structure,
}

/// Read-only tile data consumed by occupancy checks and the pathfinder.
pub trait TerrainProvider: Send + Sync {
    fn contains(&self, cell: HexCoord) -> bool;

    /// `None` means the cell can never be entered by this movement class.
    fn entry_cost(&self, cell: HexCoord, movement: MovementClass) -> Option<u32>;
}

/// Rectangular axial map: `0 <= q < width`, `0 <= r < height`.
#[derive(Debug, Clone, PartialEq)]
pub struct HexTilemap {
    width: u32,
    height: u32,
    tiles: Vec<TileKind>,
    slowed: BTreeSet<HexCoord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("cell {cell} is outside the {width}x{height} map")]
    OutOfBounds {
        cell: HexCoord,
        width: u32,
        height: u32,
    },
}

impl HexTilemap {
    pub fn new(width: u32, height: u32, tiles: Vec<TileKind>) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            tiles,
            slowed: BTreeSet::new(),
        })
    }

    pub fn filled(width: u32, height: u32, kind: TileKind) -> Self {
        Self {
            width,
            height,
            tiles: vec![kind; width as usize * height as usize],
            slowed: BTreeSet::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index_of(&self, cell: HexCoord) -> Option<usize> {
        if cell.q < 0 || cell.r < 0 {
            return None;
        }
        let (q, r) = (cell.q as u32, cell.r as u32);
        if q >= self.width || r >= self.height {
            return None;
        }
        Some(r as usize * self.width as usize + q as usize)
    }

    pub fn tile_at(&self, cell: HexCoord) -> Option<TileKind> {
        self.index_of(cell)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn set_tile(&mut self, cell: HexCoord, kind: TileKind) -> Result<(), TilemapError> {
        let index = self.index_of(cell).ok_or(TilemapError::OutOfBounds {
            cell,
            width: self.width,
            height: self.height,
        })?;
        self.tiles[index] = kind;
        Ok(())
    }

    pub fn set_slowed(&mut self, cell: HexCoord, slowed: bool) {
        if slowed {
            self.slowed.insert(cell);
        } else {
            self.slowed.remove(&cell);
        }
    }

    pub fn is_slowed(&self, cell: HexCoord) -> bool {
        self.slowed.contains(&cell)
    }
}

impl TerrainProvider for HexTilemap {
    fn contains(&self, cell: HexCoord) -> bool {
        self.index_of(cell).is_some()
    }

    fn entry_cost(&self, cell: HexCoord, movement: MovementClass) -> Option<u32> {
        let base = tile_entry_cost(self.tile_at(cell)?, movement)?;
        let slow_penalty = if self.is_slowed(cell) { 1 } else { 0 };
        Some(base + slow_penalty)
    }
}

fn tile_entry_cost(kind: TileKind, movement: MovementClass) -> Option<u32> {
    match (kind, movement) {
        (TileKind::Water, _) => None,
        (TileKind::Mountain, MovementClass::Infantry) => Some(3),
        (TileKind::Mountain, _) => None,
        (TileKind::Plains, _) => Some(1),
        (TileKind::Forest, MovementClass::Cavalry) => Some(3),
        (TileKind::Forest, _) => Some(2),
        (TileKind::Hills, MovementClass::Siege) => Some(3),
        (TileKind::Hills, _) => Some(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_tile_count() {
        let err = HexTilemap::new(3, 2, vec![TileKind::Plains; 5]).expect_err("mismatch");
        assert_eq!(
            err,
            TilemapError::TileCountMismatch {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn bounds_follow_width_and_height() {
        let map = HexTilemap::filled(4, 3, TileKind::Plains);
        assert!(map.contains(HexCoord::new(0, 0)));
        assert!(map.contains(HexCoord::new(3, 2)));
        assert!(!map.contains(HexCoord::new(4, 0)));
        assert!(!map.contains(HexCoord::new(0, 3)));
        assert!(!map.contains(HexCoord::new(-1, 1)));
    }

    #[test]
    fn entry_cost_depends_on_tile_class_and_slow_tag() {
        let mut map = HexTilemap::filled(3, 1, TileKind::Plains);
        map.set_tile(HexCoord::new(1, 0), TileKind::Forest)
            .expect("in bounds");
        map.set_tile(HexCoord::new(2, 0), TileKind::Water)
            .expect("in bounds");

        assert_eq!(
            map.entry_cost(HexCoord::new(0, 0), MovementClass::Infantry),
            Some(1)
        );
        assert_eq!(
            map.entry_cost(HexCoord::new(1, 0), MovementClass::Cavalry),
            Some(3)
        );
        assert_eq!(
            map.entry_cost(HexCoord::new(2, 0), MovementClass::Infantry),
            None
        );

        map.set_slowed(HexCoord::new(0, 0), true);
        assert_eq!(
            map.entry_cost(HexCoord::new(0, 0), MovementClass::Infantry),
            Some(2)
        );
    }

    #[test]
    fn set_tile_outside_map_is_an_error() {
        let mut map = HexTilemap::filled(2, 2, TileKind::Plains);
        assert!(matches!(
            map.set_tile(HexCoord::new(5, 5), TileKind::Hills),
            Err(TilemapError::OutOfBounds { .. })
        ));
    }
}
