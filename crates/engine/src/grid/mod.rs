mod hex;
mod pathfinder;
mod spatial;
mod terrain;

pub use hex::HexCoord;
pub use pathfinder::{
    find_path, Path, PathRequest, PathfindError, SearchLimits, DEFAULT_MAX_CELLS_TO_SEARCH,
    DEFAULT_MAX_CELLS_TO_SEARCH_WHEN_UNREACHABLE,
};
pub use spatial::{SpatialError, SpatialIndex, StackOrderHint};
pub use terrain::{HexTilemap, MovementClass, TerrainProvider, TileKind, TilemapError};
