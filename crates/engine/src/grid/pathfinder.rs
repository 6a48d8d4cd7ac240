use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::{HexCoord, MovementClass, TerrainProvider};

pub const DEFAULT_MAX_CELLS_TO_SEARCH: usize = 5000;
pub const DEFAULT_MAX_CELLS_TO_SEARCH_WHEN_UNREACHABLE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_cells_to_search: usize,
    pub max_cells_to_search_when_unreachable: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_cells_to_search: DEFAULT_MAX_CELLS_TO_SEARCH,
            max_cells_to_search_when_unreachable: DEFAULT_MAX_CELLS_TO_SEARCH_WHEN_UNREACHABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRequest {
    pub start: HexCoord,
    pub destination: HexCoord,
    pub movement: MovementClass,
}

/// Cells to step through, excluding the start cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub cells: Vec<HexCoord>,
    pub reached_requested_destination: bool,
    pub cost: u32,
}

impl Path {
    pub fn first_step(&self) -> Option<HexCoord> {
        self.cells.first().copied()
    }

    pub fn end(&self) -> Option<HexCoord> {
        self.cells.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathfindError {
    #[error("path reconstruction from {start} to {end} exceeded {bound} steps")]
    ReconstructionOverflow {
        start: HexCoord,
        end: HexCoord,
        bound: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    coord: HexCoord,
    g_cost: u32,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    g_cost: u32,
    parent: Option<HexCoord>,
    closed: bool,
}

/// A* over hex cells with terrain entry costs and hex-distance heuristic.
///
/// `blocked` reports cells the mover may not enter because of occupancy; the
/// start cell is never tested. When the destination cannot be reached within
/// the expansion budget the path leads to the expanded cell closest to it.
pub fn find_path(
    terrain: &dyn TerrainProvider,
    blocked: &dyn Fn(HexCoord) -> bool,
    request: PathRequest,
    limits: SearchLimits,
) -> Result<Path, PathfindError> {
    let PathRequest {
        start,
        destination,
        movement,
    } = request;
    if start == destination {
        return Ok(Path {
            cells: Vec::new(),
            reached_requested_destination: true,
            cost: 0,
        });
    }

    let destination_unenterable =
        !terrain.contains(destination) || terrain.entry_cost(destination, movement).is_none();
    let budget = if destination_unenterable {
        limits.max_cells_to_search_when_unreachable
    } else {
        limits.max_cells_to_search
    };

    let mut records: HashMap<HexCoord, NodeRecord> = HashMap::new();
    let mut expanded: Vec<OpenNode> = Vec::new();
    let mut open = Vec::new();
    let mut next_insertion = 0u64;

    let start_h = start.distance(destination);
    records.insert(
        start,
        NodeRecord {
            g_cost: 0,
            parent: None,
            closed: false,
        },
    );
    open.push(OpenNode {
        coord: start,
        g_cost: 0,
        h_cost: start_h,
        f_cost: start_h,
        insertion_order: next_insertion,
    });
    next_insertion = next_insertion.saturating_add(1);

    while !open.is_empty() && expanded.len() < budget.max(1) {
        let best_index = pick_best_open_node_index(&open);
        let current = open.swap_remove(best_index);
        let Some(record) = records.get_mut(&current.coord) else {
            continue;
        };
        if record.closed || current.g_cost > record.g_cost {
            continue;
        }
        record.closed = true;
        expanded.push(current);

        if current.coord == destination {
            let cells = reconstruct_path(&records, start, destination, budget)?;
            return Ok(Path {
                cells,
                reached_requested_destination: true,
                cost: current.g_cost,
            });
        }

        for neighbor in current.coord.neighbors() {
            if !terrain.contains(neighbor) || blocked(neighbor) {
                continue;
            }
            let Some(entry_cost) = terrain.entry_cost(neighbor, movement) else {
                continue;
            };
            let tentative_g = current.g_cost.saturating_add(entry_cost);
            if let Some(existing) = records.get(&neighbor) {
                if existing.closed || tentative_g >= existing.g_cost {
                    continue;
                }
            }

            records.insert(
                neighbor,
                NodeRecord {
                    g_cost: tentative_g,
                    parent: Some(current.coord),
                    closed: false,
                },
            );
            let h_cost = neighbor.distance(destination);
            open.push(OpenNode {
                coord: neighbor,
                g_cost: tentative_g,
                h_cost,
                f_cost: tentative_g.saturating_add(h_cost),
                insertion_order: next_insertion,
            });
            next_insertion = next_insertion.saturating_add(1);
        }
    }

    let Some(best) = pick_best_alternative(&expanded) else {
        return Ok(Path {
            cells: Vec::new(),
            reached_requested_destination: false,
            cost: 0,
        });
    };
    debug!(
        start = %start,
        destination = %destination,
        fallback = %best.coord,
        expanded = expanded.len(),
        budget,
        "pathfind_destination_unreached"
    );
    let cells = reconstruct_path(&records, start, best.coord, budget)?;
    Ok(Path {
        cells,
        reached_requested_destination: false,
        cost: best.g_cost,
    })
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, i32, i32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.r,
        node.coord.q,
        node.insertion_order,
    )
}

fn pick_best_alternative(expanded: &[OpenNode]) -> Option<OpenNode> {
    expanded
        .iter()
        .copied()
        .min_by_key(|node| (node.h_cost, node.g_cost, node.coord.r, node.coord.q))
}

fn reconstruct_path(
    records: &HashMap<HexCoord, NodeRecord>,
    start: HexCoord,
    end: HexCoord,
    budget: usize,
) -> Result<Vec<HexCoord>, PathfindError> {
    // Every cell on a reconstructed path was expanded, so the path can never
    // be longer than the expansion budget.
    let bound = budget.saturating_add(1);
    let mut cells = Vec::new();
    let mut cursor = end;
    while cursor != start {
        if cells.len() > bound {
            debug_assert!(false, "path reconstruction exceeded {bound} steps");
            return Err(PathfindError::ReconstructionOverflow { start, end, bound });
        }
        cells.push(cursor);
        let parent = records.get(&cursor).and_then(|record| record.parent);
        let Some(parent) = parent else {
            debug_assert!(false, "path reconstruction lost its parent chain");
            return Err(PathfindError::ReconstructionOverflow { start, end, bound });
        };
        cursor = parent;
    }
    cells.reverse();
    Ok(cells)
}
