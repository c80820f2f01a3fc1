use std::collections::HashMap;

use glam::Vec3;
use spiralstream_common::InstanceId;

/// A quantized 3D cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// The occupant recorded for a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub id: InstanceId,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("cell {cell:?} is already occupied by {occupant}")]
    Occupied { cell: CellCoord, occupant: InstanceId },
}

/// Sparse uniform grid mapping each occupied cell to exactly one placement.
///
/// Queries scan a fixed cube of cells around a point, so their cost depends
/// on the scan radius only, never on how many placements exist.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<CellCoord, GridEntry>,
}

impl SpatialGrid {
    /// Create an empty grid with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert a world position to a cell coordinate (floor on every axis).
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord {
            x: (pos.x / self.cell_size).floor() as i32,
            y: (pos.y / self.cell_size).floor() as i32,
            z: (pos.z / self.cell_size).floor() as i32,
        }
    }

    /// Record an occupant. An occupied cell is never overwritten.
    pub fn insert(&mut self, cell: CellCoord, entry: GridEntry) -> Result<(), GridError> {
        if let Some(existing) = self.cells.get(&cell) {
            return Err(GridError::Occupied {
                cell,
                occupant: existing.id,
            });
        }
        self.cells.insert(cell, entry);
        Ok(())
    }

    pub fn remove(&mut self, cell: CellCoord) -> Option<GridEntry> {
        self.cells.remove(&cell)
    }

    pub fn query(&self, cell: CellCoord) -> Option<&GridEntry> {
        self.cells.get(&cell)
    }

    /// Occupants of the cube of cells within `radius` of `center` on each axis.
    pub fn neighbors(&self, center: CellCoord, radius: i32) -> impl Iterator<Item = &GridEntry> {
        (-radius..=radius).flat_map(move |dx| {
            (-radius..=radius).flat_map(move |dy| {
                (-radius..=radius).filter_map(move |dz| self.cells.get(&center.offset(dx, dy, dz)))
            })
        })
    }

    /// Occupants in the column of cells starting at `base` and extending
    /// `height` cells upward, `radius` cells wide in x and z.
    pub fn column_above(
        &self,
        base: CellCoord,
        radius: i32,
        height: i32,
    ) -> impl Iterator<Item = &GridEntry> {
        (-radius..=radius).flat_map(move |dx| {
            (0..=height).flat_map(move |dy| {
                (-radius..=radius).filter_map(move |dz| self.cells.get(&base.offset(dx, dy, dz)))
            })
        })
    }

    /// Whether `position` may take a new placement: its own cell is free and
    /// no occupant within `radius` cells lies closer than `min_spacing`.
    pub fn is_clear(&self, position: Vec3, min_spacing: f32, radius: i32) -> bool {
        let cell = self.position_to_cell(position);
        if self.cells.contains_key(&cell) {
            return false;
        }
        !self
            .neighbors(cell, radius)
            .any(|e| e.position.distance(position) < min_spacing)
    }

    /// Iterate over every occupied cell.
    pub fn iter(&self) -> impl Iterator<Item = (&CellCoord, &GridEntry)> {
        self.cells.iter()
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
