//! Row/column packing of up to nine items on a fixed canvas.
//!
//! Items fill the grid left to right, top to bottom. When the last row is not
//! full its items are centered horizontally. All arithmetic is integer so
//! placements land on pixel boundaries.

/// Largest number of items a grid can hold.
pub const MAX_ITEMS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("unsupported item count {0}, expected 1 to 9")]
    UnsupportedItemCount(usize),

    #[error("invalid canvas {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("item {index} is outside a grid of {item_count} items")]
    IndexOutOfRange { index: usize, item_count: usize },
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Returns `(rows, columns)` for a number of items.
///
/// This is a fixed table: 3 and 4 items both use 2x2, 5 and 6 both use 2x3.
pub fn rows_columns(item_count: usize) -> LayoutResult<(u32, u32)> {
    match item_count {
        1 => Ok((1, 1)),
        2 => Ok((1, 2)),
        3 | 4 => Ok((2, 2)),
        5 | 6 => Ok((2, 3)),
        7..=9 => Ok((3, 3)),
        _ => Err(LayoutError::UnsupportedItemCount(item_count)),
    }
}

/// Validated layout input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub item_count: usize,
    pub canvas_width: u32,
    pub canvas_height: u32,
    rows: u32,
    columns: u32,
}

/// Top-left corner of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub x: u32,
    pub y: u32,
}

impl GridSpec {
    pub fn new(item_count: usize, canvas_width: u32, canvas_height: u32) -> LayoutResult<Self> {
        let (rows, columns) = rows_columns(item_count)?;
        if canvas_width == 0 || canvas_height == 0 {
            return Err(LayoutError::InvalidCanvas {
                width: canvas_width,
                height: canvas_height,
            });
        }
        Ok(Self {
            item_count,
            canvas_width,
            canvas_height,
            rows,
            columns,
        })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// `(width, height)` of one cell, floored.
    pub fn cell_size(&self) -> (u32, u32) {
        (self.canvas_width / self.columns, self.canvas_height / self.rows)
    }

    /// Placement of the item at `index`.
    pub fn place(&self, index: usize) -> LayoutResult<Placement> {
        if index >= self.item_count {
            return Err(LayoutError::IndexOutOfRange {
                index,
                item_count: self.item_count,
            });
        }

        Ok(self.place_unchecked(index))
    }

    fn place_unchecked(&self, index: usize) -> Placement {
        let (cell_width, cell_height) = self.cell_size();
        let columns = self.columns as usize;
        let row = (index / columns) as u32;
        let column = (index % columns) as u32;

        let slots = (self.rows * self.columns) as usize;
        let x_offset = if row == self.rows - 1 && slots != self.item_count {
            (slots - self.item_count) as u32 * cell_width / 2
        } else {
            0
        };

        Placement {
            index,
            x: column * cell_width + x_offset,
            y: row * cell_height,
        }
    }

    /// Placements for every item, in index order.
    pub fn placements(&self) -> Vec<Placement> {
        (0..self.item_count)
            .map(|index| self.place_unchecked(index))
            .collect()
    }
}

/// Lays out `item_count` items on a `canvas_width` x `canvas_height` canvas.
pub fn layout(item_count: usize, canvas_width: u32, canvas_height: u32) -> LayoutResult<Vec<Placement>> {
    Ok(GridSpec::new(item_count, canvas_width, canvas_height)?.placements())
}
