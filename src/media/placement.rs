use super::{CellBox, FetchResult};
use serde::Serialize;

/// Pixel offsets from the top-left corner of the anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub x_offset: u32,
    pub y_offset: u32,
}

/// Centered offsets for an image inside `cell`, or `None` when there is no image.
pub fn center_in_cell(result: &FetchResult, cell: CellBox) -> Option<Placement> {
    result
        .image()
        .map(|image| centered_offsets(image.width, image.height, cell))
}

/// Integer centering, clamped at zero when the image overflows the cell.
pub fn centered_offsets(width: u32, height: u32, cell: CellBox) -> Placement {
    Placement {
        x_offset: cell.width.saturating_sub(width) / 2,
        y_offset: cell.height.saturating_sub(height) / 2,
    }
}
