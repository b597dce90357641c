//! # Tile Module
//!
//! Bounds-checked extraction of square tiles from a [`PixelArray`].
//!
//! ## Addressing
//! - **Pixel origin** - [`extract`] takes an explicit `(x, y)` origin and
//!   rejects any tile that would leave the image.
//! - **Grid cell** - [`extract_at`] addresses a `(row, col)` cell of a
//!   `tile_size` grid. The last row and column are clamped inward, so edge
//!   tiles are always full size and may overlap their neighbour.

use crate::core::pixels::PixelArray;
use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// Pixel origin of a tile (column `x`, row `y`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileOrigin {
    pub x: usize,
    pub y: usize,
}

impl TileOrigin {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Cell of a tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub row: usize,
    pub col: usize,
}

impl TileCoordinate {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Map a row-major grid index back to its cell
    pub fn from_index(index: usize, grid_width: usize) -> Self {
        Self {
            row: index / grid_width,
            col: index % grid_width,
        }
    }
}

/// Conceptual grid of `tile_size` cells over an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub rows: usize,
    pub cols: usize,
    pub tile_size: usize,
}

impl TileGrid {
    /// Grid of whole cells covering `image`
    pub fn for_image(image: &PixelArray, tile_size: usize) -> Result<Self, ExtractError> {
        if tile_size == 0 {
            return Err(ExtractError::InvalidTileSize);
        }
        Ok(Self {
            rows: image.height() / tile_size,
            cols: image.width() / tile_size,
            tile_size,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// All cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| TileCoordinate { row, col }))
    }
}

/// Extract a `size x size` tile whose top-left corner is `origin`
pub fn extract(image: &PixelArray, origin: TileOrigin, size: usize) -> Result<PixelArray, ExtractError> {
    if size == 0 {
        return Err(ExtractError::InvalidTileSize);
    }

    let fits_x = origin.x.checked_add(size).is_some_and(|end| end <= image.width());
    let fits_y = origin.y.checked_add(size).is_some_and(|end| end <= image.height());

    if !fits_x || !fits_y {
        return Err(ExtractError::OutOfBounds {
            x: origin.x,
            y: origin.y,
            size,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(image.region(origin.x, origin.y, size, size))
}

/// Origin used for grid cell `(row, col)`, clamped so the tile stays inside
pub fn grid_origin(
    image: &PixelArray,
    cell: TileCoordinate,
    tile_size: usize,
) -> Result<TileOrigin, ExtractError> {
    if tile_size == 0 {
        return Err(ExtractError::InvalidTileSize);
    }
    if tile_size > image.width() || tile_size > image.height() {
        return Err(ExtractError::OutOfBounds {
            x: cell.col.saturating_mul(tile_size),
            y: cell.row.saturating_mul(tile_size),
            size: tile_size,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(TileOrigin {
        x: cell.col.saturating_mul(tile_size).min(image.width() - tile_size),
        y: cell.row.saturating_mul(tile_size).min(image.height() - tile_size),
    })
}

/// Extract the tile for grid cell `(row, col)`
pub fn extract_at(
    image: &PixelArray,
    row: usize,
    col: usize,
    tile_size: usize,
) -> Result<PixelArray, ExtractError> {
    let origin = grid_origin(image, TileCoordinate::new(row, col), tile_size)?;
    extract(image, origin, tile_size)
}

/// Quarter, center and three-quarter origins used for spot-check validation
pub fn spot_check_origins(width: usize, height: usize) -> [TileOrigin; 3] {
    [
        TileOrigin::new(width / 4, height / 4),
        TileOrigin::new(width / 2, height / 2),
        TileOrigin::new(3 * width / 4, 3 * height / 4),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixels::ChannelLayout;

    fn ramp(height: usize, width: usize) -> PixelArray {
        PixelArray::gray_from_fn(height, width, |y, x| ((y * 7 + x * 3) % 251) as u8)
    }

    #[test]
    fn grid_cell_zero_equals_direct_slice() {
        let image = ramp(1024, 1024);
        let tile = extract_at(&image, 0, 0, 512).unwrap();

        assert_eq!((tile.height(), tile.width()), (512, 512));
        for y in [0, 100, 511] {
            for x in [0, 255, 511] {
                assert_eq!(tile.sample(y, x, 0), image.sample(y, x, 0));
            }
        }
    }

    #[test]
    fn every_grid_cell_yields_full_tile() {
        let image = ramp(100, 70);
        let tile_size = 32;

        for row in 0..4 {
            for col in 0..3 {
                let tile = extract_at(&image, row, col, tile_size).unwrap();
                assert_eq!((tile.height(), tile.width()), (tile_size, tile_size));
            }
        }
    }

    #[test]
    fn edge_cell_is_clamped_inward() {
        let image = ramp(100, 70);
        let origin = grid_origin(&image, TileCoordinate::new(3, 2), 32).unwrap();

        assert_eq!(origin, TileOrigin::new(70 - 32, 100 - 32));

        let tile = extract_at(&image, 3, 2, 32).unwrap();
        assert_eq!(tile.sample(0, 0, 0), image.sample(68, 38, 0));
    }

    #[test]
    fn extract_preserves_channels() {
        let image = PixelArray::rgb_from_fn(64, 64, |y, x| [y as u8, x as u8, 1]);
        let tile = extract(&image, TileOrigin::new(10, 20), 16).unwrap();

        assert_eq!(tile.layout(), ChannelLayout::MultiChannel(3));
        assert_eq!(tile.sample(0, 0, 0), 20);
        assert_eq!(tile.sample(0, 0, 1), 10);
    }

    #[test]
    fn extract_rejects_out_of_bounds() {
        let image = ramp(64, 64);

        let result = extract(&image, TileOrigin::new(40, 0), 32);
        assert!(matches!(result, Err(ExtractError::OutOfBounds { x: 40, .. })));

        let result = extract(&image, TileOrigin::new(0, 33), 32);
        assert!(matches!(result, Err(ExtractError::OutOfBounds { y: 33, .. })));
    }

    #[test]
    fn extract_accepts_tile_touching_the_edge() {
        let image = ramp(64, 64);
        assert!(extract(&image, TileOrigin::new(32, 32), 32).is_ok());
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let image = ramp(8, 8);
        assert_eq!(
            extract(&image, TileOrigin::new(0, 0), 0),
            Err(ExtractError::InvalidTileSize)
        );
    }

    #[test]
    fn tile_larger_than_image_is_out_of_bounds() {
        let image = ramp(16, 64);
        assert!(matches!(
            extract_at(&image, 0, 0, 32),
            Err(ExtractError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn grid_counts_whole_cells() {
        let image = ramp(100, 70);
        let grid = TileGrid::for_image(&image, 32).unwrap();

        assert_eq!((grid.rows, grid.cols), (3, 2));
        assert_eq!(grid.cells().count(), grid.cell_count());
    }

    #[test]
    fn index_maps_to_row_major_cell() {
        assert_eq!(TileCoordinate::from_index(7, 3), TileCoordinate::new(2, 1));
        assert_eq!(TileCoordinate::from_index(0, 3), TileCoordinate::new(0, 0));
    }

    #[test]
    fn spot_check_origins_follow_quarters() {
        let origins = spot_check_origins(2000, 1000);
        assert_eq!(origins[0], TileOrigin::new(500, 250));
        assert_eq!(origins[1], TileOrigin::new(1000, 500));
        assert_eq!(origins[2], TileOrigin::new(1500, 750));
    }
}
