//! Errors reported before any pixel work begins

use thiserror::Error;

/// Configuration errors for a pixelation grid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// The grid has zero rows or zero columns
	#[error("the grid must have at least one row and one column, got {rows}x{columns}")]
	EmptyGrid {
		/// Requested number of rows
		rows: u32,
		/// Requested number of columns
		columns: u32,
	},

	/// The grid is finer than the image, so a cell would be less than one pixel wide or tall
	#[error(
		"a {rows}x{columns} grid is finer than the {width}x{height} image \
		 (each cell needs at least one pixel in both dimensions)"
	)]
	GridTooFine {
		/// Source image width
		width: u32,
		/// Source image height
		height: u32,
		/// Requested number of rows
		rows: u32,
		/// Requested number of columns
		columns: u32,
	},
}
