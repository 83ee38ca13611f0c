//! Divides an image into a grid of cells and picks a representative color for each cell

use crate::{ColorCounts, Error};
use image::{
	imageops::{self, FilterType},
	RgbImage,
};
use log::{debug, trace};
use palette::Srgb;
use std::borrow::Cow;

/// The color used for a cell without any pixels
pub const FALLBACK_COLOR: Srgb<u8> = Srgb::new(128, 128, 128);

/// The filter used to resize an image to fit the grid exactly
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// The layout of the cells over the resized image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
	/// Number of cell rows
	pub rows: u32,
	/// Number of cell columns
	pub columns: u32,
	/// Width of each cell in pixels
	pub block_width: u32,
	/// Height of each cell in pixels
	pub block_height: u32,
}

impl GridGeometry {
	/// Compute the largest cell size such that `rows × columns` cells fit into a `width × height` image.
	///
	/// # Errors
	///
	/// Returns an error if `rows` or `columns` is zero, or if either cell dimension would be zero.
	pub fn fit(width: u32, height: u32, rows: u32, columns: u32) -> Result<Self, Error> {
		if rows == 0 || columns == 0 {
			return Err(Error::EmptyGrid { rows, columns });
		}

		let block_width = width / columns;
		let block_height = height / rows;
		if block_width == 0 || block_height == 0 {
			return Err(Error::GridTooFine { width, height, rows, columns });
		}

		Ok(Self { rows, columns, block_width, block_height })
	}

	/// Width of the resized image
	#[must_use]
	pub const fn width(&self) -> u32 {
		self.block_width * self.columns
	}

	/// Height of the resized image
	#[must_use]
	pub const fn height(&self) -> u32 {
		self.block_height * self.rows
	}

	/// Total number of cells
	#[must_use]
	pub const fn num_cells(&self) -> usize {
		self.rows as usize * self.columns as usize
	}

	/// Pixel coordinates of the top left corner of a cell
	#[must_use]
	pub const fn cell_origin(&self, row: u32, column: u32) -> (u32, u32) {
		(column * self.block_width, row * self.block_height)
	}
}

/// The representative color of each cell in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct CellColors {
	/// Cell layout
	geometry: GridGeometry,
	/// One color per cell, row by row
	colors: Vec<Srgb<u8>>,
}

impl CellColors {
	/// The cell layout
	#[must_use]
	pub const fn geometry(&self) -> GridGeometry {
		self.geometry
	}

	/// Width of each cell in pixels
	#[must_use]
	pub const fn block_width(&self) -> u32 {
		self.geometry.block_width
	}

	/// Height of each cell in pixels
	#[must_use]
	pub const fn block_height(&self) -> u32 {
		self.geometry.block_height
	}

	/// All cell colors in row-major order
	#[must_use]
	pub fn colors(&self) -> &[Srgb<u8>] {
		&self.colors
	}

	/// The color of a single cell
	///
	/// # Panics
	///
	/// Panics if the row or column is out of bounds.
	#[must_use]
	pub fn get(&self, row: u32, column: u32) -> Srgb<u8> {
		assert!(row < self.geometry.rows && column < self.geometry.columns);
		self.colors[row as usize * self.geometry.columns as usize + column as usize]
	}

	/// Iterate over `((row, column), color)` for each cell in row-major order
	pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), Srgb<u8>)> + '_ {
		let columns = self.geometry.columns;
		(0..self.geometry.rows)
			.flat_map(move |row| (0..columns).map(move |column| (row, column)))
			.zip(self.colors.iter().copied())
	}
}

/// Resize an image so that its dimensions are exact multiples of the cell size.
///
/// The image is borrowed as is if it already has the right dimensions.
#[must_use]
pub fn resize_to_grid(image: &RgbImage, geometry: GridGeometry) -> Cow<'_, RgbImage> {
	let (width, height) = (geometry.width(), geometry.height());
	if image.dimensions() == (width, height) {
		Cow::Borrowed(image)
	} else {
		debug!(
			"Resizing {}x{} image to {width}x{height} to fit the grid",
			image.width(),
			image.height()
		);
		Cow::Owned(imageops::resize(image, width, height, RESIZE_FILTER))
	}
}

/// Divide `image` into `rows × columns` cells and pick a representative color for each cell.
///
/// See [`representative_color`] for how the color of a cell is chosen.
///
/// # Errors
///
/// Returns an error if the grid is empty or finer than the image.
pub fn sample(image: &RgbImage, rows: u32, columns: u32) -> Result<CellColors, Error> {
	let geometry = GridGeometry::fit(image.width(), image.height(), rows, columns)?;
	let resized = resize_to_grid(image, geometry);
	let colors = sample_cells(&resized, geometry);
	debug_assert_eq!(colors.len(), geometry.num_cells());
	Ok(CellColors { geometry, colors })
}

/// Pick the representative color of every cell, sequentially
#[cfg(not(feature = "threads"))]
fn sample_cells(image: &RgbImage, geometry: GridGeometry) -> Vec<Srgb<u8>> {
	let buffer: &[u8] = image.as_raw();
	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(buffer);
	(0..geometry.rows)
		.flat_map(|row| (0..geometry.columns).map(move |column| (row, column)))
		.map(|(row, column)| cell_color(pixels, geometry, row, column))
		.collect()
}

/// Pick the representative color of every cell, with each row of cells processed in parallel
#[cfg(feature = "threads")]
fn sample_cells(image: &RgbImage, geometry: GridGeometry) -> Vec<Srgb<u8>> {
	use rayon::prelude::*;

	let buffer: &[u8] = image.as_raw();
	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(buffer);
	(0..geometry.rows)
		.into_par_iter()
		.flat_map_iter(|row| (0..geometry.columns).map(move |column| cell_color(pixels, geometry, row, column)))
		.collect()
}

/// The representative color of a single cell
fn cell_color(pixels: &[Srgb<u8>], geometry: GridGeometry, row: u32, column: u32) -> Srgb<u8> {
	let (left, top) = geometry.cell_origin(row, column);
	let (left, top) = (left as usize, top as usize);
	let block_width = geometry.block_width as usize;
	let block_height = geometry.block_height as usize;
	let stride = geometry.width() as usize;

	let color = representative_color(
		(top..top + block_height)
			.flat_map(|y| &pixels[(y * stride + left)..(y * stride + left + block_width)])
			.copied(),
	);

	trace!("Cell ({row}, {column}) has color #{color:X}");
	color
}

/// Choose a single color to stand in for the given pixels.
///
/// - If the number of distinct colors is at most half the number of pixels,
///   the most frequent color is chosen. Ties go to the color that appears first.
/// - Otherwise, the pixels are too varied for any one color to be representative,
///   so the per-channel mean is used instead, truncated to an integer.
/// - If there are no pixels, [`FALLBACK_COLOR`] is returned.
pub fn representative_color(pixels: impl IntoIterator<Item = Srgb<u8>>) -> Srgb<u8> {
	let mut histogram = ColorCounts::new();
	let mut sum = [0u64; 3];
	for color in pixels {
		histogram.add(color);
		sum[0] += u64::from(color.red);
		sum[1] += u64::from(color.green);
		sum[2] += u64::from(color.blue);
	}

	let n = histogram.total();
	if n == 0 {
		debug!("Cell has no pixels, falling back to #{FALLBACK_COLOR:X}");
		return FALLBACK_COLOR;
	}

	if histogram.num_colors() as u64 <= n / 2 {
		histogram.most_frequent().unwrap_or(FALLBACK_COLOR)
	} else {
		// the mean of u8 values fits in a u8
		#[allow(clippy::cast_possible_truncation)]
		let [red, green, blue] = sum.map(|s| (s / n) as u8);
		Srgb::new(red, green, blue)
	}
}
