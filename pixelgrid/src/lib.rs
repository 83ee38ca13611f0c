//! Turn an image into grid-based pixel art.
//!
//! The image is divided into `rows × columns` equally sized cells, each cell is painted with a single
//! representative color, and the set of cell colors can optionally be reduced to a smaller palette
//! using k-means clustering. Grid lines can be drawn between the cells.
//!
//! # Examples
//!
//! ## Pixelate an image file with the default options.
//!
//! ```no_run
//! let image = image::open("some image").unwrap().into_rgb8();
//! let result = pixelgrid::pixelate(&image, &pixelgrid::PixelateOptions::new(32, 24)).unwrap();
//! result.image.save("pixelated.png").unwrap();
//! ```
//!
//! ## Run each stage separately.
//!
//! ```no_run
//! let image = image::open("some image").unwrap().into_rgb8();
//! let cells = pixelgrid::sample(&image, 32, 24).unwrap();
//!
//! let params = pixelgrid::KmeansParams::default();
//! let color_map = pixelgrid::reduce(cells.colors(), 8, &params);
//!
//! let output = pixelgrid::compose(&cells, &color_map, None);
//! ```
//!
//! # Options
//!
//! Here are explanations of the fields of [`PixelateOptions`].
//!
//! ## Rows and Columns
//!
//! The number of cells along each axis. Both must be at least `1`,
//! and the image must have at least one pixel per cell in each dimension.
//! The image is resized so that its width and height are exact multiples of the cell size,
//! which may slightly distort the aspect ratio.
//!
//! ## Grid Color
//!
//! The color of the 1 pixel wide lines drawn between cells, or `None` for no grid.
//! Lines are drawn along the right and bottom edge of each cell,
//! except for the last column and the last row.
//!
//! ## Max Colors
//!
//! The maximum number of distinct colors in the final image. A value of `0` disables palette reduction.
//! If the cells already use at most this many colors, the cell colors are kept as they are.
//! k-means itself is capped at [`MAX_CENTROIDS`] centroids.
//!
//! ## k-means Parameters
//!
//! See [`KmeansParams`]. The defaults run 10 trials from a fixed seed,
//! so the same image and options always give the same palette.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]

use image::RgbImage;
use log::debug;
use palette::Srgb;
use std::collections::HashMap;

mod compose;
mod error;
mod grid;
mod kmeans;
mod reduce;

pub use compose::compose;
pub use error::Error;
pub use grid::{representative_color, resize_to_grid, sample, CellColors, GridGeometry, FALLBACK_COLOR, RESIZE_FILTER};
pub use kmeans::KmeansParams;
pub use reduce::{reduce, ColorMap, Reduction, MAX_CENTROIDS};

/// Packs a color into a single integer, used as the hash key for a color
fn pack(color: Srgb<u8>) -> u32 {
	color.into_u32::<palette::rgb::channels::Rgba>()
}

/// Deduplicated Srgb colors along with the number of times each color occurred
///
/// Colors are kept in the order they were first seen.
#[derive(Debug, Clone, Default)]
pub struct ColorCounts {
	/// Distinct colors in order of first occurrence
	colors: Vec<Srgb<u8>>,
	/// The number of occurrences of each color
	counts: Vec<u32>,
	/// Packed Srgb -> index into `colors`
	index: HashMap<u32, u32>,
}

impl ColorCounts {
	/// Create an empty `ColorCounts`
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Count one more occurrence of `color`
	pub fn add(&mut self, color: Srgb<u8>) {
		let Self { colors, counts, index } = self;
		let i = *index.entry(pack(color)).or_insert_with(|| {
			// colors.len() < u32::MAX because there are only (2^8)^3 < u32::MAX possible Srgb colors
			#[allow(clippy::cast_possible_truncation)]
			let i = colors.len() as u32;

			colors.push(color);
			counts.push(0);
			i
		});

		counts[i as usize] += 1;
	}

	/// The distinct colors, in order of first occurrence
	#[must_use]
	pub fn colors(&self) -> &[Srgb<u8>] {
		&self.colors
	}

	/// The number of occurrences for each color in [`ColorCounts::colors`]
	#[must_use]
	pub fn counts(&self) -> &[u32] {
		&self.counts
	}

	/// The position of `color` in [`ColorCounts::colors`], if it was added
	#[must_use]
	pub fn index_of(&self, color: Srgb<u8>) -> Option<usize> {
		self.index.get(&pack(color)).map(|&i| i as usize)
	}

	/// The number of distinct colors
	#[must_use]
	pub fn num_colors(&self) -> usize {
		self.colors.len()
	}

	/// The total number of colors added, including duplicates
	#[must_use]
	pub fn total(&self) -> u64 {
		self.counts.iter().copied().map(u64::from).sum()
	}

	/// Iterate over each distinct color and its count
	pub fn pairs(&self) -> impl Iterator<Item = (Srgb<u8>, u32)> + '_ {
		self.colors.iter().copied().zip(self.counts.iter().copied())
	}

	/// Returns the color with the highest count.
	///
	/// If multiple colors share the highest count, the one that was added first is returned.
	#[must_use]
	pub fn most_frequent(&self) -> Option<Srgb<u8>> {
		let mut best: Option<(Srgb<u8>, u32)> = None;
		for (color, count) in self.pairs() {
			if best.map_or(true, |(_, max)| count > max) {
				best = Some((color, count));
			}
		}
		best.map(|(color, _)| color)
	}
}

impl FromIterator<Srgb<u8>> for ColorCounts {
	fn from_iter<I: IntoIterator<Item = Srgb<u8>>>(iter: I) -> Self {
		let mut counts = Self::new();
		for color in iter {
			counts.add(color);
		}
		counts
	}
}

/// Options for [`pixelate`]
///
/// See the crate documentation for information on each field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelateOptions {
	/// Number of cell rows, must be at least `1`
	pub rows: u32,
	/// Number of cell columns, must be at least `1`
	pub columns: u32,
	/// Color of the lines between cells, or `None` to not draw a grid (default: `None`)
	pub grid_color: Option<Srgb<u8>>,
	/// Maximum number of colors in the output, `0` disables palette reduction (default: `10`)
	pub max_colors: u32,
	/// Parameters for the k-means clustering used in palette reduction
	pub kmeans: KmeansParams,
}

impl PixelateOptions {
	/// The default maximum number of colors
	pub const DEFAULT_MAX_COLORS: u32 = 10;

	/// The default grid color, a light gray
	pub const DEFAULT_GRID_COLOR: Srgb<u8> = Srgb::new(192, 192, 192);

	/// Create options for a `rows × columns` grid with no grid lines
	/// and at most [`PixelateOptions::DEFAULT_MAX_COLORS`] colors
	#[must_use]
	pub fn new(rows: u32, columns: u32) -> Self {
		Self {
			rows,
			columns,
			grid_color: None,
			max_colors: Self::DEFAULT_MAX_COLORS,
			kmeans: KmeansParams::default(),
		}
	}
}

/// Summary of the k-means run used to reduce the palette
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionStats {
	/// The requested maximum number of colors
	pub max_colors: u32,
	/// Number of colors in the reduced palette
	pub palette_size: usize,
	/// Number of iterations of the best k-means trial
	pub iterations: u32,
	/// Variance of the best k-means trial, in normalized RGB
	pub variance: f64,
}

/// What happened while pixelating an image
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
	/// Dimensions of the source image
	pub source_dimensions: (u32, u32),
	/// The grid used, including the size of each cell
	pub geometry: GridGeometry,
	/// Number of distinct colors among the sampled cells
	pub unique_colors: usize,
	/// The colors in the output image, most used first
	pub palette: Vec<Srgb<u8>>,
	/// The number of cells painted with each color in `palette`
	pub counts: Vec<u32>,
	/// Information about the palette reduction, or `None` if no reduction was performed
	pub reduction: Option<ReductionStats>,
}

/// An output image along with a [`Report`] of how it was made
#[derive(Debug, Clone)]
pub struct Pixelated {
	/// The pixelated image, with dimensions equal to the resized source image
	pub image: RgbImage,
	/// Details about each step
	pub report: Report,
}

/// Pixelate `image` using the provided options.
///
/// # Errors
///
/// Returns an error if the grid is empty or has more rows or columns than the image has pixels.
pub fn pixelate(image: &RgbImage, options: &PixelateOptions) -> Result<Pixelated, Error> {
	let cells = sample(image, options.rows, options.columns)?;
	let color_map = reduce(cells.colors(), options.max_colors, &options.kmeans);
	let output = compose(&cells, &color_map, options.grid_color);

	let report = build_report(image, &cells, &color_map, options.max_colors);
	debug!(
		"Pixelated {}x{} image into {}x{} cells using {} colors",
		report.source_dimensions.0,
		report.source_dimensions.1,
		report.geometry.rows,
		report.geometry.columns,
		report.palette.len()
	);

	Ok(Pixelated { image: output, report })
}

/// Gather the [`Report`] for a finished run
fn build_report(image: &RgbImage, cells: &CellColors, color_map: &ColorMap, max_colors: u32) -> Report {
	let unique = cells.colors().iter().copied().collect::<ColorCounts>();
	let resolved = cells
		.colors()
		.iter()
		.map(|&color| color_map.resolve(color))
		.collect::<ColorCounts>();

	let mut pairs = resolved.pairs().collect::<Vec<_>>();
	pairs.sort_by_key(|&(_, n)| std::cmp::Reverse(n));
	let (palette, counts) = pairs.into_iter().unzip();

	let reduction = color_map.reduction().map(|reduction| ReductionStats {
		max_colors,
		palette_size: reduction.palette().len(),
		iterations: reduction.iterations(),
		variance: reduction.variance(),
	});

	Report {
		source_dimensions: image.dimensions(),
		geometry: cells.geometry(),
		unique_colors: unique.num_colors(),
		palette,
		counts,
		reduction,
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use image::Rgb;
	use rand::{Rng, SeedableRng};

	#[test]
	fn color_counts_merges_duplicates() {
		let red = Srgb::new(255, 0, 0);
		let blue = Srgb::new(0, 0, 255);
		let counts = [red, blue, red, red].into_iter().collect::<ColorCounts>();

		assert_eq!(counts.colors(), &[red, blue]);
		assert_eq!(counts.counts(), &[3, 1]);
		assert_eq!(counts.total(), 4);
	}

	#[test]
	fn most_frequent_prefers_first_seen_on_ties() {
		let a = Srgb::new(10, 20, 30);
		let b = Srgb::new(40, 50, 60);

		let ab = [a, b, b, a].into_iter().collect::<ColorCounts>();
		assert_eq!(ab.most_frequent(), Some(a));

		let ba = [b, a, a, b].into_iter().collect::<ColorCounts>();
		assert_eq!(ba.most_frequent(), Some(b));

		assert_eq!(ColorCounts::new().most_frequent(), None);
	}

	#[test]
	fn uniform_red_image_without_grid_or_reduction() {
		let red = Rgb([255, 0, 0]);
		let image = RgbImage::from_pixel(4, 4, red);

		let mut options = PixelateOptions::new(2, 2);
		options.max_colors = 0;

		let result = pixelate(&image, &options).unwrap();

		assert_eq!(result.image.dimensions(), (4, 4));
		assert!(result.image.pixels().all(|&pixel| pixel == red));
		assert_eq!(result.report.geometry.block_width, 2);
		assert_eq!(result.report.geometry.block_height, 2);
		assert_eq!(result.report.palette, vec![Srgb::new(255, 0, 0)]);
		assert_eq!(result.report.counts, vec![4]);
		assert_eq!(result.report.reduction, None);
	}

	/// An image where each 1x1 cell has its own color
	fn distinct_cell_image(width: u32, height: u32, seed: u64) -> RgbImage {
		let mut rng = rand_xoshiro::Xoroshiro128PlusPlus::seed_from_u64(seed);
		let mut seen = ColorCounts::new();
		let mut image = RgbImage::new(width, height);
		for pixel in image.pixels_mut() {
			loop {
				let color = Srgb::new(rng.gen(), rng.gen(), rng.gen());
				if !seen.index.contains_key(&pack(color)) {
					seen.add(color);
					*pixel = Rgb([color.red, color.green, color.blue]);
					break;
				}
			}
		}
		image
	}

	#[test]
	fn few_colors_are_preserved() {
		let image = distinct_cell_image(5, 1, 0);
		let result = pixelate(&image, &PixelateOptions::new(1, 5)).unwrap();

		assert_eq!(result.image, image);
		assert_eq!(result.report.unique_colors, 5);
		assert_eq!(result.report.reduction, None);
	}

	#[test]
	fn max_colors_above_distinct_colors_keeps_image() {
		let image = distinct_cell_image(5, 1, 3);
		let mut options = PixelateOptions::new(1, 5);
		options.max_colors = 300;

		let result = pixelate(&image, &options).unwrap();

		assert_eq!(result.image, image);
		assert_eq!(result.report.reduction, None);
	}

	#[test]
	fn index_of_follows_first_occurrence() {
		let red = Srgb::new(255, 0, 0);
		let blue = Srgb::new(0, 0, 255);
		let counts = [blue, red, blue].into_iter().collect::<ColorCounts>();

		assert_eq!(counts.index_of(blue), Some(0));
		assert_eq!(counts.index_of(red), Some(1));
		assert_eq!(counts.index_of(Srgb::new(0, 255, 0)), None);
	}

	#[test]
	fn many_colors_are_reduced() {
		let image = distinct_cell_image(8, 8, 1);
		let mut options = PixelateOptions::new(8, 8);
		options.max_colors = 4;

		let result = pixelate(&image, &options).unwrap();

		let output = result.image.pixels().map(|p| Srgb::new(p[0], p[1], p[2])).collect::<ColorCounts>();
		assert!(output.num_colors() <= 4);
		assert_eq!(result.report.unique_colors, 64);
		assert_eq!(result.report.palette.len(), output.num_colors());
		assert_eq!(result.report.counts.iter().sum::<u32>(), 64);

		let stats = result.report.reduction.unwrap();
		assert_eq!(stats.max_colors, 4);
		assert!(stats.palette_size <= 4);
		assert!(stats.iterations > 0);
	}

	#[test]
	fn grid_is_drawn_over_reduced_colors() {
		let image = distinct_cell_image(6, 6, 2);
		let gray = PixelateOptions::DEFAULT_GRID_COLOR;
		let mut options = PixelateOptions::new(3, 3);
		options.max_colors = 2;
		options.grid_color = Some(gray);

		let result = pixelate(&image, &options).unwrap();
		let gray = Rgb([gray.red, gray.green, gray.blue]);

		// right edge of the first column and bottom edge of the first row
		for i in 0..6 {
			assert_eq!(*result.image.get_pixel(1, i), gray);
			assert_eq!(*result.image.get_pixel(i, 1), gray);
		}
		// the last column and row have no grid line
		assert_eq!(result.image.get_pixel(5, 4), result.image.get_pixel(4, 4));
		assert_eq!(result.image.get_pixel(4, 5), result.image.get_pixel(4, 4));
	}

	#[test]
	fn empty_grid_is_rejected() {
		let image = RgbImage::new(4, 4);
		assert_eq!(
			pixelate(&image, &PixelateOptions::new(0, 2)).unwrap_err(),
			Error::EmptyGrid { rows: 0, columns: 2 }
		);
	}

	#[test]
	fn grid_finer_than_image_is_rejected() {
		let image = RgbImage::new(4, 3);
		assert_eq!(
			pixelate(&image, &PixelateOptions::new(4, 4)).unwrap_err(),
			Error::GridTooFine { width: 4, height: 3, rows: 4, columns: 4 }
		);
	}
}
