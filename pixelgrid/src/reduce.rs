//! Reduces the cell colors to a bounded palette using k-means

use crate::{kmeans, ColorCounts, KmeansParams};
use log::debug;
use palette::Srgb;

/// The largest number of centroids k-means is run with
pub const MAX_CENTROIDS: u16 = u16::MAX;

/// Maps each sampled color to its final color
#[derive(Debug, Clone)]
pub enum ColorMap {
	/// No reduction was performed, so every color maps to itself
	Identity,
	/// The colors were clustered into a smaller palette
	Reduced(Reduction),
}

impl ColorMap {
	/// Returns the final color for `color`.
	///
	/// For a reduced map, colors that were not part of the reduction are mapped to their nearest palette color.
	#[must_use]
	pub fn resolve(&self, color: Srgb<u8>) -> Srgb<u8> {
		match self {
			ColorMap::Identity => color,
			ColorMap::Reduced(reduction) => reduction.resolve(color),
		}
	}

	/// Whether this map leaves every color as it is
	#[must_use]
	pub const fn is_identity(&self) -> bool {
		matches!(self, ColorMap::Identity)
	}

	/// The reduction, if one was performed
	#[must_use]
	pub const fn reduction(&self) -> Option<&Reduction> {
		match self {
			ColorMap::Identity => None,
			ColorMap::Reduced(reduction) => Some(reduction),
		}
	}
}

/// A reduced palette and the assignment of each original color to one of its entries
#[derive(Debug, Clone)]
pub struct Reduction {
	/// The distinct palette colors, in centroid order
	palette: Vec<Srgb<u8>>,
	/// The distinct original colors, in order of first occurrence
	originals: ColorCounts,
	/// Index into `palette` for each color in `originals`
	assignment: Vec<u16>,
	/// Number of iterations of the best k-means trial
	iterations: u32,
	/// Variance of the best k-means trial
	variance: f64,
}

impl Reduction {
	/// The reduced palette
	#[must_use]
	pub fn palette(&self) -> &[Srgb<u8>] {
		&self.palette
	}

	/// Number of iterations of the best k-means trial
	#[must_use]
	pub const fn iterations(&self) -> u32 {
		self.iterations
	}

	/// Variance of the best k-means trial, in normalized RGB
	#[must_use]
	pub const fn variance(&self) -> f64 {
		self.variance
	}

	/// Iterate over each original color and the palette color it maps to,
	/// in the order the original colors first occurred
	pub fn pairs(&self) -> impl Iterator<Item = (Srgb<u8>, Srgb<u8>)> + '_ {
		self.originals
			.colors()
			.iter()
			.zip(&self.assignment)
			.map(|(&color, &i)| (color, self.palette[usize::from(i)]))
	}

	/// The palette color for `color`
	#[must_use]
	pub fn resolve(&self, color: Srgb<u8>) -> Srgb<u8> {
		let i = self
			.originals
			.index_of(color)
			.map_or_else(|| nearest(color, &self.palette), |j| self.assignment[j]);

		self.palette[usize::from(i)]
	}
}

/// Squared euclidean distance between two colors in `0..=255` RGB
fn squared_distance(x: Srgb<u8>, y: Srgb<u8>) -> u32 {
	let d = |a: u8, b: u8| u32::from(a.abs_diff(b)).pow(2);
	d(x.red, y.red) + d(x.green, y.green) + d(x.blue, y.blue)
}

/// Index of the palette color closest to `color`, preferring earlier palette colors on ties
///
/// `palette` must not be empty and has at most `u16::MAX` colors.
#[allow(clippy::cast_possible_truncation)]
fn nearest(color: Srgb<u8>, palette: &[Srgb<u8>]) -> u16 {
	let mut min_dist = u32::MAX;
	let mut min_index = 0;
	for (i, &entry) in palette.iter().enumerate() {
		let dist = squared_distance(color, entry);
		if dist < min_dist {
			min_dist = dist;
			min_index = i;
		}
	}
	min_index as u16
}

/// Convert a normalized centroid to an 8-bit color, truncating each channel
fn to_srgb8(centroid: Srgb<f32>) -> Srgb<u8> {
	// channels are in 0.0..=1.0, and `as` saturates otherwise
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let channel = |c: f32| (c * 255.0) as u8;
	Srgb::new(channel(centroid.red), channel(centroid.green), channel(centroid.blue))
}

/// Reduce `colors` to at most `max_colors` distinct colors.
///
/// The distinct colors are clustered with k-means, and each distinct color is then mapped
/// to the palette color with the smallest squared euclidean distance.
/// If multiple palette colors are equally close, the one that comes first in the palette is used.
///
/// [`ColorMap::Identity`] is returned if `max_colors` is `0`, if there are already at most `max_colors`
/// distinct colors, or if k-means produced no centroids (e.g., `params.trials` is `0`).
///
/// k-means is run with at most [`MAX_CENTROIDS`] centroids, so a larger `max_colors`
/// only matters for deciding whether any reduction is needed.
#[must_use]
pub fn reduce(colors: &[Srgb<u8>], max_colors: u32, params: &KmeansParams) -> ColorMap {
	if max_colors == 0 {
		debug!("Palette reduction is disabled");
		return ColorMap::Identity;
	}

	let unique = colors.iter().copied().collect::<ColorCounts>();
	if unique.num_colors() as u64 <= u64::from(max_colors) {
		debug!(
			"Skipping palette reduction since there are only {} distinct colors (max {max_colors})",
			unique.num_colors()
		);
		return ColorMap::Identity;
	}

	let points = unique
		.colors()
		.iter()
		.map(|color| color.into_format::<f32>())
		.collect::<Vec<_>>();

	let k = u16::try_from(max_colors).unwrap_or(MAX_CENTROIDS);
	if u32::from(k) < max_colors {
		debug!("Clamping k-means to {k} centroids (max colors {max_colors})");
	}

	let result = kmeans::run(&points, k, params);
	debug!(
		"k-means reduced {} colors to {} centroids in {} iterations with a variance of {}",
		unique.num_colors(),
		result.centroids.len(),
		result.iterations,
		result.variance
	);

	let mut palette = Vec::with_capacity(result.centroids.len());
	for color in result.centroids.into_iter().map(to_srgb8) {
		if !palette.contains(&color) {
			palette.push(color);
		}
	}

	if palette.is_empty() {
		return ColorMap::Identity;
	}

	let assignment = unique.colors().iter().map(|&color| nearest(color, &palette)).collect();

	ColorMap::Reduced(Reduction {
		palette,
		originals: unique,
		assignment,
		iterations: result.iterations,
		variance: result.variance,
	})
}
