//! Specifies the CLI and handles arg parsing

use clap::{Parser, ValueEnum};
use palette::Srgb;
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// Supported formats for printing the final palette
#[derive(Copy, Clone, ValueEnum)]
pub enum FormatOutput {
	/// sRGB hexcode
	Hex,
	/// sRGB (r,g,b) triple
	Rgb,
	/// Whitespace with true color background
	Swatch,
}

/// Turn an image into grid-based pixel art.
///
/// The image is divided into a grid of cells, each painted with a single color.
/// The colors can be reduced to a smaller palette using k-means clustering,
/// and lines can be drawn between the cells.
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// The path to the input image
	pub image: PathBuf,

	/// The number of rows of cells
	#[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
	pub rows: u32,

	/// The number of columns of cells
	#[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
	pub columns: u32,

	/// The path to save the pixelated image to
	///
	/// The image format is chosen based off the file extension.
	/// Missing parent directories are created.
	#[arg(short, long, default_value = "image_pixelated.png")]
	pub output: PathBuf,

	/// The color of the lines drawn between cells
	///
	/// Accepts a color name (e.g., "black", "lightgray"), an RGB triple like "(255,0,0)" or "255,0,0",
	/// or a hexcode like "#ff0000".
	#[arg(short, long, default_value = "(192,192,192)", value_parser = parse_color)]
	pub grid_color: Srgb<u8>,

	/// Do not draw lines between cells
	#[arg(long, conflicts_with = "grid_color")]
	pub no_grid: bool,

	/// The maximum number of colors in the output image
	///
	/// If the cells use more distinct colors than this, they are reduced to this many colors using k-means.
	/// A value of 0 (or any negative value) disables color reduction.
	#[arg(short = 'k', long, default_value_t = 10, value_parser = parse_max_colors, allow_negative_numbers = true)]
	pub max_colors: u32,

	/// The number of trials of k-means to run
	///
	/// k-means can get stuck in a local minimum, so several trials are run and the one with the lowest variance is picked.
	#[arg(short = 'n', long, default_value_t = 10)]
	pub trials: u32,

	/// The maximum number of iterations for each k-means trial
	#[arg(short = 'i', long, default_value_t = 300)]
	pub max_iter: u32,

	/// The threshold number used to determine k-means convergence
	///
	/// A trial stops once the total movement of the centroids in one iteration falls to or below this value,
	/// where each color channel is in the range [0.0, 1.0].
	#[arg(short = 'e', long, default_value_t = 1e-4, value_parser = parse_valid_convergence)]
	pub convergence_threshold: f32,

	/// The seed value used for the random number generator
	#[arg(long, default_value_t = 0)]
	pub seed: u64,

	/// The number of threads to use
	///
	/// A value of 0 indicates to automatically choose the number of threads.
	#[cfg(feature = "threads")]
	#[arg(short, long, default_value_t = 0)]
	pub threads: u8,

	/// Print the colors of the output image in the given format, most used first
	#[arg(short, long)]
	pub print_palette: Option<FormatOutput>,

	/// Print additional information, such as the cell size and the number of k-means iterations
	#[arg(long)]
	pub verbose: bool,
}

impl Options {
	/// The color for the grid lines, if any
	pub fn grid(&self) -> Option<Srgb<u8>> {
		if self.no_grid {
			None
		} else {
			Some(self.grid_color)
		}
	}

	/// The library options corresponding to these CLI options
	pub fn pixelate_options(&self) -> pixelgrid::PixelateOptions {
		pixelgrid::PixelateOptions {
			rows: self.rows,
			columns: self.columns,
			grid_color: self.grid(),
			max_colors: self.max_colors,
			kmeans: pixelgrid::KmeansParams {
				trials: self.trials,
				max_iter: self.max_iter,
				convergence_threshold: self.convergence_threshold,
				seed: self.seed,
			},
		}
	}
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse the convergence number and ensure it is >= `0.0`
fn parse_valid_convergence(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..)
}

/// Parse the maximum number of colors, mapping negative values to `0`
fn parse_max_colors(s: &str) -> Result<u32, String> {
	let value: i64 = s.trim().parse().map_err(|e| format!("{e}"))?;
	if value <= 0 {
		Ok(0)
	} else {
		u32::try_from(value).map_err(|_| format!("{value} is more than the maximum of {} colors", u32::MAX))
	}
}

/// Parse a color name, an `(r,g,b)` triple, or a `#rrggbb` hexcode
pub fn parse_color(s: &str) -> Result<Srgb<u8>, String> {
	let s = s.trim();

	if let Some(hex) = s.strip_prefix('#') {
		return hex.parse().map_err(|_| format!("'{s}' is not a valid hexcode"));
	}

	let triple = s.strip_prefix('(').and_then(|s| s.strip_suffix(')')).unwrap_or(s);
	if triple.contains(',') {
		let channels = triple
			.split(',')
			.map(|c| c.trim().parse::<u8>().map_err(|e| format!("invalid channel '{}' in '{s}': {e}", c.trim())))
			.collect::<Result<Vec<_>, _>>()?;

		return match channels[..] {
			[red, green, blue] => Ok(Srgb::new(red, green, blue)),
			_ => Err(format!("'{s}' does not have exactly 3 channels")),
		};
	}

	palette::named::from_str(&s.to_ascii_lowercase()).ok_or_else(|| format!("'{s}' is not a known color name"))
}
