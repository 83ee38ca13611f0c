//! Paints the final image from the cell colors

use crate::{CellColors, ColorMap, GridGeometry};
use image::RgbImage;
use palette::Srgb;

/// Paint each cell with its color from `color_map`, then draw the grid lines if `grid_color` is provided.
///
/// Grid lines are 1 pixel wide and lie on the right edge of every cell except those in the last column,
/// and on the bottom edge of every cell except those in the last row.
/// The output has the dimensions of the resized image the cells were sampled from.
#[must_use]
pub fn compose(cells: &CellColors, color_map: &ColorMap, grid_color: Option<Srgb<u8>>) -> RgbImage {
	let geometry = cells.geometry();
	let mut image = RgbImage::new(geometry.width(), geometry.height());

	{
		let buffer: &mut [u8] = &mut image;
		let pixels: &mut [Srgb<u8>] = palette::cast::from_component_slice_mut(buffer);

		for ((row, column), color) in cells.iter() {
			fill_cell(pixels, geometry, row, column, color_map.resolve(color));
		}

		if let Some(grid_color) = grid_color {
			draw_grid(pixels, geometry, grid_color);
		}
	}

	image
}

/// Fill the pixels of a single cell
fn fill_cell(pixels: &mut [Srgb<u8>], geometry: GridGeometry, row: u32, column: u32, color: Srgb<u8>) {
	let (left, top) = geometry.cell_origin(row, column);
	let (left, top) = (left as usize, top as usize);
	let block_width = geometry.block_width as usize;
	let stride = geometry.width() as usize;

	for y in top..(top + geometry.block_height as usize) {
		let start = y * stride + left;
		pixels[start..(start + block_width)].fill(color);
	}
}

/// Draw the lines between cells
fn draw_grid(pixels: &mut [Srgb<u8>], geometry: GridGeometry, color: Srgb<u8>) {
	let stride = geometry.width() as usize;

	// vertical lines on the right edge of each column but the last
	for column in 1..geometry.columns {
		let x = (column * geometry.block_width - 1) as usize;
		for row in pixels.chunks_exact_mut(stride) {
			row[x] = color;
		}
	}

	// horizontal lines on the bottom edge of each row but the last
	for row in 1..geometry.rows {
		let y = (row * geometry.block_height - 1) as usize;
		pixels[(y * stride)..((y + 1) * stride)].fill(color);
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use crate::{reduce, sample, KmeansParams};
	use image::Rgb;

	const GRID: Srgb<u8> = Srgb::new(192, 192, 192);

	/// A 3x4 grid of 3x2 cells, each with its own color
	fn checker_cells() -> CellColors {
		let mut image = RgbImage::new(12, 6);
		for (x, y, pixel) in image.enumerate_pixels_mut() {
			#[allow(clippy::cast_possible_truncation)]
			let i = ((y / 2) * 4 + x / 3) as u8;
			*pixel = Rgb([i * 20, 100, 255 - i * 20]);
		}
		sample(&image, 3, 4).unwrap()
	}

	fn srgb(pixel: &Rgb<u8>) -> Srgb<u8> {
		Srgb::new(pixel[0], pixel[1], pixel[2])
	}

	#[test]
	fn cells_are_filled_without_grid() {
		let cells = checker_cells();
		let image = compose(&cells, &ColorMap::Identity, None);

		assert_eq!(image.dimensions(), (12, 6));
		for (x, y, pixel) in image.enumerate_pixels() {
			assert_eq!(srgb(pixel), cells.get(y / 2, x / 3));
		}
	}

	#[test]
	fn grid_lines_only_on_inner_cell_edges() {
		let cells = checker_cells();
		let image = compose(&cells, &ColorMap::Identity, Some(GRID));

		for (x, y, pixel) in image.enumerate_pixels() {
			let on_vertical_line = x % 3 == 2 && x != 11;
			let on_horizontal_line = y % 2 == 1 && y != 5;
			let expected = if on_vertical_line || on_horizontal_line {
				GRID
			} else {
				cells.get(y / 2, x / 3)
			};
			assert_eq!(srgb(pixel), expected, "pixel ({x}, {y})");
		}
	}

	#[test]
	fn single_cell_has_no_grid() {
		let image = RgbImage::from_pixel(5, 5, Rgb([9, 8, 7]));
		let cells = sample(&image, 1, 1).unwrap();

		let output = compose(&cells, &ColorMap::Identity, Some(GRID));

		assert_eq!(output, image);
	}

	#[test]
	fn cells_use_reduced_colors() {
		let cells = checker_cells();
		let map = reduce(cells.colors(), 2, &KmeansParams::default());
		let reduction = map.reduction().unwrap();

		let image = compose(&cells, &map, None);

		for (x, y, pixel) in image.enumerate_pixels() {
			let color = srgb(pixel);
			assert!(reduction.palette().contains(&color));
			assert_eq!(color, map.resolve(cells.get(y / 2, x / 3)));
		}
	}
}
