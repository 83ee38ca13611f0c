//! Turn an image into grid-based pixel art, with an optional reduced palette and grid lines.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod cli;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use clap::Parser;
use colored::Colorize;
use image::{DynamicImage, ImageFormat, RgbImage};
use log::{info, warn, LevelFilter};
use palette::Srgb;
use pixelgrid::{Pixelated, Report};

/// Record the running time of a function and log the elapsed time
macro_rules! time {
    ($name: literal, $func_call: expr) => {{
        let start = Instant::now();
        let result = $func_call;
        info!("{} took {}ms", $name, start.elapsed().as_millis());
        result
    }};
}

/// Error cases for a run of the CLI
#[derive(Debug)]
enum RunError {
    /// Failed to read or decode the image file
    ImageLoad(PathBuf, image::ImageError),
    /// Failed to read the avif file
    #[cfg(feature = "avif")]
    AvifRead(PathBuf, std::io::Error),
    /// Failed to decode the avif file
    #[cfg(feature = "avif")]
    AvifDecode(PathBuf, libavif_image::Error),
    /// The grid does not fit the image
    Pixelate(PathBuf, pixelgrid::Error),
    /// Failed to pick an image format for the output path
    OutputFormat(PathBuf, image::ImageError),
    /// Failed to encode or write the output image
    Save(PathBuf, image::ImageError),
    /// Failed to move the finished output image into place
    Rename(PathBuf, std::io::Error),
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::ImageLoad(path, e) => {
                write!(f, "Failed to load the image file '{}': {e}", path.display())
            }
            #[cfg(feature = "avif")]
            RunError::AvifRead(path, e) => {
                write!(f, "Failed to read the avif file '{}': {e}", path.display())
            }
            #[cfg(feature = "avif")]
            RunError::AvifDecode(path, e) => {
                write!(f, "Failed to decode the avif file '{}': {e}", path.display())
            }
            RunError::Pixelate(path, e) => {
                write!(f, "Failed to pixelate '{}': {e}", path.display())
            }
            RunError::OutputFormat(path, e) => {
                write!(f, "Unsupported output image format for '{}': {e}", path.display())
            }
            RunError::Save(path, e) => {
                write!(f, "Failed to save the image to '{}': {e}", path.display())
            }
            RunError::Rename(path, e) => {
                write!(f, "Failed to move the image into '{}': {e}", path.display())
            }
        }
    }
}

fn main() -> ExitCode {
    let options = Options::parse();

    init_logger(options.verbose);

    let result = run_pixelate(&options);

    // Returning Result<_> uses Debug printing instead of Display
    if let Err(e) = result {
        eprintln!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Log info messages with `--verbose`, otherwise only warnings and errors.
/// `RUST_LOG` takes precedence over both.
fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Builds a thread pool and then runs `pixelate_and_save`
#[cfg(feature = "threads")]
fn run_pixelate(options: &Options) -> Result<(), RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(usize::from(options.threads))
        .build()
        .expect("initialized thread pool");

    pool.install(|| pixelate_and_save(options))
}

/// Runs `pixelate_and_save` on a single thread
#[cfg(not(feature = "threads"))]
fn run_pixelate(options: &Options) -> Result<(), RunError> {
    pixelate_and_save(options)
}

/// Load an image, pixelate it, and save the result using the given options
fn pixelate_and_save(options: &Options) -> Result<(), RunError> {
    // Input
    let img = time!("Image loading", load_image(&options.image))?;
    let img = img.into_rgb8();

    // Processing
    let Pixelated { image, report } = time!(
        "Pixelation",
        pixelgrid::pixelate(&img, &options.pixelate_options())
    )
    .map_err(|e| RunError::Pixelate(options.image.clone(), e))?;

    log_report(&report);

    // Output
    let format = output_format(&options.output)?;
    create_parent_dir(&options.output);
    time!("Saving", save_atomic(&image, &options.output, format))?;
    info!("Saved the pixelated image to '{}'", options.output.display());

    if let Some(format) = options.print_palette {
        print_palette(&report.palette, format);
    }

    Ok(())
}

/// Load the image at the given path
#[cfg(feature = "avif")]
fn load_image(path: &Path) -> Result<DynamicImage, RunError> {
    if path.extension().map_or(false, |ext| ext == "avif") {
        let buf = fs::read(path).map_err(|e| RunError::AvifRead(path.to_owned(), e))?;
        libavif_image::read(&buf).map_err(|e| RunError::AvifDecode(path.to_owned(), e))
    } else {
        image::open(path).map_err(|e| RunError::ImageLoad(path.to_owned(), e))
    }
}

/// Load the image at the given path
#[cfg(not(feature = "avif"))]
fn load_image(path: &Path) -> Result<DynamicImage, RunError> {
    image::open(path).map_err(|e| RunError::ImageLoad(path.to_owned(), e))
}

/// Log the details of a finished run
fn log_report(report: &Report) {
    let geometry = report.geometry;
    let (width, height) = report.source_dimensions;
    info!(
        "Divided the {width}x{height} image into {}x{} cells of {}x{} pixels",
        geometry.rows, geometry.columns, geometry.block_width, geometry.block_height
    );
    info!("Sampled {} distinct cell colors", report.unique_colors);

    match report.reduction {
        Some(stats) => info!(
            "Reduced to {} colors (max {}), k-means took {} iterations with a final variance of {}",
            stats.palette_size, stats.max_colors, stats.iterations, stats.variance
        ),
        None => info!("Skipped color reduction"),
    }
}

/// Create the parent directory of `path` if it does not exist yet.
///
/// Errors are logged rather than returned, since saving will report any real problem.
fn create_parent_dir(path: &Path) {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        match fs::create_dir_all(dir) {
            Ok(()) => info!("Directory '{}' created or already exists", dir.display()),
            Err(e) => warn!("Failed to create directory '{}': {e}", dir.display()),
        }
    }
}

/// The hidden file next to `path` that an image is written to before being moved to `path`
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "image".into(), |name| name.to_string_lossy());
    path.with_file_name(format!(".{name}.partial"))
}

/// The image format for `path`, based off its file extension
fn output_format(path: &Path) -> Result<ImageFormat, RunError> {
    ImageFormat::from_path(path).map_err(|e| RunError::OutputFormat(path.to_owned(), e))
}

/// Save `image` to `path` without leaving a partially written file behind.
///
/// The image is encoded into a temporary file in the same directory, which is then renamed to `path`.
fn save_atomic(image: &RgbImage, path: &Path, format: ImageFormat) -> Result<(), RunError> {
    let partial = partial_path(path);
    if let Err(e) = image.save_with_format(&partial, format) {
        // ignore the error, the file may not have been created in the first place
        let _ = fs::remove_file(&partial);
        return Err(RunError::Save(path.to_owned(), e));
    }

    fs::rename(&partial, path).map_err(|e| {
        let _ = fs::remove_file(&partial);
        RunError::Rename(path.to_owned(), e)
    })
}

/// Print the given colors in the given format
fn print_palette(colors: &[Srgb<u8>], format: FormatOutput) {
    match format {
        FormatOutput::Hex => print_colors(colors, " ", |color| format!("#{color:X}")),

        FormatOutput::Rgb => print_colors(colors, " ", |color| {
            format!("({},{},{})", color.red, color.green, color.blue)
        }),

        FormatOutput::Swatch => print_colors(colors, "", |color| {
            "   "
                .on_truecolor(color.red, color.green, color.blue)
                .to_string()
        }),
    }
}

/// Print a line of colors using the given format
fn print_colors(colors: &[Srgb<u8>], delimiter: &str, format: impl Fn(Srgb<u8>) -> String) {
    println!(
        "{}",
        colors
            .iter()
            .map(|&color| format(color))
            .collect::<Vec<_>>()
            .join(delimiter)
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    fn options(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("pixelgrid").chain(args.iter().copied())).unwrap()
    }

    fn write_image(path: &Path, image: &RgbImage) {
        image.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("out/dir/image.png")),
            PathBuf::from("out/dir/.image.png.partial")
        );
    }

    #[test]
    fn save_atomic_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let image = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));

        save_atomic(&image, &path, ImageFormat::Png).unwrap();

        assert!(!partial_path(&path).exists());
        assert_eq!(image::open(&path).unwrap().into_rgb8(), image);
    }

    #[test]
    fn output_format_rejects_unknown_extension() {
        assert!(matches!(
            output_format(Path::new("out.unknown")),
            Err(RunError::OutputFormat(..))
        ));
        assert_eq!(
            output_format(Path::new("out.png")).unwrap(),
            ImageFormat::Png
        );
    }

    #[test]
    fn unknown_extension_creates_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("new/dir/out.xyz");
        write_image(&input, &RgbImage::new(4, 4));

        let options = options(&[
            input.to_str().unwrap(),
            "-r",
            "2",
            "-c",
            "2",
            "-o",
            output.to_str().unwrap(),
        ]);

        assert!(matches!(
            pixelate_and_save(&options),
            Err(RunError::OutputFormat(..))
        ));
        assert!(!dir.path().join("new").exists());
    }

    #[test]
    fn create_parent_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.png");

        create_parent_dir(&path);
        create_parent_dir(&path);

        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn missing_image_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.png");
        let options = options(&[
            dir.path().join("missing.png").to_str().unwrap(),
            "-r",
            "2",
            "-c",
            "2",
            "-o",
            output.to_str().unwrap(),
        ]);

        assert!(matches!(
            pixelate_and_save(&options),
            Err(RunError::ImageLoad(..))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn too_fine_grid_is_reported_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_image(&input, &RgbImage::new(4, 4));

        let options = options(&[
            input.to_str().unwrap(),
            "-r",
            "5",
            "-c",
            "2",
            "-o",
            output.to_str().unwrap(),
        ]);

        assert!(matches!(
            pixelate_and_save(&options),
            Err(RunError::Pixelate(_, pixelgrid::Error::GridTooFine { .. }))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn max_colors_above_distinct_colors_keeps_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");

        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 20, 30], [200, 100, 50]];
        let image = RgbImage::from_fn(5, 1, |x, _| Rgb(colors[x as usize]));
        write_image(&input, &image);

        let options = options(&[
            input.to_str().unwrap(),
            "-r",
            "1",
            "-c",
            "5",
            "-o",
            output.to_str().unwrap(),
            "--no-grid",
            "-k",
            "300",
        ]);

        pixelate_and_save(&options).unwrap();

        assert_eq!(image::open(&output).unwrap().into_rgb8(), image);
    }

    #[test]
    fn uniform_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("nested/out.png");
        let red = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        write_image(&input, &red);

        let options = options(&[
            input.to_str().unwrap(),
            "-r",
            "2",
            "-c",
            "2",
            "-o",
            output.to_str().unwrap(),
            "--no-grid",
            "-k",
            "0",
        ]);

        pixelate_and_save(&options).unwrap();

        assert_eq!(image::open(&output).unwrap().into_rgb8(), red);
    }
}
