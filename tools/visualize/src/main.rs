//! Render a LiDAR HEL summary grid to a PNG for review.
//! HEL is red, NHEL green, no-data white.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hel_core::gridfile;
use hel_core::model::Determination;
use hel_core::raster::Grid;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render lidar_hel_summary to PNG")]
struct Args {
    /// Grid stem of the class raster (e.g. hel_output/lidar_hel_summary).
    input: PathBuf,

    /// Output PNG path.
    #[arg(short, long, default_value = "lidar_hel_summary.png")]
    output: PathBuf,

    /// Pixels per cell.
    #[arg(long, default_value = "1")]
    scale: u32,
}

fn class_color(code: u8) -> [u8; 3] {
    match Determination::from_class_code(code) {
        Some(Determination::Hel) => [220, 40, 40],
        Some(Determination::Nhel) => [60, 170, 60],
        None => [255, 255, 255],
    }
}

fn render(grid: &Grid<u8>, scale: u32) -> image::RgbImage {
    let scale = scale.max(1);
    let mut img = image::RgbImage::new(grid.width as u32 * scale, grid.height as u32 * scale);
    for (x, y, px) in img.enumerate_pixels_mut() {
        let (r, c) = ((y / scale) as usize, (x / scale) as usize);
        *px = image::Rgb(class_color(grid.get(r, c)));
    }
    img
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (_, grid) = gridfile::read::<u8>(&args.input)
        .with_context(|| format!("Cannot read grid {}", args.input.display()))?;

    let counts = grid.data.iter().fold([0usize; 3], |mut acc, &v| {
        acc[(v as usize).min(2)] += 1;
        acc
    });
    render(&grid, args.scale)
        .save(&args.output)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    eprintln!(
        "{}x{} cells ({} HEL, {} NHEL, {} no-data) → {}",
        grid.width,
        grid.height,
        counts[2],
        counts[1],
        counts[0],
        args.output.display()
    );
    Ok(())
}
