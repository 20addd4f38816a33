use std::ops::Range;
use std::path::{Path, PathBuf};

use log::info;
use plotters::prelude::*;
use thiserror::Error;

use crate::color::generate_palette;
use crate::config::ChartConfig;
use crate::data::model::SeriesSet;

// ---------------------------------------------------------------------------
// PNG line chart: one line per thread count, hash bits on the x axis
// ---------------------------------------------------------------------------

/// Errors that can occur while rendering a chart.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("invalid chart input: {0}")]
    InvalidData(String),

    #[error("output directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("failed to draw chart: {0}")]
    Drawing(String),

    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

type Result<T> = core::result::Result<T, ChartError>;

const MARKER_SIZE: i32 = 4;
const LINE_WIDTH: u32 = 2;

/// Draw every series of `set` into a PNG at `output`.
///
/// The output directory must already exist; nothing is created implicitly.
pub fn render(set: &SeriesSet, config: &ChartConfig, output: &Path) -> Result<()> {
    let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (set.x_bounds(), set.y_bounds()) else {
        return Err(ChartError::InvalidData("no series to plot".to_string()));
    };
    if config.width == 0 || config.height == 0 {
        return Err(ChartError::InvalidData(format!(
            "image size {}x{} is empty",
            config.width, config.height
        )));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(ChartError::MissingDirectory(parent.to_path_buf()));
        }
    }

    let root = BitMapBackend::new(output, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| ChartError::Drawing(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&config.title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            padded_range(x_lo as f64, x_hi as f64),
            padded_range(y_lo, y_hi),
        )
        .map_err(|e| ChartError::Drawing(e.to_string()))?;

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(&config.x_label)
        .y_desc(&config.y_label)
        .label_style(("sans-serif", 16))
        .x_label_formatter(&format_tick);
    if let Some(step) = config.x_tick_step {
        mesh.x_labels(tick_count(x_lo, x_hi, step));
    }
    mesh.draw().map_err(|e| ChartError::Drawing(e.to_string()))?;

    let palette = generate_palette(set.len());
    for ((threads, points), color) in set.iter().zip(palette) {
        let coords: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x as f64, y)).collect();

        chart
            .draw_series(LineSeries::new(
                coords.iter().copied(),
                color.stroke_width(LINE_WIDTH),
            ))
            .map_err(|e| ChartError::Drawing(e.to_string()))?
            .label(format!("Threads: {threads}"))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(LINE_WIDTH))
            });

        chart
            .draw_series(
                coords
                    .iter()
                    .map(|&p| Circle::new(p, MARKER_SIZE, color.filled())),
            )
            .map_err(|e| ChartError::Drawing(e.to_string()))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", 16))
        .draw()
        .map_err(|e| ChartError::Drawing(e.to_string()))?;

    root.present().map_err(|e| ChartError::Write {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })?;

    info!("wrote {} series to {}", set.len(), output.display());
    Ok(())
}

/// Axis range with a 5% margin on both sides; a degenerate span gets ±1.
fn padded_range(lo: f64, hi: f64) -> Range<f64> {
    let span = hi - lo;
    if span.abs() < f64::EPSILON {
        let pad = (lo.abs() * 0.05).max(1.0);
        return (lo - pad)..(hi + pad);
    }
    let pad = span * 0.05;
    (lo - pad)..(hi + pad)
}

/// Number of x labels needed to place one every `step` hash bits.
fn tick_count(lo: u32, hi: u32, step: u32) -> usize {
    let step = step.max(1);
    let first = lo - lo % step;
    ((hi - first) / step + 1) as usize
}

fn format_tick(x: &f64) -> String {
    if (x - x.round()).abs() < 1e-9 {
        format!("{}", x.round() as i64)
    } else {
        format!("{x:.1}")
    }
}
