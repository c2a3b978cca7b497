//! SVG page renderer built on plotters.

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::debug;

use super::layout::CellRect;
use super::page::{CellContent, RenderError, ReportPage, ReportRenderer, SeriesPlot};

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;
type DrawResult = Result<(), Box<dyn std::error::Error>>;

/// Renders a page as a single SVG image, letter sized by default.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgRenderer {
    /// Page width in pixels
    pub width: u32,
    /// Page height in pixels
    pub height: u32,
    /// Blank border around the layout grid, in pixels
    pub margin: u32,
    /// Space between adjacent cells, in pixels
    pub padding: u32,
    pub font_size: u32,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            width: 850,
            height: 1100,
            margin: 48,
            padding: 6,
            font_size: 12,
        }
    }
}

impl SvgRenderer {
    pub fn new(width: u32, height: u32, margin: u32) -> Self {
        Self {
            width,
            height,
            margin,
            ..Self::default()
        }
    }

    /// Pixel origin and size of a grid rectangle inside a `(width, height)`
    /// drawing area split into `grid = (rows, cols)` units.
    pub fn cell_pixels(
        &self,
        rect: CellRect,
        grid: (usize, usize),
        area: (u32, u32),
    ) -> ((i32, i32), (u32, u32)) {
        let (rows, cols) = (grid.0.max(1) as f64, grid.1.max(1) as f64);
        let unit_w = area.0 as f64 / cols;
        let unit_h = area.1 as f64 / rows;

        let x0 = (rect.col as f64 * unit_w).round();
        let y0 = (rect.row as f64 * unit_h).round();
        let x1 = ((rect.col + rect.width) as f64 * unit_w).round();
        let y1 = ((rect.row + rect.height) as f64 * unit_h).round();

        let pad = self.padding as f64 / 2.0;
        let w = (x1 - x0 - 2.0 * pad).max(1.0);
        let h = (y1 - y0 - 2.0 * pad).max(1.0);
        (((x0 + pad) as i32, (y0 + pad) as i32), (w as u32, h as u32))
    }

    fn draw_page(&self, page: &ReportPage, path: &Path) -> DrawResult {
        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let m = self.margin as i32;
        let inner = root.margin(m, m, m, m);
        let dim = inner.dim_in_pixel();

        for page_cell in page.cells() {
            let (origin, size) = self.cell_pixels(page_cell.cell.rect, page.grid(), dim);
            let area = inner.clone().shrink(origin, size);
            match &page_cell.content {
                CellContent::Empty => {}
                CellContent::Text(lines) => self.draw_text(&area, lines)?,
                CellContent::Series(plot) => self.draw_series(&area, plot)?,
            }
        }

        root.present()?;
        Ok(())
    }

    fn draw_text(&self, area: &Area<'_>, lines: &[String]) -> DrawResult {
        let style = ("sans-serif", self.font_size as f64).into_font().color(&BLACK);
        let step = self.font_size as i32 + 4;
        for (i, line) in lines.iter().enumerate() {
            area.draw_text(line, &style, (2, 2 + i as i32 * step))?;
        }
        Ok(())
    }

    fn draw_series(&self, area: &Area<'_>, plot: &SeriesPlot) -> DrawResult {
        let ((x0, x1), (y0, y1)) = match plot.bounds() {
            Some(bounds) => bounds,
            // Nothing finite to plot; leave an empty frame with the title
            None => ((0.0, 1.0), (0.0, 1.0)),
        };
        let (x0, x1) = widen(x0, x1, 0.02);
        let (y0, y1) = widen(y0, y1, 0.08);

        let mut chart = ChartBuilder::on(area)
            .caption(&plot.title, ("sans-serif", self.font_size))
            .margin(4)
            .x_label_area_size(24)
            .y_label_area_size(56)
            .build_cartesian_2d(x0..x1, y0..y1)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(plot.x_label.as_str())
            .y_desc(plot.y_label.as_str())
            .label_style(("sans-serif", self.font_size.saturating_sub(3).max(6)))
            .draw()?;

        if let Some(errors) = &plot.y_error {
            chart.draw_series(
                plot.x
                    .iter()
                    .zip(&plot.y)
                    .zip(errors)
                    .filter(|((x, y), e)| x.is_finite() && y.is_finite() && e.is_finite())
                    .map(|((&x, &y), &e)| {
                        PathElement::new(vec![(x, y - e), (x, y + e)], BLACK.mix(0.2))
                    }),
            )?;
        }
        chart.draw_series(
            plot.finite_points()
                .map(|point| Circle::new(point, 1, BLUE.filled())),
        )?;

        Ok(())
    }
}

/// Pad a range by `fraction` of its span, or by one unit when it is degenerate.
fn widen(lo: f64, hi: f64, fraction: f64) -> (f64, f64) {
    let span = hi - lo;
    if span > 0.0 {
        (lo - span * fraction, hi + span * fraction)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

impl ReportRenderer for SvgRenderer {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(&self, page: &ReportPage, path: &Path) -> Result<(), RenderError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.draw_page(page, path).map_err(RenderError::drawing)?;
        debug!(path = %path.display(), cells = page.cells().len(), "Rendered SVG report");
        Ok(())
    }
}
