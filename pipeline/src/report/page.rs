//! Report pages and the renderer contract.
//!
//! A [`ReportPage`] pairs every cell of a [`ReportLayout`] with what should be
//! drawn in it. Turning a page into an artifact is up to a [`ReportRenderer`].

use std::path::Path;

use super::layout::{CellRect, ReportCell, ReportLayout};

/// Errors raised while writing a report artifact.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Report file I/O failed")]
    Io(#[from] std::io::Error),

    #[error("Drawing failed: {0}")]
    Drawing(String),
}

impl RenderError {
    pub fn drawing(message: impl ToString) -> Self {
        Self::Drawing(message.to_string())
    }
}

/// A time series to plot, with optional symmetric error bars.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub y_error: Option<Vec<f64>>,
}

impl SeriesPlot {
    pub fn new(title: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            x,
            y,
            y_error: None,
        }
    }

    pub fn with_labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_errors(mut self, y_error: Vec<f64>) -> Self {
        self.y_error = Some(y_error);
        self
    }

    /// Finite `(x, y)` samples, NaN and infinite points dropped.
    pub fn finite_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .map(|(&x, &y)| (x, y))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }

    /// `((x_min, x_max), (y_min, y_max))` over the finite samples.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        self.finite_points().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => ((x, x), (y, y)),
                Some(((x0, x1), (y0, y1))) => ((x0.min(x), x1.max(x)), (y0.min(y), y1.max(y))),
            })
        })
    }
}

/// What a cell shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellContent {
    #[default]
    Empty,
    /// Lines of text, top to bottom.
    Text(Vec<String>),
    Series(SeriesPlot),
}

impl CellContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageCell {
    pub cell: ReportCell,
    pub content: CellContent,
}

/// One report page: layout cells and their contents, in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPage {
    grid: (usize, usize),
    cells: Vec<PageCell>,
}

impl ReportPage {
    /// A page with every cell of `layout` empty.
    pub fn new(layout: &ReportLayout) -> Self {
        let cells = layout
            .cells()
            .iter()
            .map(|cell| PageCell {
                cell: cell.clone(),
                content: CellContent::Empty,
            })
            .collect();
        Self {
            grid: layout.dim(),
            cells,
        }
    }

    /// Grid shape as `(rows, cols)`.
    pub fn grid(&self) -> (usize, usize) {
        self.grid
    }

    pub fn cells(&self) -> &[PageCell] {
        &self.cells
    }

    pub fn cell(&self, id: usize) -> Option<&PageCell> {
        self.cells.get(id)
    }

    /// Set the content of cell `id`; ids outside the layout are ignored and
    /// reported as `false`.
    pub fn set(&mut self, id: usize, content: CellContent) -> bool {
        match self.cells.get_mut(id) {
            Some(cell) => {
                cell.content = content;
                true
            }
            None => false,
        }
    }

    /// Mark every empty cell with its number, for checking layouts by eye.
    pub fn label_empty_cells(&mut self) {
        for cell in &mut self.cells {
            if cell.content.is_empty() {
                cell.content = CellContent::Text(vec![format!("Cell #{:02}", cell.cell.id)]);
            }
        }
    }

    /// Rectangle of cell `id` in grid units.
    pub fn rect(&self, id: usize) -> Option<CellRect> {
        self.cells.get(id).map(|c| c.cell.rect)
    }
}

/// Writes a [`ReportPage`] to disk.
pub trait ReportRenderer {
    /// File extension of the artifact, without the dot.
    fn extension(&self) -> &str;

    /// Render `page` to `path`, replacing any existing file.
    fn render(&self, page: &ReportPage, path: &Path) -> Result<(), RenderError>;
}
