//! Report pages: layout geometry, cell contents and renderers.

pub mod layout;
pub mod page;
#[cfg(feature = "svg-report")]
pub mod svg;

pub use layout::{
    CellRect, CellRole, LayoutError, ReportCell, ReportLayout, ReportRoles, DEFAULT_LAYOUT,
    LAYOUT_COLS, LAYOUT_ROWS,
};
pub use page::{CellContent, PageCell, RenderError, ReportPage, ReportRenderer, SeriesPlot};
#[cfg(feature = "svg-report")]
pub use svg::SvgRenderer;
