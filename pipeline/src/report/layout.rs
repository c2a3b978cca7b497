//! Textual page layouts.
//!
//! A layout is a grid of whitespace-separated non-negative integers. Every id
//! `n = 0, 1, 2, ...` names one cell of the page, and the cell covers the
//! bounding box of the positions holding `n`. Enumeration stops at the first
//! id with no positions, so ids must be dense from zero.
//!
//! Positions of an id are expected to form a solid rectangle, but this is not
//! enforced: an L-shaped region becomes its bounding box. Such cells are
//! reported by [`ReportCell::is_solid`] and [`ReportLayout::irregular_cells`]
//! and logged as warnings; their rectangles are left as computed.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;
use tracing::{debug, warn};

/// Rows of the reference letter page grid.
pub const LAYOUT_ROWS: usize = 22;
/// Columns of the reference letter page grid.
pub const LAYOUT_COLS: usize = 12;

/// Reference page: header strip, a raw and a de-trended panel with a side
/// panel, three rows of auxiliary panels and a footer strip.
pub const DEFAULT_LAYOUT: &str = "\
 0  0  0  0  0  0  0  0  0  0  0  0
 1  1  1  1  1  1  1  1  2  2  2  2
 1  1  1  1  1  1  1  1  2  2  2  2
 1  1  1  1  1  1  1  1  2  2  2  2
 1  1  1  1  1  1  1  1  2  2  2  2
 3  3  3  3  3  3  3  3  2  2  2  2
 3  3  3  3  3  3  3  3  2  2  2  2
 3  3  3  3  3  3  3  3  2  2  2  2
 3  3  3  3  3  3  3  3  2  2  2  2
 4  4  4  4  4  4  4  4  5  5  5  5
 4  4  4  4  4  4  4  4  5  5  5  5
 4  4  4  4  4  4  4  4  5  5  5  5
 4  4  4  4  4  4  4  4  5  5  5  5
 6  6  6  6  6  6  6  6  7  7  7  7
 6  6  6  6  6  6  6  6  7  7  7  7
 6  6  6  6  6  6  6  6  7  7  7  7
 6  6  6  6  6  6  6  6  7  7  7  7
 8  8  8  8  8  8  8  8  9  9  9  9
 8  8  8  8  8  8  8  8  9  9  9  9
 8  8  8  8  8  8  8  8  9  9  9  9
 8  8  8  8  8  8  8  8  9  9  9  9
10 10 10 10 10 10 10 10 10 10 10 10
";

/// Errors raised while parsing a layout or resolving report roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Layout is empty")]
    Empty,

    #[error("Invalid layout token '{token}' at position {position}: expected a non-negative integer")]
    InvalidToken { token: String, position: usize },

    #[error("Layout row {row} has {found} entries, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Layout has {found} entries, expected {rows} x {cols}")]
    WrongSize {
        rows: usize,
        cols: usize,
        found: usize,
    },

    #[error("Report role '{role}' refers to cell {id}, which the layout does not define")]
    MissingRole { role: CellRole, id: usize },

    #[error("Report roles '{first}' and '{second}' both refer to cell {id}")]
    SharedRole {
        first: CellRole,
        second: CellRole,
        id: usize,
    },
}

/// Axis-aligned rectangle on the layout grid, in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRect {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl CellRect {
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row
            && row < self.row + self.height
            && col >= self.col
            && col < self.col + self.width
    }

    pub fn overlaps(&self, other: &CellRect) -> bool {
        self.row < other.row + other.height
            && other.row < self.row + self.height
            && self.col < other.col + other.width
            && other.col < self.col + self.width
    }
}

impl fmt::Display for CellRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.row, self.col, self.height, self.width
        )
    }
}

/// Designated report roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellRole {
    Header,
    Footer,
    RawPanel,
    DetrendedPanel,
}

impl CellRole {
    pub const ALL: [CellRole; 4] = [
        CellRole::Header,
        CellRole::RawPanel,
        CellRole::DetrendedPanel,
        CellRole::Footer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CellRole::Header => "header",
            CellRole::Footer => "footer",
            CellRole::RawPanel => "raw-panel",
            CellRole::DetrendedPanel => "detrended-panel",
        }
    }
}

impl fmt::Display for CellRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cell ids of the designated roles, configurable per mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRoles {
    pub header: usize,
    pub raw: usize,
    pub detrended: usize,
    pub footer: usize,
}

impl Default for ReportRoles {
    fn default() -> Self {
        Self {
            header: 0,
            raw: 1,
            detrended: 3,
            footer: 10,
        }
    }
}

impl ReportRoles {
    pub fn id_for(&self, role: CellRole) -> usize {
        match role {
            CellRole::Header => self.header,
            CellRole::Footer => self.footer,
            CellRole::RawPanel => self.raw,
            CellRole::DetrendedPanel => self.detrended,
        }
    }

    /// Role assigned to a cell id, if any.
    pub fn role_of(&self, id: usize) -> Option<CellRole> {
        CellRole::ALL.into_iter().find(|role| self.id_for(*role) == id)
    }
}

/// One cell of a parsed layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCell {
    pub id: usize,
    pub rect: CellRect,
    /// Grid positions actually holding `id`.
    pub occupied: usize,
    pub role: Option<CellRole>,
}

impl ReportCell {
    /// Whether the id's positions fill the whole bounding box.
    pub fn is_solid(&self) -> bool {
        self.occupied == self.rect.area()
    }
}

/// Running bounding box of one id while scanning the grid.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    row_min: usize,
    row_max: usize,
    col_min: usize,
    col_max: usize,
    count: usize,
}

impl Bounds {
    fn at(row: usize, col: usize) -> Self {
        Self {
            row_min: row,
            row_max: row,
            col_min: col,
            col_max: col,
            count: 1,
        }
    }

    fn include(&mut self, row: usize, col: usize) {
        self.row_min = self.row_min.min(row);
        self.row_max = self.row_max.max(row);
        self.col_min = self.col_min.min(col);
        self.col_max = self.col_max.max(col);
        self.count += 1;
    }

    fn rect(&self) -> CellRect {
        CellRect {
            row: self.row_min,
            col: self.col_min,
            height: self.row_max - self.row_min + 1,
            width: self.col_max - self.col_min + 1,
        }
    }
}

/// A page layout: ordered cells on a `rows x cols` grid, cell `i` has id `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLayout {
    rows: usize,
    cols: usize,
    cells: Vec<ReportCell>,
}

impl ReportLayout {
    /// Parse a layout whose rows are given one per line.
    ///
    /// Blank lines are ignored; every other line must hold the same number of
    /// entries.
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        let lines: Vec<Vec<&str>> = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .filter(|tokens| !tokens.is_empty())
            .collect();

        let cols = match lines.first() {
            Some(first) => first.len(),
            None => return Err(LayoutError::Empty),
        };
        for (row, tokens) in lines.iter().enumerate() {
            if tokens.len() != cols {
                return Err(LayoutError::RaggedRow {
                    row,
                    expected: cols,
                    found: tokens.len(),
                });
            }
        }

        let rows = lines.len();
        let values = parse_tokens(lines.into_iter().flatten())?;
        Self::from_values(values, rows, cols)
    }

    /// Parse a layout from a flat token stream of known shape; line breaks
    /// carry no meaning.
    pub fn parse_with_shape(text: &str, rows: usize, cols: usize) -> Result<Self, LayoutError> {
        let values = parse_tokens(text.split_whitespace())?;
        if values.is_empty() {
            return Err(LayoutError::Empty);
        }
        if rows == 0 || cols == 0 || values.len() != rows * cols {
            return Err(LayoutError::WrongSize {
                rows,
                cols,
                found: values.len(),
            });
        }
        Self::from_values(values, rows, cols)
    }

    fn from_values(values: Vec<usize>, rows: usize, cols: usize) -> Result<Self, LayoutError> {
        let found = values.len();
        let grid = Array2::from_shape_vec((rows, cols), values)
            .map_err(|_| LayoutError::WrongSize { rows, cols, found })?;
        Ok(Self::from_grid(&grid))
    }

    /// Build the cells of an already parsed id grid.
    pub fn from_grid(grid: &Array2<usize>) -> Self {
        let (rows, cols) = grid.dim();

        let mut bounds: BTreeMap<usize, Bounds> = BTreeMap::new();
        for ((row, col), &id) in grid.indexed_iter() {
            bounds
                .entry(id)
                .and_modify(|b| b.include(row, col))
                .or_insert_with(|| Bounds::at(row, col));
        }

        let mut cells = Vec::new();
        for id in 0.. {
            let Some(b) = bounds.get(&id) else {
                break;
            };
            let cell = ReportCell {
                id,
                rect: b.rect(),
                occupied: b.count,
                role: None,
            };
            if !cell.is_solid() {
                warn!(
                    cell = id,
                    occupied = cell.occupied,
                    area = cell.rect.area(),
                    "Layout cell is not a solid rectangle; using its bounding box"
                );
            }
            cells.push(cell);
        }

        let skipped = bounds.len() - cells.len();
        if skipped > 0 {
            debug!(
                skipped,
                first_missing = cells.len(),
                "Layout ids after the first gap are ignored"
            );
        }
        debug!(rows, cols, cells = cells.len(), "Parsed report layout");

        Self { rows, cols, cells }
    }

    /// The reference 22 x 12 layout.
    pub fn default_layout() -> Result<Self, LayoutError> {
        Self::parse(DEFAULT_LAYOUT)
    }

    /// Tag the cells named by `roles`.
    ///
    /// # Errors
    /// - [`LayoutError::MissingRole`] if a role refers to an id the layout
    ///   did not produce
    /// - [`LayoutError::SharedRole`] if two roles name the same cell
    ///
    /// No cell is tagged in either case.
    pub fn with_roles(mut self, roles: &ReportRoles) -> Result<Self, LayoutError> {
        for (i, role) in CellRole::ALL.into_iter().enumerate() {
            let id = roles.id_for(role);
            if id >= self.cells.len() {
                return Err(LayoutError::MissingRole { role, id });
            }
            if let Some(first) = CellRole::ALL[..i].iter().find(|r| roles.id_for(**r) == id) {
                return Err(LayoutError::SharedRole {
                    first: *first,
                    second: role,
                    id,
                });
            }
        }
        for cell in &mut self.cells {
            cell.role = roles.role_of(cell.id);
        }
        Ok(self)
    }

    /// Grid shape as `(rows, cols)`.
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cells(&self) -> &[ReportCell] {
        &self.cells
    }

    pub fn cell(&self, id: usize) -> Option<&ReportCell> {
        self.cells.get(id)
    }

    /// The cell tagged with `role` by [`ReportLayout::with_roles`].
    pub fn cell_for(&self, role: CellRole) -> Option<&ReportCell> {
        self.cells.iter().find(|cell| cell.role == Some(role))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells whose positions do not fill their bounding box.
    pub fn irregular_cells(&self) -> impl Iterator<Item = &ReportCell> {
        self.cells.iter().filter(|cell| !cell.is_solid())
    }
}

fn parse_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Vec<usize>, LayoutError> {
    tokens
        .enumerate()
        .map(|(position, token)| {
            token.parse::<usize>().map_err(|_| LayoutError::InvalidToken {
                token: token.to_string(),
                position,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_cells() {
        let layout = ReportLayout::default_layout().unwrap();
        assert_eq!(layout.dim(), (LAYOUT_ROWS, LAYOUT_COLS));
        assert_eq!(layout.len(), 11);
        assert_eq!(
            layout.cell(0).unwrap().rect,
            CellRect { row: 0, col: 0, height: 1, width: 12 }
        );
        assert_eq!(
            layout.cell(2).unwrap().rect,
            CellRect { row: 1, col: 8, height: 8, width: 4 }
        );
        assert_eq!(
            layout.cell(10).unwrap().rect,
            CellRect { row: 21, col: 0, height: 1, width: 12 }
        );
        assert_eq!(layout.irregular_cells().count(), 0);
    }

    #[test]
    fn test_flat_stream_matches_line_form() {
        let flat = DEFAULT_LAYOUT.split_whitespace().collect::<Vec<_>>().join(" ");
        let parsed = ReportLayout::parse_with_shape(&flat, LAYOUT_ROWS, LAYOUT_COLS).unwrap();
        assert_eq!(parsed, ReportLayout::default_layout().unwrap());
    }

    #[test]
    fn test_gap_stops_enumeration() {
        let layout = ReportLayout::parse("0 1\n3 3").unwrap();
        let ids: Vec<usize> = layout.cells().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_missing_zero_yields_no_cells() {
        let layout = ReportLayout::parse("1 1\n2 2").unwrap();
        assert!(layout.is_empty());
    }

    #[test]
    fn test_l_shape_degrades_to_bounding_box() {
        let layout = ReportLayout::parse("0 1\n0 0").unwrap();
        let cell = layout.cell(0).unwrap();
        assert_eq!(cell.rect, CellRect { row: 0, col: 0, height: 2, width: 2 });
        assert_eq!(cell.occupied, 3);
        assert!(!cell.is_solid());
        assert_eq!(layout.irregular_cells().map(|c| c.id).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ReportLayout::parse("  \n\n"), Err(LayoutError::Empty));
        assert_eq!(
            ReportLayout::parse("0 0\n1"),
            Err(LayoutError::RaggedRow { row: 1, expected: 2, found: 1 })
        );
        assert_eq!(
            ReportLayout::parse("0 -1"),
            Err(LayoutError::InvalidToken { token: "-1".into(), position: 1 })
        );
        assert!(matches!(
            ReportLayout::parse("0 x"),
            Err(LayoutError::InvalidToken { .. })
        ));
        assert_eq!(
            ReportLayout::parse_with_shape("0 0 0", 2, 2),
            Err(LayoutError::WrongSize { rows: 2, cols: 2, found: 3 })
        );
        assert_eq!(ReportLayout::parse_with_shape("", 2, 2), Err(LayoutError::Empty));
    }

    #[test]
    fn test_roles_assigned_by_id() {
        let layout = ReportLayout::default_layout()
            .unwrap()
            .with_roles(&ReportRoles::default())
            .unwrap();
        assert_eq!(layout.cell_for(CellRole::Header).unwrap().id, 0);
        assert_eq!(layout.cell_for(CellRole::RawPanel).unwrap().id, 1);
        assert_eq!(layout.cell_for(CellRole::DetrendedPanel).unwrap().id, 3);
        assert_eq!(layout.cell_for(CellRole::Footer).unwrap().id, 10);
        assert_eq!(layout.cell(2).unwrap().role, None);
    }

    #[test]
    fn test_missing_role_rejected() {
        let layout = ReportLayout::parse("0 1\n2 2").unwrap();
        let err = layout.with_roles(&ReportRoles::default()).unwrap_err();
        assert_eq!(
            err,
            LayoutError::MissingRole { role: CellRole::DetrendedPanel, id: 3 }
        );
        assert_eq!(
            err.to_string(),
            "Report role 'detrended-panel' refers to cell 3, which the layout does not define"
        );
    }

    #[test]
    fn test_shared_role_rejected() {
        let layout = ReportLayout::default_layout().unwrap();
        let roles = ReportRoles {
            detrended: 1,
            ..ReportRoles::default()
        };
        let err = layout.with_roles(&roles).unwrap_err();
        assert_eq!(
            err,
            LayoutError::SharedRole {
                first: CellRole::RawPanel,
                second: CellRole::DetrendedPanel,
                id: 1,
            }
        );
    }

    #[test]
    fn test_rect_geometry() {
        let a = CellRect { row: 0, col: 0, height: 2, width: 3 };
        let b = CellRect { row: 1, col: 2, height: 1, width: 1 };
        let c = CellRect { row: 2, col: 0, height: 1, width: 3 };
        assert_eq!(a.area(), 6);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.contains(1, 2));
        assert!(!a.contains(2, 0));
        assert_eq!(a.to_string(), "(0, 0) 2x3");
    }
}
