//! Table binding: bounded fill of a fixed-size grid
//!
//! A table template never grows past its designed layout, and stale
//! content from a previous render never survives: the filled region is
//! `min(grid rows, result rows [+1 for header]) x min(grid cols, result
//! cols)` and every cell beyond it is cleared.

use crate::document::TableGrid;
use crate::error::LookdeckError;
use crate::normalize::ResultSet;

pub fn fill_table(
    grid: &mut TableGrid,
    result: &ResultSet,
    headers: bool,
) -> Result<(), LookdeckError> {
    let data_rows = result.rows.len();
    let result_rows = if headers { data_rows + 1 } else { data_rows };
    let rows_to_fill = grid.rows.min(result_rows);
    let cols_to_fill = grid.cols.min(result.columns.len());

    if headers {
        for col in 0..cols_to_fill {
            grid.set_cell(0, col, result.columns[col].label.clone());
        }
        for row in 1..rows_to_fill {
            for col in 0..cols_to_fill {
                grid.set_cell(row, col, result.cell_text(row - 1, col).unwrap_or_default());
            }
        }
    } else {
        for row in 0..rows_to_fill {
            for col in 0..cols_to_fill {
                grid.set_cell(row, col, result.cell_text(row, col).unwrap_or_default());
            }
        }
    }

    // Clear everything outside the filled region.
    for row in rows_to_fill..grid.rows {
        for col in 0..grid.cols {
            grid.set_cell(row, col, "");
        }
    }
    for col in cols_to_fill..grid.cols {
        for row in 0..grid.rows {
            grid.set_cell(row, col, "");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn two_by_two_result() -> ResultSet {
        normalize(&json!({
            "metadata": {"fields": {
                "dimensions": [{"name": "d", "label": "Day"}],
                "measures": [{"name": "m", "label": "Count"}]
            }},
            "rows": [
                {"d": {"value": "mon"}, "m": {"value": 1}},
                {"d": {"value": "tue"}, "m": {"value": 2}}
            ]
        }))
    }

    fn dirty_grid(rows: usize, cols: usize) -> TableGrid {
        let mut grid = TableGrid::new(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                grid.set_cell(r, c, "stale");
            }
        }
        grid
    }

    #[test]
    fn fill_with_headers() {
        let mut grid = dirty_grid(4, 3);
        fill_table(&mut grid, &two_by_two_result(), true).unwrap();

        assert_eq!(grid.cell(0, 0), Some("day"));
        assert_eq!(grid.cell(0, 1), Some("count"));
        assert_eq!(grid.cell(1, 0), Some("mon"));
        assert_eq!(grid.cell(2, 1), Some("2"));
        // remainder cleared, nothing stale left
        assert_eq!(grid.cell(3, 0), Some(""));
        assert_eq!(grid.cell(0, 2), Some(""));
        assert_eq!(grid.cell(2, 2), Some(""));
    }

    #[test]
    fn fill_without_headers_starts_at_origin() {
        let mut grid = dirty_grid(3, 2);
        fill_table(&mut grid, &two_by_two_result(), false).unwrap();

        assert_eq!(grid.cell(0, 0), Some("mon"));
        assert_eq!(grid.cell(1, 1), Some("2"));
        assert_eq!(grid.cell(2, 0), Some(""));
        assert_eq!(grid.cell(2, 1), Some(""));
    }

    #[test]
    fn grid_never_grows_past_designed_layout() {
        // 2x1 grid, 2x2 result with header: fill exactly min(2,3) x min(1,2)
        let mut grid = dirty_grid(2, 1);
        fill_table(&mut grid, &two_by_two_result(), true).unwrap();

        assert_eq!(grid.cell(0, 0), Some("day"));
        assert_eq!(grid.cell(1, 0), Some("mon"));
        assert_eq!(grid.cells.len(), 2);
    }

    #[test]
    fn fill_bound_property() {
        // R=5, C=4 grid; r=2, c=2 result without headers: exactly
        // min(5,2) x min(4,2) filled, all 16 other cells cleared.
        let mut grid = dirty_grid(5, 4);
        fill_table(&mut grid, &two_by_two_result(), false).unwrap();

        let filled = grid
            .cells
            .iter()
            .filter(|cell| !cell.is_empty())
            .count();
        assert_eq!(filled, 4);
    }
}
