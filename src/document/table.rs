//! Table structure and the per-table exports (CSV, HTML, Markdown grid).

use crate::error::DocServeError;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One cell of a table, possibly spanning several rows/columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    #[serde(default = "one")]
    pub row_span: usize,
    #[serde(default = "one")]
    pub col_span: usize,
    pub start_row_offset_idx: usize,
    pub end_row_offset_idx: usize,
    pub start_col_offset_idx: usize,
    pub end_col_offset_idx: usize,
    #[serde(default)]
    pub column_header: bool,
    #[serde(default)]
    pub row_header: bool,
}

fn one() -> usize {
    1
}

impl TableCell {
    /// A 1×1 cell at (`row`, `col`).
    pub fn new(text: impl Into<String>, row: usize, col: usize) -> Self {
        Self::spanning(text, row, col, 1, 1)
    }

    pub fn spanning(
        text: impl Into<String>,
        row: usize,
        col: usize,
        row_span: usize,
        col_span: usize,
    ) -> Self {
        let row_span = row_span.max(1);
        let col_span = col_span.max(1);
        Self {
            text: text.into(),
            row_span,
            col_span,
            start_row_offset_idx: row,
            end_row_offset_idx: row + row_span,
            start_col_offset_idx: col,
            end_col_offset_idx: col + col_span,
            column_header: false,
            row_header: false,
        }
    }

    pub fn with_column_header(mut self, yes: bool) -> Self {
        self.column_header = yes;
        self
    }
}

/// Cell list plus grid dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub num_rows: usize,
    pub num_cols: usize,
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

impl TableData {
    /// Build from cells; dimensions grow to cover every cell.
    pub fn from_cells(cells: Vec<TableCell>) -> Self {
        let num_rows = cells.iter().map(|c| c.end_row_offset_idx).max().unwrap_or(0);
        let num_cols = cells.iter().map(|c| c.end_col_offset_idx).max().unwrap_or(0);
        Self {
            num_rows,
            num_cols,
            table_cells: cells,
        }
    }

    /// Build from plain rows of text. With `header_row`, the first row is
    /// marked as column header.
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>], header_row: bool) -> Self {
        let cells = rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter().enumerate().map(move |(c, text)| {
                    TableCell::new(text.as_ref().trim(), r, c).with_column_header(header_row && r == 0)
                })
            })
            .collect();
        Self::from_cells(cells)
    }

    /// Dense `num_rows × num_cols` grid. Spanning cells are repeated in every
    /// position they cover; uncovered positions hold an empty cell.
    pub fn grid(&self) -> Vec<Vec<TableCell>> {
        let mut grid: Vec<Vec<TableCell>> = (0..self.num_rows)
            .map(|r| (0..self.num_cols).map(|c| TableCell::new("", r, c)).collect())
            .collect();
        for cell in &self.table_cells {
            for r in cell.start_row_offset_idx..cell.end_row_offset_idx.min(self.num_rows) {
                for c in cell.start_col_offset_idx..cell.end_col_offset_idx.min(self.num_cols) {
                    grid[r][c] = cell.clone();
                }
            }
        }
        grid
    }

    /// Tabular view: header row(s) folded into column names, body rows as text.
    ///
    /// Leading rows that contain a column-header cell become the header; their
    /// texts are joined per column with `.`. Without header rows the columns
    /// are named `0..num_cols`.
    pub fn export_to_dataframe(&self) -> DataFrame {
        let grid = self.grid();
        let header_rows = grid
            .iter()
            .take_while(|row| row.iter().any(|c| c.column_header))
            .count();

        let columns = if header_rows == 0 {
            (0..self.num_cols).map(|c| c.to_string()).collect()
        } else {
            (0..self.num_cols)
                .map(|c| {
                    let mut parts: Vec<&str> = Vec::new();
                    for row in &grid[..header_rows] {
                        let text = row[c].text.as_str();
                        if !text.is_empty() && parts.last() != Some(&text) {
                            parts.push(text);
                        }
                    }
                    parts.join(".")
                })
                .collect()
        };

        let rows = grid[header_rows..]
            .iter()
            .map(|row| row.iter().map(|c| c.text.clone()).collect())
            .collect();

        DataFrame { columns, rows }
    }

    /// `<table>` fragment. Spanning cells are emitted once with
    /// `rowspan`/`colspan`; header cells use `<th>`.
    pub fn export_to_html(&self) -> String {
        let grid = self.grid();
        let mut out = String::from("<table><tbody>");
        for (r, row) in grid.iter().enumerate() {
            out.push_str("<tr>");
            for (c, cell) in row.iter().enumerate() {
                if cell.start_row_offset_idx != r || cell.start_col_offset_idx != c {
                    continue;
                }
                let tag = if cell.column_header || cell.row_header {
                    "th"
                } else {
                    "td"
                };
                out.push('<');
                out.push_str(tag);
                if cell.row_span > 1 {
                    out.push_str(&format!(" rowspan=\"{}\"", cell.row_span));
                }
                if cell.col_span > 1 {
                    out.push_str(&format!(" colspan=\"{}\"", cell.col_span));
                }
                out.push('>');
                out.push_str(&super::html::escape(&cell.text));
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
        out
    }

    /// GitHub-flavoured Markdown table. The first grid row is the header.
    pub fn export_to_markdown(&self) -> String {
        let grid = self.grid();
        if grid.is_empty() {
            return String::new();
        }
        let texts: Vec<Vec<String>> = grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.text.replace('|', "\\|").replace('\n', " "))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = (0..self.num_cols)
            .map(|c| {
                texts
                    .iter()
                    .map(|row| row[c].chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(3)
            })
            .collect();

        let fmt_row = |row: &[String]| -> String {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(t, w)| format!("{t:<w$}", w = *w))
                .collect();
            format!("| {} |", cells.join(" | "))
        };

        let mut lines = Vec::with_capacity(texts.len() + 1);
        lines.push(fmt_row(&texts[0]));
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        lines.push(format!("|-{}-|", sep.join("-|-")));
        for row in &texts[1..] {
            lines.push(fmt_row(row));
        }
        lines.join("\n")
    }
}

/// Column names plus string rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataFrame {
    /// Write as CSV: header line, then one line per row, no index column.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<(), DocServeError> {
        let mut w = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        w.write_record(&self.columns)?;
        for row in &self.rows {
            w.write_record(row)?;
        }
        w.flush()
            .map_err(|e| DocServeError::Internal(format!("csv flush: {e}")))?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, DocServeError> {
        let mut buf = Vec::new();
        self.to_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| DocServeError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sales() -> TableData {
        TableData::from_rows(
            &[
                vec!["Region", "Q1", "Q2"],
                vec!["North", "10", "12"],
                vec!["South", "7", "9"],
            ],
            true,
        )
    }

    #[test]
    fn dataframe_with_header() {
        let df = sales().export_to_dataframe();
        assert_eq!(df.columns, vec!["Region", "Q1", "Q2"]);
        assert_eq!(df.rows.len(), 2);
        assert_eq!(
            df.to_csv_string().unwrap(),
            "Region,Q1,Q2\nNorth,10,12\nSouth,7,9\n"
        );
    }

    #[test]
    fn dataframe_without_header_uses_positions() {
        let df = TableData::from_rows(&[vec!["a", "b"]], false).export_to_dataframe();
        assert_eq!(df.columns, vec!["0", "1"]);
        assert_eq!(df.rows, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn csv_quotes_commas() {
        let df = TableData::from_rows(&[vec!["name"], vec!["Doe, Jane"]], true).export_to_dataframe();
        assert_eq!(df.to_csv_string().unwrap(), "name\n\"Doe, Jane\"\n");
    }

    #[test]
    fn spans_fill_grid_and_html() {
        let data = TableData::from_cells(vec![
            TableCell::spanning("Total", 0, 0, 1, 2).with_column_header(true),
            TableCell::new("1", 1, 0),
            TableCell::new("2", 1, 1),
        ]);
        assert_eq!((data.num_rows, data.num_cols), (2, 2));
        let grid = data.grid();
        assert_eq!(grid[0][1].text, "Total");
        assert_eq!(
            data.export_to_html(),
            "<table><tbody><tr><th colspan=\"2\">Total</th></tr><tr><td>1</td><td>2</td></tr></tbody></table>"
        );
        // Repeated span text collapses in the header name.
        assert_eq!(data.export_to_dataframe().columns, vec!["Total", "Total"]);
    }

    #[test]
    fn markdown_grid() {
        let md = TableData::from_rows(&[vec!["A", "Long header"], vec!["x|y", "1"]], true)
            .export_to_markdown();
        assert_eq!(
            md,
            "| A    | Long header |\n|------|-------------|\n| x\\|y | 1           |"
        );
    }
}
