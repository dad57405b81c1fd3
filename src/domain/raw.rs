//! Raw tabular input, before any typing.

use crate::domain::columns::HeaderIndex;

/// Rows of string cells with their header line.
///
/// This is what the I/O boundary hands to the normalizers; it has no notion
/// of types or canonical names yet.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Records the reader could not decode at all (bad quoting, bad UTF-8).
    pub unreadable_rows: usize,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            unreadable_rows: 0,
        }
    }

    pub fn header_index(&self) -> HeaderIndex {
        HeaderIndex::new(&self.headers)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Trimmed, non-empty cell.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Coerce a cell to `f64`; anything non-numeric becomes missing.
///
/// A decimal comma is accepted when the text has no decimal point
/// (`"12,5"` is 12.5). Non-finite results are missing too.
pub fn coerce_f64(cell: Option<&str>) -> Option<f64> {
    let s = cell?.trim();
    if s.is_empty() {
        return None;
    }
    let v = match s.parse::<f64>() {
        Ok(v) => v,
        Err(_) if !s.contains('.') && s.matches(',').count() == 1 => s.replace(',', ".").parse::<f64>().ok()?,
        Err(_) => return None,
    };
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("12.5"), Some(12.5))]
    #[case(Some(" 7 "), Some(7.0))]
    #[case(Some("12,5"), Some(12.5))]
    #[case(Some("1,2,3"), None)]
    #[case(Some("n/a"), None)]
    #[case(Some(""), None)]
    #[case(Some("NaN"), None)]
    #[case(None, None)]
    fn test_coerce_f64(#[case] cell: Option<&str>, #[case] expected: Option<f64>) {
        assert_eq!(coerce_f64(cell), expected);
    }

    #[test]
    fn test_cell_trims_and_skips_empty() {
        let raw = RawTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![" x ".into(), "  ".into()]],
        );
        assert_eq!(raw.cell(0, 0), Some("x"));
        assert_eq!(raw.cell(0, 1), None);
        assert_eq!(raw.cell(1, 0), None);
    }
}
