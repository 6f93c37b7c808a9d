use crate::network::{FetchError, FetchResult};

/// A CSV file loaded into memory with its header row.
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    pub(crate) fn parse(bytes: &[u8]) -> FetchResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        Ok(Self { headers, rows })
    }

    /// Position of a column, matched case-insensitively.
    pub(crate) fn column(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(wanted))
    }

    pub(crate) fn require(&self, name: &str) -> FetchResult<usize> {
        self.column(name)
            .ok_or_else(|| FetchError::Parse(format!("column '{name}' not found")))
    }

    pub(crate) fn rows(&self) -> &[csv::StringRecord] {
        &self.rows
    }
}

pub(crate) fn cell(row: &csv::StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| row.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Parse a count cell, coercing anything unusable to zero.
///
/// Thousands separators and a trailing ".0" from spreadsheet exports are
/// accepted.
pub(crate) fn coerce_count(value: Option<&str>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    let cleaned: String = value.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

    if let Ok(n) = cleaned.parse::<u64>() {
        return n;
    }
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => n.trunc() as u64,
        _ => 0,
    }
}
