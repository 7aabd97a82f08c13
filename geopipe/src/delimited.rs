//! Parsing delimited text (CSV and friends) into rows we can load.

use std::{collections::HashSet, fmt};

use crate::common::*;

/// Where column names come from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ColumnNames {
    /// The first record is a header row.
    #[default]
    Infer,
    /// Use these names. Every record in the file, including the first, is
    /// data.
    Explicit(Vec<String>),
}

impl ColumnNames {
    /// Explicit column names from anything string-like.
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnNames::Explicit(names.into_iter().map(Into::into).collect())
    }
}

/// The type we store a column as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Int64,
    Float64,
    Text,
}

impl ColumnType {
    /// Can every value in `values` be stored as this type?
    fn accepts<'a>(self, mut values: impl Iterator<Item = &'a str>) -> bool {
        match self {
            ColumnType::Int64 => values.all(|v| v.parse::<i64>().is_ok()),
            ColumnType::Float64 => values.all(is_float64),
            ColumnType::Text => true,
        }
    }
}

/// The largest integer magnitude an `f64` holds exactly.
const MAX_EXACT_FLOAT64_INT: u64 = 1 << 53;

/// Can PostgreSQL store `value` as `DOUBLE PRECISION` without losing anything?
///
/// Integers beyond 2^53 would be rounded, and values outside the range of an
/// `f64` are rejected by the server, so both stay text.
fn is_float64(value: &str) -> bool {
    let unsigned = value.trim_start_matches(['+', '-']);
    if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .is_ok_and(|i| i.unsigned_abs() <= MAX_EXACT_FLOAT64_INT);
    }
    let Ok(parsed) = value.parse::<f64>() else {
        return false;
    };
    if !parsed.is_finite() {
        return ["inf", "infinity", "nan"]
            .iter()
            .any(|lit| unsigned.eq_ignore_ascii_case(lit));
    }
    if parsed == 0.0 {
        // Tiny values underflow to zero.
        let mantissa = unsigned.split(['e', 'E']).next().unwrap_or(unsigned);
        return !mantissa.bytes().any(|b| (b'1'..=b'9').contains(&b));
    }
    true
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int64 => "int64".fmt(f),
            ColumnType::Float64 => "float64".fmt(f),
            ColumnType::Text => "text".fmt(f),
        }
    }
}

/// A named, typed column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
}

/// A table parsed from delimited text.
///
/// Every row has exactly one cell per column. Empty fields are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ParsedTable {
    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Write our rows as CSV with no header. Every field is quoted, so no
    /// line can be mistaken for the `\.` end-of-data marker. `None` becomes
    /// `""`, which `COPY ... CSV` loads as `NULL` under `FORCE_NULL`.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(vec![]);
        for row in &self.rows {
            wtr.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .context("could not write CSV row")?;
        }
        wtr.into_inner()
            .map_err(|err| format_err!("could not finish CSV output: {}", err))
    }
}

/// Options controlling how we parse delimited text.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub column_names: ColumnNames,
    /// The field separator, normally `b','`.
    pub delimiter: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            column_names: ColumnNames::Infer,
            delimiter: b',',
        }
    }
}

impl ParseOptions {
    /// Comma-separated, with the given column names.
    pub fn with_column_names(column_names: ColumnNames) -> Self {
        ParseOptions {
            column_names,
            ..Self::default()
        }
    }
}

/// Parse `data` into a table.
///
/// Records shorter than the header are padded with `NULL`s. Records longer
/// than the header are an error, as are duplicate column names.
#[instrument(level = "debug", skip(data, opt), fields(len = data.len()))]
pub fn parse_delimited(data: &[u8], opt: &ParseOptions) -> Result<ParsedTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(opt.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut records = rdr.records();

    let names = match &opt.column_names {
        ColumnNames::Explicit(names) => names.clone(),
        ColumnNames::Infer => match records.next() {
            Some(header) => header
                .context("could not parse header row")?
                .iter()
                .map(|name| name.trim().to_owned())
                .collect(),
            None => return Err(format_err!("no header row in empty input")),
        },
    };
    check_column_names(&names)?;

    let mut rows = vec![];
    for record in records {
        let record = record.context("could not parse delimited data")?;
        if record.len() > names.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(format_err!(
                "line {} has {} fields, but there are only {} columns",
                line,
                record.len(),
                names.len(),
            ));
        }
        let mut row = record
            .iter()
            .map(|cell| (!cell.is_empty()).then(|| cell.to_owned()))
            .collect::<Vec<_>>();
        row.resize(names.len(), None);
        rows.push(row);
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| Column {
            name,
            data_type: infer_column_type(rows.iter().filter_map(|r| r[idx].as_deref())),
        })
        .collect::<Vec<_>>();
    debug!("parsed {} rows with {} columns", rows.len(), columns.len());
    Ok(ParsedTable { columns, rows })
}

/// Column names must be non-empty and unique.
fn check_column_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(format_err!("need at least one column"));
    }
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(format_err!("column names may not be empty"));
        }
        if !seen.insert(name.as_str()) {
            return Err(format_err!("duplicate column name {:?}", name));
        }
    }
    Ok(())
}

/// Pick the narrowest type that can hold all of `values`.
fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: Iterator<Item = &'a str> + Clone,
{
    if values.clone().next().is_none() {
        return ColumnType::Text;
    }
    [ColumnType::Int64, ColumnType::Float64]
        .into_iter()
        .find(|ty| ty.accepts(values.clone()))
        .unwrap_or(ColumnType::Text)
}
