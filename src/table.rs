//! Demultiplexing of the tab-separated body into per-type tables.

use std::io::BufRead;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::schema::{TypeDirectory, TypeSchema};

/// Body value that marks a missing measurement.
pub const MISSING_SENTINEL: f64 = -9_999.0;

const NA_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "-nan", "null", "NULL"];

/// One body cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Null,
}

impl Cell {
    /// Parses a trimmed body cell; `None` when the text is not numeric.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || NA_TOKENS.contains(&text) {
            return Some(Self::Null);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(if i as f64 == MISSING_SENTINEL {
                Self::Null
            } else {
                Self::Int(i)
            });
        }
        let x = text.parse::<f64>().ok()?;
        Some(if x.is_nan() || x == MISSING_SENTINEL {
            Self::Null
        } else {
            Self::Float(x)
        })
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(i as f64),
            Self::Float(x) => Some(x),
            Self::Null => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Storage kind of a column once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
}

/// Rows of one record type, aligned to its field list.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(schema: &TypeSchema) -> Self {
        Self {
            name: schema.name.clone(),
            fields: schema.fields.clone(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = Cell> + '_ {
        self.rows.iter().map(move |row| row[index])
    }

    /// `Int` only when the table has rows and every cell of the column is
    /// an integer; a single null promotes the column to `Float`.
    pub fn column_kind(&self, index: usize) -> ColumnKind {
        if !self.is_empty() && self.column(index).all(|c| matches!(c, Cell::Int(_))) {
            ColumnKind::Int
        } else {
            ColumnKind::Float
        }
    }
}

/// Result of splitting a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// The file had no body rows at all.
    Empty,
    /// One table per declared type, in directory order.
    Tables(Vec<Table>),
}

impl Body {
    pub fn tables(&self) -> &[Table] {
        match self {
            Self::Empty => &[],
            Self::Tables(tables) => tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables().iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Splits the body that starts `body_offset` lines into `reader`.
///
/// The physical layout is the discriminant plus the fields of the first
/// declared type; every row must fit it. Rows whose discriminant matches no
/// declared id are dropped.
pub fn split<R: BufRead>(mut reader: R, directory: &TypeDirectory, body_offset: usize) -> Result<Body> {
    let first = directory
        .first()
        .ok_or_else(|| ConvertError::schema("no record types declared"))?;
    let layout_width = 1 + first.fields.len();

    let mut skipped = Vec::new();
    for _ in 0..body_offset {
        skipped.clear();
        if reader.read_until(b'\n', &mut skipped)? == 0 {
            break;
        }
    }

    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut tables: Vec<Table> = directory.iter().map(Table::new).collect();
    let mut record = StringRecord::new();
    let mut total_rows = 0usize;
    let mut dropped = 0usize;

    while rdr.read_record(&mut record)? {
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = body_offset as u64 + record.position().map_or(0, |p| p.line());
        total_rows += 1;

        if record.len() > layout_width {
            return Err(ConvertError::malformed(
                line,
                format!("{} columns, layout has {layout_width}", record.len()),
            ));
        }
        let discriminant = parse_discriminant(&record[0]).ok_or_else(|| {
            ConvertError::malformed(line, format!("bad discriminant {:?}", &record[0]))
        })?;
        let Some(slot) = directory.position_of(discriminant) else {
            dropped += 1;
            continue;
        };

        let table = &mut tables[slot];
        let width = table.fields.len();
        let mut row = Vec::with_capacity(width);
        for (column, text) in record.iter().enumerate().skip(1) {
            let cell = Cell::parse(text).ok_or_else(|| {
                ConvertError::malformed(line, format!("column {}: not numeric: {text:?}", column + 1))
            })?;
            if column <= width {
                row.push(cell);
            } else if !cell.is_null() {
                return Err(ConvertError::malformed(
                    line,
                    format!("column {}: beyond the {width} fields of {}", column + 1, table.name),
                ));
            }
        }
        row.resize(width, Cell::Null);
        table.rows.push(row);
    }

    if total_rows == 0 {
        debug!("body has no rows");
        return Ok(Body::Empty);
    }
    if dropped > 0 {
        debug!(dropped, "dropped rows with undeclared discriminants");
    }
    debug!(rows = total_rows, types = tables.len(), "split body");
    Ok(Body::Tables(tables))
}

fn parse_discriminant(text: &str) -> Option<i64> {
    if let Ok(id) = text.parse::<i64>() {
        return Some(id);
    }
    let x = text.parse::<f64>().ok()?;
    (x.is_finite() && x.fract() == 0.0).then_some(x as i64)
}
