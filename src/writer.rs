//! NetCDF-4 serialization of a parsed file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use netcdf::AttributeValue;
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::header::Header;
use crate::literal::HeaderValue;
use crate::table::{Body, Cell, ColumnKind, Table};

// ─────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────
pub const INDEX_DIM:   &str = "Index";
pub const PARTIAL_EXT: &str = ".partial";
/// NetCDF's default double fill (`NC_FILL_DOUBLE`), written for null cells.
pub const FILL_F64:    f64  = 9.969_209_968_386_869e36;

/// Writes `header` as global attributes and every table as a group.
///
/// The container is built at a `.partial` sibling and renamed over `path`
/// only once complete; on failure the sibling is removed and `path` is left
/// untouched. `Body::Empty` yields an attributes-only file.
pub fn write_netcdf(path: &Path, header: &Header, body: &Body) -> Result<()> {
    let partial = partial_path(path);
    if let Err(err) = write_container(&partial, header, body) {
        // Best effort: the file may never have been created.
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    if let Err(err) = fs::rename(&partial, path) {
        let _ = fs::remove_file(&partial);
        return Err(ConvertError::io(path, err));
    }
    debug!(path = %path.display(), groups = body.tables().len(), "wrote netcdf");
    Ok(())
}

/// `dir/name.nc` → `dir/name.nc.partial`.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_EXT);
    PathBuf::from(name)
}

fn write_container(path: &Path, header: &Header, body: &Body) -> Result<()> {
    let mut nc = netcdf::create(path)?;

    for (name, value) in header.iter() {
        nc.add_attribute(&netcdf_name(name), attribute_value(value))?;
    }

    for table in body.tables() {
        write_group(&mut nc, table)?;
    }
    // Dropping the handle closes and flushes the file.
    drop(nc);
    Ok(())
}

fn write_group(nc: &mut netcdf::FileMut, table: &Table) -> Result<()> {
    let mut group = nc.add_group(&netcdf_name(&table.name))?;
    // A zero-length fixed dimension cannot be declared; unlimited starts at 0.
    if table.is_empty() {
        group.add_unlimited_dimension(INDEX_DIM)?;
    } else {
        group.add_dimension(INDEX_DIM, table.len())?;
    }

    for (index, field) in table.fields.iter().enumerate() {
        let name = netcdf_name(field);
        match table.column_kind(index) {
            ColumnKind::Int => {
                let values: Vec<i64> = table.column(index).filter_map(Cell::as_i64).collect();
                let mut v = group.add_variable::<i64>(&name, &[INDEX_DIM])?;
                v.put_values(&values, ..)?;
            }
            ColumnKind::Float => {
                let values: Vec<f64> = table
                    .column(index)
                    .map(|c| c.as_f64().unwrap_or(FILL_F64))
                    .collect();
                let mut v = group.add_variable::<f64>(&name, &[INDEX_DIM])?;
                v.set_fill_value(FILL_F64)?;
                if !values.is_empty() {
                    v.put_values(&values, ..)?;
                }
            }
        }
    }
    Ok(())
}

/// Maps a header value onto the closest NetCDF attribute type.
///
/// Homogeneous numeric or text sequences become arrays; empty, mixed and
/// nested sequences are stored as their literal text.
pub fn attribute_value(value: &HeaderValue) -> AttributeValue {
    match value {
        HeaderValue::Integer(i) => AttributeValue::Longlong(*i),
        HeaderValue::Float(x) => AttributeValue::Double(*x),
        HeaderValue::Text(s) => AttributeValue::Str(s.clone()),
        HeaderValue::Sequence(items) if items.is_empty() => AttributeValue::Str(value.to_string()),
        HeaderValue::Sequence(items) => {
            if let Some(ints) = items.iter().map(HeaderValue::as_integer).collect::<Option<Vec<_>>>() {
                return AttributeValue::Longlongs(ints);
            }
            let floats = items
                .iter()
                .map(|item| match item {
                    HeaderValue::Integer(i) => Some(*i as f64),
                    HeaderValue::Float(x) => Some(*x),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>();
            if let Some(floats) = floats {
                return AttributeValue::Doubles(floats);
            }
            let texts = items
                .iter()
                .map(|item| item.as_text().map(str::to_string))
                .collect::<Option<Vec<_>>>();
            match texts {
                Some(texts) => AttributeValue::Strs(texts),
                None => AttributeValue::Str(value.to_string()),
            }
        }
    }
}

/// NetCDF names may not contain `/`.
pub fn netcdf_name(name: &str) -> String {
    name.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::decode;

    #[test]
    fn scalar_attributes() {
        assert!(matches!(attribute_value(&decode("3")), AttributeValue::Longlong(3)));
        assert!(matches!(attribute_value(&decode("2.5")), AttributeValue::Double(x) if x == 2.5));
        assert!(matches!(attribute_value(&decode("'abc'")), AttributeValue::Str(s) if s == "abc"));
    }

    #[test]
    fn sequence_attributes() {
        assert!(matches!(
            attribute_value(&decode("{1, 2}")),
            AttributeValue::Longlongs(v) if v == [1, 2]
        ));
        assert!(matches!(
            attribute_value(&decode("[1, 2.5]")),
            AttributeValue::Doubles(v) if v == [1.0, 2.5]
        ));
        assert!(matches!(
            attribute_value(&decode("{\"b\", \"a\"}")),
            AttributeValue::Strs(v) if v == ["b", "a"]
        ));
    }

    #[test]
    fn irregular_sequences_become_text() {
        assert!(matches!(
            attribute_value(&decode("[1, 'a']")),
            AttributeValue::Str(s) if s == "[1, \"a\"]"
        ));
        assert!(matches!(
            attribute_value(&decode("[[1], [2]]")),
            AttributeValue::Str(s) if s == "[[1], [2]]"
        ));
        assert!(matches!(
            attribute_value(&decode("()")),
            AttributeValue::Str(s) if s == "[]"
        ));
    }

    #[test]
    fn partial_file_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("L2/nc/podTec.nc")),
            PathBuf::from("L2/nc/podTec.nc.partial")
        );
    }

    #[test]
    fn slashes_are_replaced_in_names() {
        assert_eq!(netcdf_name("a/b"), "a_b");
        assert_eq!(netcdf_name("Fields(1)"), "Fields(1)");
    }
}
