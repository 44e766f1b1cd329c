//! Header parsing and transparent gzip opening of source files.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::LazyLock,
};

use flate2::read::MultiGzDecoder;
use regex::Regex;
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::literal::{decode, HeaderValue};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<field>\S+)\s+=\s+(?P<value>.+)").expect("static header regex")
});

/// Header fields in first-appearance order.
///
/// A repeated field overwrites the earlier value but keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: HeaderValue) {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Opens `path` for line reading, decompressing when the content is gzip.
///
/// Compression is sniffed from the magic bytes, not the file name.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader
        .fill_buf()
        .map_err(|e| ConvertError::io(path, e))?
        .starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Scans every line for `<field> = <value>` and decodes the values.
///
/// Returns the header and the body offset: the index of the line after the
/// *last* header-shaped line, wherever it occurs in the stream.
pub fn parse_header<R: BufRead>(reader: R) -> Result<(Header, usize)> {
    let mut header = Header::new();
    let mut body_offset = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(caps) = HEADER_LINE.captures(&line) {
            header.insert(&caps["field"], decode(&caps["value"]));
            body_offset = Some(index + 1);
        }
    }

    let body_offset =
        body_offset.ok_or_else(|| ConvertError::schema("no `<field> = <value>` header lines"))?;
    debug!(fields = header.len(), body_offset, "parsed header");
    Ok((header, body_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::{write::GzEncoder, Compression};

    const SAMPLE: &str = "\
Title = \"COSMIC podTec\"
DataTypeName = {\"posVel\", \"clock\"}
DataTypeID = {1, 2}
Fields(1) = {\"x\", \"y\", \"z\"}
Fields(2) = {\"bias\"}
1\t10\t20\t30
2\t0.5
";

    #[test]
    fn parses_fields_and_offset() {
        let (header, offset) = parse_header(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(header.len(), 5);
        assert_eq!(
            header.get("Title"),
            Some(&HeaderValue::Text("COSMIC podTec".into()))
        );
        assert_eq!(
            header.get("DataTypeID"),
            Some(&HeaderValue::Sequence(vec![
                HeaderValue::Integer(1),
                HeaderValue::Integer(2)
            ]))
        );
    }

    #[test]
    fn offset_follows_last_header_line() {
        let text = "a = 1\nnot a header\nb = 2\n1\t2\n";
        let (header, offset) = parse_header(Cursor::new(text)).unwrap();
        assert_eq!(offset, 3);
        assert_eq!(header.get("b"), Some(&HeaderValue::Integer(2)));
    }

    #[test]
    fn repeated_field_overwrites_in_place() {
        let text = "a = 1\nb = 2\na = 3\n";
        let (header, _) = parse_header(Cursor::new(text)).unwrap();
        let order: Vec<_> = header.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ["a", "b"]);
        assert_eq!(header.get("a"), Some(&HeaderValue::Integer(3)));
    }

    #[test]
    fn requires_spaces_around_equals() {
        let text = "a=1\nb = 2\n";
        let (header, offset) = parse_header(Cursor::new(text)).unwrap();
        assert!(header.get("a").is_none());
        assert_eq!(offset, 2);
    }

    #[test]
    fn no_header_lines_is_a_schema_error() {
        let err = parse_header(Cursor::new("1\t2\t3\n")).unwrap_err();
        assert!(matches!(err, ConvertError::Schema { .. }));
    }

    #[test]
    fn opens_gzip_and_plain_sources() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        std::fs::write(&plain, SAMPLE).unwrap();

        let gz = dir.path().join("a.txt.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(SAMPLE.as_bytes()).unwrap();
        enc.finish().unwrap();

        let (from_plain, _) = parse_header(open_source(&plain).unwrap()).unwrap();
        let (from_gz, _) = parse_header(open_source(&gz).unwrap()).unwrap();
        assert_eq!(from_plain, from_gz);
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let err = open_source(Path::new("/nonexistent/file.txt.gz")).err().unwrap();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}
