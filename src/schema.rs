//! Record-type directory reconstructed from the header.

use std::collections::HashSet;

use crate::error::{ConvertError, Result};
use crate::header::Header;
use crate::literal::HeaderValue;

pub const TYPE_NAMES_KEY: &str = "DataTypeName";
pub const TYPE_IDS_KEY: &str = "DataTypeID";

/// One declared record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    pub name: String,
    pub id: i64,
    pub fields: Vec<String>,
}

/// Declared record types in `DataTypeName` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDirectory {
    types: Vec<TypeSchema>,
}

impl TypeDirectory {
    pub fn iter(&self) -> std::slice::Iter<'_, TypeSchema> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn first(&self) -> Option<&TypeSchema> {
        self.types.first()
    }

    /// Position of the type with discriminant `id`.
    pub fn position_of(&self, id: i64) -> Option<usize> {
        self.types.iter().position(|t| t.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeSchema> {
        self.types.iter().find(|t| t.name == name)
    }
}

impl<'a> IntoIterator for &'a TypeDirectory {
    type Item = &'a TypeSchema;
    type IntoIter = std::slice::Iter<'a, TypeSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.iter()
    }
}

/// Key holding the ordered field names of type `id`.
pub fn fields_key(id: i64) -> String {
    format!("Fields({id})")
}

/// Builds the directory from `DataTypeName`, `DataTypeID` and `Fields(<id>)`.
pub fn build_directory(header: &Header) -> Result<TypeDirectory> {
    let names = require(header, TYPE_NAMES_KEY)?.elements();
    let ids = require(header, TYPE_IDS_KEY)?.elements();
    if names.len() != ids.len() {
        return Err(ConvertError::schema(format!(
            "{TYPE_NAMES_KEY} has {} entries but {TYPE_IDS_KEY} has {}",
            names.len(),
            ids.len()
        )));
    }

    let mut seen_names = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut types = Vec::with_capacity(names.len());

    for (i, (name, id)) in names.iter().zip(ids).enumerate() {
        let name = name.as_text().ok_or_else(|| {
            ConvertError::schema(format!("{TYPE_NAMES_KEY}[{i}] is not text: {name}"))
        })?;
        let id = id.as_integer().ok_or_else(|| {
            ConvertError::schema(format!("{TYPE_IDS_KEY}[{i}] is not an integer: {id}"))
        })?;
        if !seen_names.insert(name) {
            return Err(ConvertError::schema(format!("duplicate type name {name:?}")));
        }
        if !seen_ids.insert(id) {
            return Err(ConvertError::schema(format!("duplicate type id {id}")));
        }

        let key = fields_key(id);
        let fields = require(header, &key)?
            .elements()
            .iter()
            .map(|field| {
                field
                    .as_text()
                    .map(str::to_string)
                    .ok_or_else(|| ConvertError::schema(format!("{key} entry is not text: {field}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if fields.is_empty() {
            return Err(ConvertError::schema(format!("{key} declares no fields")));
        }
        let mut seen_fields = HashSet::new();
        if let Some(dup) = fields.iter().find(|f| !seen_fields.insert(f.as_str())) {
            return Err(ConvertError::schema(format!("{key} repeats field {dup:?}")));
        }

        types.push(TypeSchema {
            name: name.to_string(),
            id,
            fields,
        });
    }

    if types.is_empty() {
        return Err(ConvertError::schema("no record types declared"));
    }
    Ok(TypeDirectory { types })
}

fn require<'h>(header: &'h Header, key: &str) -> Result<&'h HeaderValue> {
    header
        .get(key)
        .ok_or_else(|| ConvertError::schema(format!("missing header key {key}")))
}
