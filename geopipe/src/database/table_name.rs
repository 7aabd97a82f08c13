//! Table names, with an optional schema (namespace).

use std::{fmt, str::FromStr};

use crate::common::*;

/// A table name, possibly qualified with a schema, as in `geo.addresses`.
///
/// Prints unquoted with `Display`; use [`TableName::quoted`] in SQL.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    /// Create a new table name.
    pub fn new<S, T>(schema: S, name: T) -> Self
    where
        S: Into<Option<String>>,
        T: Into<String>,
    {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// The schema portion of the name, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The base portion of the name, not including the schema.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properly quote this name for use in SQL.
    pub fn quoted(&self) -> TableNameQuoted<'_> {
        TableNameQuoted(self)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (Some(schema.to_owned()), name),
            None => (None, s),
        };
        if name.is_empty() || schema.as_deref() == Some("") || name.contains('.') {
            return Err(format_err!("cannot parse table name {:?}", s));
        }
        Ok(Self::new(schema, name))
    }
}

/// A quoted SQL identifier, with embedded `"` doubled.
pub(crate) struct Ident<'a>(pub(crate) &'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

/// A wrapper for `TableName` that quotes each part when displayed.
pub struct TableNameQuoted<'a>(&'a TableName);

impl fmt::Display for TableNameQuoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = self.0.schema() {
            write!(f, "{}.", Ident(schema))?;
        }
        write!(f, "{}", Ident(self.0.name()))
    }
}

#[test]
fn parses_plain_and_qualified_names() {
    let plain = "addresses".parse::<TableName>().unwrap();
    assert_eq!(plain.schema(), None);
    assert_eq!(plain.name(), "addresses");

    let qualified = "geo.addresses".parse::<TableName>().unwrap();
    assert_eq!(qualified.schema(), Some("geo"));
    assert_eq!(qualified.to_string(), "geo.addresses");

    for bad in ["", ".addresses", "geo.", "a.b.c"] {
        assert!(bad.parse::<TableName>().is_err(), "{:?}", bad);
    }
}

#[test]
fn names_are_quoted_for_sql() {
    let name = "geo.addresses".parse::<TableName>().unwrap();
    assert_eq!(name.quoted().to_string(), "\"geo\".\"addresses\"");

    let odd = TableName::new(None, "lat-\"lon");
    assert_eq!(odd.quoted().to_string(), "\"lat-\"\"lon\"");
}
