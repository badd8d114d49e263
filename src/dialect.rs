// src/dialect.rs
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const DEFAULT_DIALECT: &str = "excel";

/// Delimiter and quoting conventions shared by input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub delimiter: u8,
    pub quote: u8,
    /// Quote every field on output rather than only those that need it
    pub quote_all: bool,
}

static DIALECTS: Lazy<HashMap<&'static str, Dialect>> = Lazy::new(|| {
    let mut dialects = HashMap::new();
    dialects.insert(
        "excel",
        Dialect {
            name: "excel",
            delimiter: b',',
            quote: b'"',
            quote_all: false,
        },
    );
    dialects.insert(
        "excel-tab",
        Dialect {
            name: "excel-tab",
            delimiter: b'\t',
            quote: b'"',
            quote_all: false,
        },
    );
    dialects.insert(
        "unix",
        Dialect {
            name: "unix",
            delimiter: b',',
            quote: b'"',
            quote_all: true,
        },
    );
    dialects
});

impl Default for Dialect {
    fn default() -> Self {
        DIALECTS[DEFAULT_DIALECT]
    }
}

impl Dialect {
    /// Look up a dialect by name
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        DIALECTS
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownDialect(name.to_string()))
    }

    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<_> = DIALECTS.keys().copied().collect();
        names.sort();
        names
    }

    /// Headerless, flexible reader: every record is a data row and rows may
    /// differ in length.
    pub fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .from_reader(input)
    }

    pub fn writer<W: Write>(&self, output: W) -> csv::Writer<W> {
        let quote_style = if self.quote_all {
            csv::QuoteStyle::Always
        } else {
            csv::QuoteStyle::Necessary
        };
        csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .quote_style(quote_style)
            .from_writer(output)
    }

    pub fn reader_from_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<csv::Reader<File>> {
        Ok(self.reader(File::open(path)?))
    }

    pub fn writer_from_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<csv::Writer<File>> {
        Ok(self.writer(File::create(path)?))
    }
}
