// src/pipeline/global_functions.rs
use crate::dialect::Dialect;
use starlark::starlark_module;
use starlark::values::list::ListRef;
use starlark::values::none::NoneType;
use starlark::values::{Heap, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};

/// Path that `write_csv` maps to standard output
pub const STDOUT_PATH: &str = "-";

/// CSV writers a script stage has opened, keyed by path. They stay open for
/// the life of the stage so repeated `write_csv` calls append.
#[derive(Default)]
pub(crate) struct SideWriters {
    writers: HashMap<String, csv::Writer<Box<dyn Write>>>,
}

impl SideWriters {
    fn writer(&mut self, path: &str, dialect: Dialect) -> io::Result<&mut csv::Writer<Box<dyn Write>>> {
        if !self.writers.contains_key(path) {
            let sink: Box<dyn Write> = if path == STDOUT_PATH {
                Box::new(io::stdout())
            } else {
                Box::new(File::create(path)?)
            };
            self.writers.insert(path.to_string(), dialect.writer(sink));
        }
        self.writers
            .get_mut(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    /// Flush and close every writer, reporting the first failure.
    pub(crate) fn close(&mut self) -> anyhow::Result<()> {
        let mut result = Ok(());
        for (path, mut writer) in self.writers.drain() {
            if let Err(e) = writer.flush() {
                if result.is_ok() {
                    result = Err(anyhow::anyhow!("cannot write '{}': {}", path, e));
                }
            }
        }
        result
    }
}

thread_local! {
    static ACTIVE_DIALECT: Cell<Option<Dialect>> = const { Cell::new(None) };
    static ACTIVE_WRITERS: RefCell<SideWriters> = RefCell::new(SideWriters::default());
}

/// Lends a stage's dialect and side writers to the builtins while one of
/// its hooks runs. Everything is handed back on drop.
pub(crate) struct HookScope<'a> {
    previous: Option<Dialect>,
    writers: &'a mut SideWriters,
}

impl<'a> HookScope<'a> {
    pub(crate) fn enter(dialect: Dialect, writers: &'a mut SideWriters) -> Self {
        let previous = ACTIVE_DIALECT.with(|cell| cell.replace(Some(dialect)));
        ACTIVE_WRITERS.with(|cell| std::mem::swap(&mut *cell.borrow_mut(), &mut *writers));
        HookScope { previous, writers }
    }
}

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        ACTIVE_WRITERS.with(|cell| std::mem::swap(&mut *cell.borrow_mut(), &mut *self.writers));
        ACTIVE_DIALECT.with(|cell| cell.set(self.previous));
    }
}

fn active_dialect() -> Dialect {
    ACTIVE_DIALECT.with(|cell| cell.get()).unwrap_or_default()
}

/// Text of a Starlark value as a CSV field
pub(crate) fn field_text(value: Value) -> String {
    if value.is_none() {
        String::new()
    } else if let Some(s) = value.unpack_str() {
        s.to_string()
    } else {
        value.to_string()
    }
}

#[starlark_module]
pub(crate) fn stage_functions(builder: &mut starlark::environment::GlobalsBuilder) {
    /// Read every row of a CSV file using the run's dialect
    fn read_csv<'v>(heap: &'v Heap, path: String) -> anyhow::Result<Value<'v>> {
        let mut reader = active_dialect()
            .reader_from_path(&path)
            .map_err(|e| anyhow::anyhow!("cannot open '{}': {}", path, e))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let fields: Vec<Value> = record.iter().map(|field| heap.alloc(field)).collect();
            rows.push(heap.alloc(fields));
        }
        Ok(heap.alloc(rows))
    }

    /// Append a list of rows to a CSV file (`-` for stdout) using the run's
    /// dialect. The file is created by the first call from a stage and
    /// closed when the stage exits.
    fn write_csv(path: String, rows: Value) -> anyhow::Result<NoneType> {
        let rows = ListRef::from_value(rows)
            .ok_or_else(|| anyhow::anyhow!("write_csv expects a list of rows"))?;
        let mut records = Vec::new();
        for row in rows.iter() {
            let fields = ListRef::from_value(row)
                .ok_or_else(|| anyhow::anyhow!("write_csv expects each row to be a list"))?;
            records.push(fields.iter().map(field_text).collect::<Vec<String>>());
        }

        let dialect = active_dialect();
        ACTIVE_WRITERS.with(|cell| -> anyhow::Result<()> {
            let mut writers = cell.borrow_mut();
            let writer = writers
                .writer(&path, dialect)
                .map_err(|e| anyhow::anyhow!("cannot create '{}': {}", path, e))?;
            for record in &records {
                writer.write_record(record)?;
            }
            if path == STDOUT_PATH {
                writer.flush()?;
            }
            Ok(())
        })?;
        Ok(NoneType)
    }

    fn log(message: String) -> anyhow::Result<NoneType> {
        tracing::info!(target: "csvf::script", "{}", message);
        Ok(NoneType)
    }
}
