// src/pipeline/processors.rs
use crate::error::{ConfigError, Failure};
use crate::pipeline::context::{ExitAction, Row, RowOutcome, StageContext};
use crate::pipeline::global_functions::{field_text, stage_functions, HookScope, SideWriters};
use crate::pipeline::stream::Stage;
use starlark::environment::{Globals, GlobalsBuilder, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::list::ListRef;
use starlark::values::Value;
use std::path::Path;

/// A stage written in Starlark.
///
/// The script is evaluated once when loaded. It must define
/// `process(row)` and may define `enter(*args)` and
/// `exit(kind, message, location)`. Top-level values live as long as the
/// stage, so `enter` can fill a table that `process` reads. Files opened
/// with `write_csv` stay open until the stage exits.
pub struct ScriptStage {
    name: String,
    module: Module,
    writers: SideWriters,
    // Kept alive for the functions the module defined against it
    _globals: Globals,
}

impl ScriptStage {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let script = std::fs::read_to_string(path).map_err(|e| ConfigError::StageLoad {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Self::from_script(&name, &script)
    }

    /// Create from script source
    pub fn from_script(name: &str, script: &str) -> Result<Self, ConfigError> {
        let load_error = |message: String| ConfigError::StageLoad {
            name: name.to_string(),
            message,
        };

        let dialect = Dialect {
            enable_f_strings: true,
            ..Dialect::Extended
        };
        let ast = AstModule::parse(name, script.to_string(), &dialect)
            .map_err(|e| load_error(format!("syntax error: {}", e)))?;

        let globals = GlobalsBuilder::standard().with(stage_functions).build();
        let module = Module::new();
        {
            let mut eval = Evaluator::new(&module);
            eval.eval_module(ast, &globals)
                .map_err(|e| load_error(format!("evaluation failed: {}", e)))?;
        }

        if module.get("process").is_none() {
            return Err(ConfigError::MissingProcess(name.to_string()));
        }

        Ok(ScriptStage {
            name: name.to_string(),
            module,
            writers: SideWriters::default(),
            _globals: globals,
        })
    }

    fn call_exit(&mut self, failure: Option<&Failure>, ctx: &StageContext) -> anyhow::Result<ExitAction> {
        let Some(exit) = self.module.get("exit") else {
            return Ok(ExitAction::Propagate);
        };
        let _scope = HookScope::enter(ctx.dialect(), &mut self.writers);

        let heap = self.module.heap();
        let args: Vec<Value> = match failure {
            Some(failure) => vec![
                heap.alloc(failure.kind.as_str()),
                heap.alloc(failure.message.as_str()),
                match &failure.location {
                    Some(location) => heap.alloc(location.as_str()),
                    None => Value::new_none(),
                },
            ],
            None => vec![Value::new_none(); 3],
        };

        let mut eval = Evaluator::new(&self.module);
        let result = eval
            .eval_function(exit, &args, &[])
            .map_err(|e| anyhow::anyhow!("exit() failed: {}", e))?;

        Ok(if result.to_bool() {
            ExitAction::Swallow
        } else {
            ExitAction::Propagate
        })
    }
}

impl Stage for ScriptStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, ctx: &StageContext) -> anyhow::Result<()> {
        let Some(enter) = self.module.get("enter") else {
            return Ok(());
        };
        let _scope = HookScope::enter(ctx.dialect(), &mut self.writers);

        let heap = self.module.heap();
        let args: Vec<Value> = ctx.args().iter().map(|arg| heap.alloc(arg.as_str())).collect();

        let mut eval = Evaluator::new(&self.module);
        eval.eval_function(enter, &args, &[])
            .map_err(|e| anyhow::anyhow!("enter() failed: {}", e))?;
        Ok(())
    }

    fn transform(&mut self, row: Row, ctx: &StageContext) -> anyhow::Result<RowOutcome> {
        let process = self
            .module
            .get("process")
            .ok_or_else(|| anyhow::anyhow!("process() is not defined"))?;
        let _scope = HookScope::enter(ctx.dialect(), &mut self.writers);

        let heap = self.module.heap();
        let fields: Vec<Value> = row.iter().map(|field| heap.alloc(field.as_str())).collect();
        let row_value = heap.alloc(fields);

        let mut eval = Evaluator::new(&self.module);
        let result = eval
            .eval_function(process, &[row_value], &[])
            .map_err(|e| anyhow::anyhow!("process() failed: {}", e))?;

        if result.is_none() {
            return Ok(RowOutcome::Drop);
        }
        let list = ListRef::from_value(result).ok_or_else(|| {
            anyhow::anyhow!(
                "process() must return a list or None, got {}",
                result.get_type()
            )
        })?;
        Ok(RowOutcome::Keep(list.iter().map(field_text).collect()))
    }

    fn exit(&mut self, failure: Option<&Failure>, ctx: &StageContext) -> anyhow::Result<ExitAction> {
        let action = self.call_exit(failure, ctx);
        let closed = self.writers.close();
        let action = action?;
        closed?;
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn ctx(args: &[&str]) -> StageContext {
        StageContext::new(args.iter().map(|s| s.to_string()).collect(), Default::default())
    }

    #[test]
    fn test_process_rewrites_and_drops() {
        let mut stage = ScriptStage::from_script(
            "upper",
            r#"
def process(row):
    if row and row[0] == "fish":
        return None
    return [f.upper() for f in row] + [len(row)]
"#,
        )
        .unwrap();
        let ctx = ctx(&[]);

        assert_eq!(
            stage.transform(row(&["a", "b"]), &ctx).unwrap(),
            RowOutcome::Keep(row(&["A", "B", "2"]))
        );
        assert_eq!(stage.transform(row(&["fish"]), &ctx).unwrap(), RowOutcome::Drop);
    }

    #[test]
    fn test_enter_fills_table_read_by_process() {
        let mut stage = ScriptStage::from_script(
            "table",
            r#"
table = {}

def enter(*args):
    for arg in args:
        old, new = arg.split("=")
        table[old] = new

def process(row):
    return [table.get(f, f) for f in row]
"#,
        )
        .unwrap();
        let ctx = ctx(&["a=1", "b=2"]);
        stage.enter(&ctx).unwrap();
        assert_eq!(
            stage.transform(row(&["a", "c", "b"]), &ctx).unwrap(),
            RowOutcome::Keep(row(&["1", "c", "2"]))
        );
    }

    #[test]
    fn test_exit_sees_failure_and_can_swallow() {
        let mut stage = ScriptStage::from_script(
            "swallow",
            r#"
def process(row):
    return row

def exit(kind, message, location):
    return kind == "TransformError"
"#,
        )
        .unwrap();
        let ctx = ctx(&[]);
        assert_eq!(stage.exit(None, &ctx).unwrap(), ExitAction::Propagate);

        let failure = Failure {
            kind: FailureKind::Transform,
            message: "bad".to_string(),
            location: Some("record 3".to_string()),
        };
        assert_eq!(stage.exit(Some(&failure), &ctx).unwrap(), ExitAction::Swallow);

        let failure = Failure {
            kind: FailureKind::Input,
            message: "bad".to_string(),
            location: None,
        };
        assert_eq!(stage.exit(Some(&failure), &ctx).unwrap(), ExitAction::Propagate);
    }

    #[test]
    fn test_optional_hooks_default_to_no_op() {
        let mut stage = ScriptStage::from_script("plain", "def process(row):\n    return row\n").unwrap();
        let ctx = ctx(&["ignored"]);
        stage.enter(&ctx).unwrap();
        assert_eq!(stage.exit(None, &ctx).unwrap(), ExitAction::Propagate);
    }

    #[test]
    fn test_load_errors() {
        let err = ScriptStage::from_script("nothing", "x = 1\n").err().unwrap();
        assert_eq!(err.to_string(), "stage 'nothing' does not define process(row)");

        let err = ScriptStage::from_script("broken", "def process(row)\n").err().unwrap();
        assert!(matches!(err, ConfigError::StageLoad { .. }));

        let err = ScriptStage::from_script("fails", "fail(\"nope\")\n").err().unwrap();
        assert!(err.to_string().contains("evaluation failed"));
    }

    #[test]
    fn test_hook_errors_are_reported() {
        let mut stage = ScriptStage::from_script(
            "bad",
            r#"
def enter(*args):
    fail("no setup")

def process(row):
    return "not a list"
"#,
        )
        .unwrap();
        let ctx = ctx(&[]);
        assert!(stage.enter(&ctx).unwrap_err().to_string().contains("enter() failed"));
        let err = stage.transform(row(&["a"]), &ctx).unwrap_err();
        assert!(err.to_string().contains("must return a list or None"));
    }

    #[test]
    fn test_csv_builtins_use_dialect() {
        let mut input = NamedTempFile::new().unwrap();
        write!(input, "k1\tv1\nk2\tv2\n").unwrap();
        let output = NamedTempFile::new().unwrap();

        let script = format!(
            r#"
rows = []

def enter():
    rows.extend(read_csv("{input}"))

def process(row):
    return row + [str(len(rows))]

def exit(kind, message, location):
    write_csv("{output}", rows)
"#,
            input = input.path().display(),
            output = output.path().display(),
        );
        let mut stage = ScriptStage::from_script("io", &script).unwrap();
        let ctx = StageContext::new(Vec::new(), crate::dialect::Dialect::named("excel-tab").unwrap());

        stage.enter(&ctx).unwrap();
        assert_eq!(
            stage.transform(row(&["x"]), &ctx).unwrap(),
            RowOutcome::Keep(row(&["x", "2"]))
        );
        stage.exit(None, &ctx).unwrap();
        assert_eq!(
            std::fs::read_to_string(output.path()).unwrap(),
            "k1\tv1\nk2\tv2\n"
        );
    }

    #[test]
    fn test_write_csv_appends_for_the_life_of_the_stage() {
        let output = NamedTempFile::new().unwrap();
        let script = format!(
            r#"
def enter():
    write_csv("{output}", [["header"]])

def process(row):
    write_csv("{output}", [row])
    return None
"#,
            output = output.path().display(),
        );
        let mut stage = ScriptStage::from_script("tee", &script).unwrap();
        let ctx = ctx(&[]);

        stage.enter(&ctx).unwrap();
        for value in ["a", "b", "c"] {
            assert_eq!(stage.transform(row(&[value, "x,y"]), &ctx).unwrap(), RowOutcome::Drop);
        }
        assert_eq!(stage.exit(None, &ctx).unwrap(), ExitAction::Propagate);
        assert_eq!(
            std::fs::read_to_string(output.path()).unwrap(),
            "header\na,\"x,y\"\nb,\"x,y\"\nc,\"x,y\"\n"
        );
    }

    #[test]
    fn test_write_csv_failure_is_reported() {
        let mut stage = ScriptStage::from_script(
            "nowhere",
            r#"
def process(row):
    write_csv("/nonexistent/dir/out.csv", [row])
    return row
"#,
        )
        .unwrap();
        let err = stage.transform(row(&["a"]), &ctx(&[])).unwrap_err();
        assert!(err.to_string().contains("process() failed"));
    }
}
