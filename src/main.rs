use clap::{ArgAction, Parser};
use is_terminal::IsTerminal;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use tracing::debug;

use csvf::interrupt::{install_handler, InterruptibleReader, EXIT_INTERRUPTED};
use csvf::logging::init_logging;
use csvf::{
    Dialect, FilterConfig, ProcessingError, Projection, RuleKind, RuleTable, StageContext,
    StageRegistry, StreamDriver,
};

#[derive(Parser)]
#[command(name = "csvf")]
#[command(about = "Cut fields from a CSV file, with possible edits")]
#[command(version)]
struct Args {
    /// The fields to print, numbered from 1 (default: all)
    #[arg(value_name = "FIELD", allow_negative_numbers = true)]
    fields: Vec<i64>,

    /// Printed for missing fields [default: -]
    #[arg(short = 'm', long = "missing-record-indicator", value_name = "MRI", allow_hyphen_values = true)]
    mri: Option<String>,

    /// Suppress output (stages still run)
    #[arg(short = 'n', long = "no-output")]
    no_output: bool,

    /// Debug: report errors in full and log what happens
    #[arg(short = 'D', long = "debugging")]
    debugging: bool,

    /// The CSV dialect for input and output
    #[arg(short = 'd', long = "dialect", value_name = "DIALECT", default_value = csvf::dialect::DEFAULT_DIALECT)]
    dialect: String,

    /// Force field FIELD to VALUE
    #[arg(
        short = 'c',
        long = "constant",
        num_args = 2,
        value_names = ["FIELD", "VALUE"],
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    constants: Vec<String>,

    /// Regex-substitute PATTERN with REPLACEMENT in field FIELD
    #[arg(
        short = 'e',
        long = "edit",
        num_args = 3,
        value_names = ["FIELD", "PATTERN", "REPLACEMENT"],
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    edits: Vec<String>,

    /// Replace field FIELD by REPLACEMENT if it is exactly STRING
    #[arg(
        short = 'r',
        long = "replacement",
        num_args = 3,
        value_names = ["FIELD", "STRING", "REPLACEMENT"],
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    replacements: Vec<String>,

    /// Stage to run on each row: a built-in name or a Starlark script
    #[arg(short = 'P', long = "processor-module", value_name = "MODULE", action = ArgAction::Append)]
    processors: Vec<String>,

    /// Argument passed to every stage's setup
    #[arg(
        short = 'A',
        long = "processor-argument",
        value_name = "ARGUMENT",
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    processor_arguments: Vec<String>,

    /// YAML file of rules, applied before rules given on the command line
    #[arg(long = "rules", value_name = "FILE")]
    rules_file: Option<PathBuf>,

    /// Input file (default: stdin)
    #[arg(short = 'i', long = "input")]
    input_file: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    output_file: Option<PathBuf>,
}

impl Args {
    fn rule_table(&self) -> anyhow::Result<RuleTable> {
        let mut rules = match &self.rules_file {
            Some(path) => RuleTable::from_yaml_file(path)?,
            None => RuleTable::new(),
        };
        if let Some(mri) = &self.mri {
            rules.mri = mri.clone();
        }
        rules.add_raw(RuleKind::Constant, &self.constants)?;
        rules.add_raw(RuleKind::Edit, &self.edits)?;
        rules.add_raw(RuleKind::Replacement, &self.replacements)?;
        Ok(rules)
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.debugging);

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            if args.debugging {
                eprintln!("csvf: {:?}", e);
            } else {
                eprintln!("csvf: {}", e);
            }
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ProcessingError>() {
        Some(e) if e.is_interrupt() => EXIT_INTERRUPTED,
        _ => 1,
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    // Everything that can be wrong with the configuration fails here,
    // before any stage is entered or any row read
    let rules = args.rule_table()?;
    let dialect = Dialect::named(&args.dialect)?;
    let config = FilterConfig {
        projection: Projection::from_field_numbers(&args.fields)?,
        output: !args.no_output,
    };
    let registry = StageRegistry::load_all(&args.processors)?;
    debug!(stages = ?registry.names(), dialect = dialect.name, "configuration loaded");

    let context = StageContext::new(args.processor_arguments.clone(), dialect);
    let mut driver = StreamDriver::new(config, rules, registry, context);

    let input: Box<dyn Read + Send> = match &args.input_file {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                anyhow::anyhow!("failed to open input file '{}': {}", path.display(), e)
            })?;
            Box::new(file)
        }
        None => {
            if io::stdin().is_terminal() {
                debug!("reading from stdin");
            }
            Box::new(io::stdin())
        }
    };
    let interrupt = install_handler()?;
    driver.set_interrupt(interrupt.clone());
    let input = InterruptibleReader::spawn(input, interrupt);

    let output: Box<dyn Write> = match &args.output_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                anyhow::anyhow!("failed to create output file '{}': {}", path.display(), e)
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    let stats = driver.process_stream(input, output)?;
    debug!(
        read = stats.records_read,
        dropped = stats.records_dropped,
        written = stats.records_written,
        "done"
    );
    Ok(())
}
