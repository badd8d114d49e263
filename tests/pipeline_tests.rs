// tests/pipeline_tests.rs
use csvf::{
    Dialect, DriverState, FilterConfig, ProcessingError, Projection, RuleTable, ScriptStage,
    StageContext, StageRegistry, StreamDriver,
};
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn run(driver: &mut StreamDriver, input: &str) -> (Result<csvf::ProcessingStats, ProcessingError>, String) {
    let mut output = Vec::new();
    let result = driver.process_stream(Cursor::new(input.to_string()), &mut output);
    (result, String::from_utf8(output).unwrap())
}

#[test]
fn test_builtin_stages_with_rules_and_projection() {
    let config = FilterConfig {
        projection: Projection::from_field_numbers(&[2, 1, 5]).unwrap(),
        ..FilterConfig::default()
    };
    let mut rules = RuleTable::new().with_mri("?");
    rules.add_constant(1, "X").unwrap();
    rules.add_edit(1, "X", "Y").unwrap();
    rules.add_replacement(2, "b", "B").unwrap();

    let registry = StageRegistry::load_all(["antifish"]).unwrap();
    let mut driver = StreamDriver::new(config, rules, registry, StageContext::default());

    let (result, output) = run(&mut driver, "a,b\nfish,b\nc,d,e\n");
    let stats = result.unwrap();

    assert_eq!(output, "B,Y,?\nd,Y,?\n");
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.records_dropped, 1);
    assert_eq!(stats.records_written, 2);
    assert_eq!(driver.state(), DriverState::Completed);
}

#[test]
fn test_script_stage_sees_rows_before_rules() {
    let stage = ScriptStage::from_script(
        "tagger",
        r#"
def process(row):
    return row + ["from-script"]
"#,
    )
    .unwrap();

    let mut rules = RuleTable::new();
    rules.add_replacement(3, "from-script", "rewritten").unwrap();

    let mut registry = StageRegistry::new();
    registry.register(Box::new(stage));
    let mut driver = StreamDriver::new(FilterConfig::default(), rules, registry, StageContext::default());

    let (result, output) = run(&mut driver, "a,b\n");
    result.unwrap();
    assert_eq!(output, "a,b,rewritten\n");
}

#[test]
fn test_script_stage_state_spans_the_stream() {
    let stage = ScriptStage::from_script(
        "numbered",
        r#"
state = {"count": 0}

def enter(start):
    state["count"] = int(start)

def process(row):
    state["count"] += 1
    return [str(state["count"])] + row
"#,
    )
    .unwrap();

    let mut registry = StageRegistry::new();
    registry.register(Box::new(stage));
    let context = StageContext::new(vec!["10".to_string()], Dialect::default());
    let mut driver = StreamDriver::new(FilterConfig::default(), RuleTable::new(), registry, context);

    let (result, output) = run(&mut driver, "a\nb\nc\n");
    result.unwrap();
    assert_eq!(output, "11,a\n12,b\n13,c\n");
}

#[test]
fn test_tab_dialect_round_trip() {
    let context = StageContext::new(Vec::new(), Dialect::named("excel-tab").unwrap());
    let mut driver = StreamDriver::new(
        FilterConfig::default(),
        RuleTable::new(),
        StageRegistry::new(),
        context,
    );

    let (result, output) = run(&mut driver, "a\tb c\n\"x\ty\"\tz\n");
    result.unwrap();
    assert_eq!(output, "a\tb c\n\"x\ty\"\tz\n");
}

#[test]
fn test_interrupt_fails_with_interrupted() {
    let stage = ScriptStage::from_script(
        "observer",
        r#"
def process(row):
    return row

def exit(kind, message, location):
    if kind != "Interrupted":
        fail("expected an interrupt, got " + str(kind))
"#,
    )
    .unwrap();

    let mut registry = StageRegistry::new();
    registry.register(Box::new(stage));
    let mut driver = StreamDriver::new(
        FilterConfig::default(),
        RuleTable::new(),
        registry,
        StageContext::default(),
    );
    driver.set_interrupt(Arc::new(AtomicBool::new(true)));

    let (result, output) = run(&mut driver, "a\n");
    let err = result.unwrap_err();
    assert!(err.is_interrupt());
    assert_eq!(output, "");
    assert_eq!(driver.state(), DriverState::Failed);
}
