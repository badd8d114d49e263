// src/pipeline/row.rs
use crate::error::ProcessingError;
use crate::pipeline::config::Projection;
use crate::pipeline::context::{Row, RowOutcome, StageContext};
use crate::pipeline::stream::Stage;
use crate::rules::RuleTable;

/// Run one row through every stage, then the constant, edit and
/// replacement rules, in that order.
///
/// The first stage that drops the row ends processing for it: later stages
/// and the rules never see it. `record` is the one-based input record
/// number, used only for error reporting.
pub fn rewrite_row(
    mut row: Row,
    record: usize,
    stages: &mut [Box<dyn Stage>],
    rules: &RuleTable,
    ctx: &StageContext,
) -> Result<RowOutcome, ProcessingError> {
    for stage in stages.iter_mut() {
        let outcome = match stage.transform(row, ctx) {
            Ok(outcome) => outcome,
            Err(source) => {
                return Err(ProcessingError::Transform {
                    stage: stage.name().to_string(),
                    record,
                    source,
                })
            }
        };
        match outcome {
            RowOutcome::Keep(next) => row = next,
            RowOutcome::Drop => return Ok(RowOutcome::Drop),
        }
    }

    apply_rules(&mut row, rules);
    Ok(RowOutcome::Keep(row))
}

/// Apply the field-editing rules in place. Rules aimed past the end of the
/// row do nothing; rows are never extended.
pub fn apply_rules(row: &mut [String], rules: &RuleTable) {
    for rule in &rules.constants {
        if let Some(field) = row.get_mut(rule.field) {
            field.clone_from(&rule.value);
        }
    }
    for rule in &rules.edits {
        if let Some(field) = row.get_mut(rule.field) {
            let edited = rule
                .pattern
                .replace_all(field.as_str(), rule.replacement.as_str())
                .into_owned();
            *field = edited;
        }
    }
    for rule in &rules.replacements {
        if let Some(field) = row.get_mut(rule.field) {
            if *field == rule.matches {
                field.clone_from(&rule.replacement);
            }
        }
    }
}

/// Pick the output fields. Indices past the end of the row become `mri`.
pub fn project<'a>(row: &'a [String], projection: &Projection, mri: &'a str) -> Vec<&'a str> {
    match projection {
        Projection::All => row.iter().map(String::as_str).collect(),
        Projection::Fields(fields) => fields
            .iter()
            .map(|&f| row.get(f).map_or(mri, String::as_str))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|s| s.to_string()).collect()
    }

    struct DropWhen(&'static str);

    impl Stage for DropWhen {
        fn name(&self) -> &str {
            "drop_when"
        }

        fn transform(&mut self, row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
            if row.first().map(String::as_str) == Some(self.0) {
                Ok(RowOutcome::Drop)
            } else {
                Ok(RowOutcome::Keep(row))
            }
        }
    }

    /// Appends a marker field so tests can see which stages ran
    struct Mark(&'static str);

    impl Stage for Mark {
        fn name(&self) -> &str {
            self.0
        }

        fn transform(&mut self, mut row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
            row.push(self.0.to_string());
            Ok(RowOutcome::Keep(row))
        }
    }

    struct Truncate(usize);

    impl Stage for Truncate {
        fn name(&self) -> &str {
            "truncate"
        }

        fn transform(&mut self, mut row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
            row.truncate(self.0);
            Ok(RowOutcome::Keep(row))
        }
    }

    struct Broken;

    impl Stage for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn transform(&mut self, _row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
            anyhow::bail!("no good")
        }
    }

    fn run(input: Row, stages: &mut [Box<dyn Stage>], rules: &RuleTable) -> RowOutcome {
        rewrite_row(input, 1, stages, rules, &StageContext::default()).unwrap()
    }

    #[test]
    fn test_identity_without_stages_or_rules() {
        let rules = RuleTable::new();
        for input in [row(&[]), row(&["a"]), row(&["a", "", "c,d"])] {
            assert_eq!(run(input.clone(), &mut [], &rules), RowOutcome::Keep(input));
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(Mark("first")), Box::new(Mark("second"))];
        let outcome = run(row(&["x"]), &mut stages, &RuleTable::new());
        assert_eq!(outcome, RowOutcome::Keep(row(&["x", "first", "second"])));
    }

    #[test]
    fn test_drop_skips_later_stages_and_rules() {
        let mut rules = RuleTable::new();
        rules.add_constant(1, "changed").unwrap();
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(DropWhen("fish")), Box::new(Broken)];

        // Broken would fail if it ever saw the row
        assert_eq!(run(row(&["fish", "2", "3"]), &mut stages, &rules), RowOutcome::Drop);
    }

    #[test]
    fn test_constant_is_visible_to_edit() {
        let mut rules = RuleTable::new();
        rules.add_constant(2, "X").unwrap();
        rules.add_edit(2, "X", "Y").unwrap();
        assert_eq!(run(row(&["a", "b"]), &mut [], &rules), RowOutcome::Keep(row(&["a", "Y"])));
    }

    #[test]
    fn test_edit_replaces_all_matches_with_groups() {
        let mut rules = RuleTable::new();
        rules.add_edit(1, r"(\d+)", r"<\1>").unwrap();
        assert_eq!(
            run(row(&["a1b22"]), &mut [], &rules),
            RowOutcome::Keep(row(&["a<1>b<22>"]))
        );
    }

    #[test]
    fn test_edit_sees_constant_then_replacement_sees_edit() {
        let mut rules = RuleTable::new();
        rules.add_constant(1, "abc").unwrap();
        rules.add_edit(1, "b", "").unwrap();
        rules.add_replacement(1, "ac", "done").unwrap();
        assert_eq!(run(row(&["zzz"]), &mut [], &rules), RowOutcome::Keep(row(&["done"])));
    }

    #[test]
    fn test_replacement_only_fires_on_exact_match() {
        let mut rules = RuleTable::new();
        rules.add_replacement(1, "yes", "no").unwrap();
        rules.add_replacement(1, "yes", "maybe").unwrap();
        assert_eq!(run(row(&["yes"]), &mut [], &rules), RowOutcome::Keep(row(&["no"])));
        assert_eq!(run(row(&["yess"]), &mut [], &rules), RowOutcome::Keep(row(&["yess"])));
    }

    #[test]
    fn test_rules_never_extend_rows() {
        let mut rules = RuleTable::new();
        rules.add_constant(1, "A").unwrap();
        rules.add_constant(3, "C").unwrap();
        rules.add_edit(5, ".*", "E").unwrap();
        rules.add_replacement(4, "", "R").unwrap();
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(Truncate(2))];
        assert_eq!(
            run(row(&["1", "2", "3", "4"]), &mut stages, &rules),
            RowOutcome::Keep(row(&["A", "2"]))
        );
    }

    #[test]
    fn test_stage_error_names_stage_and_record() {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(Mark("ok")), Box::new(Broken)];
        let err = rewrite_row(row(&["a"]), 7, &mut stages, &RuleTable::new(), &StageContext::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "stage 'broken' failed at record 7: no good");
    }

    #[test]
    fn test_projection_uses_mri_past_end() {
        let fields = row(&["1", "2"]);
        let projection = Projection::Fields(vec![0, 1, 2]);
        assert_eq!(project(&fields, &projection, "-"), vec!["1", "2", "-"]);

        let projection = Projection::Fields(vec![2, 0, 0]);
        assert_eq!(project(&fields, &projection, "N/A"), vec!["N/A", "1", "1"]);

        assert_eq!(project(&fields, &Projection::All, "-"), vec!["1", "2"]);
    }
}
