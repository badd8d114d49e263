// src/rules.rs
use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_MRI: &str = "-";

/// Force a field to a fixed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantRule {
    pub field: usize,
    pub value: String,
}

/// Regex substitution (replace-all) on a field.
#[derive(Debug, Clone)]
pub struct EditRule {
    pub field: usize,
    pub pattern: Regex,
    /// Already in `regex` expansion syntax, see [`expansion_template`]
    pub replacement: String,
}

/// Exact-match substitution on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRule {
    pub field: usize,
    pub matches: String,
    pub replacement: String,
}

/// Parsed, validated field-editing rules plus the missing record indicator.
///
/// Built once before the run and only read afterwards.
#[derive(Debug, Clone)]
pub struct RuleTable {
    pub constants: Vec<ConstantRule>,
    pub edits: Vec<EditRule>,
    pub replacements: Vec<ReplacementRule>,
    pub mri: String,
}

impl Default for RuleTable {
    fn default() -> Self {
        RuleTable {
            constants: Vec::new(),
            edits: Vec::new(),
            replacements: Vec::new(),
            mri: DEFAULT_MRI.to_string(),
        }
    }
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.edits.is_empty() && self.replacements.is_empty()
    }

    pub fn with_mri(mut self, mri: impl Into<String>) -> Self {
        self.mri = mri.into();
        self
    }

    pub fn add_constant(&mut self, field: i64, value: &str) -> Result<(), ConfigError> {
        let field = zero_based("constant", field)?;
        self.constants.push(ConstantRule {
            field,
            value: value.to_string(),
        });
        Ok(())
    }

    /// The pattern is compiled here so a bad one fails configuration, not
    /// the first row that reaches it.
    pub fn add_edit(&mut self, field: i64, pattern: &str, replacement: &str) -> Result<(), ConfigError> {
        let index = zero_based("edit", field)?;
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            field,
            pattern: pattern.to_string(),
            source,
        })?;
        let expansion = expansion_template(replacement, &pattern).map_err(|message| {
            ConfigError::Template {
                field,
                template: replacement.to_string(),
                message,
            }
        })?;
        self.edits.push(EditRule {
            field: index,
            pattern,
            replacement: expansion,
        });
        Ok(())
    }

    pub fn add_replacement(&mut self, field: i64, matches: &str, replacement: &str) -> Result<(), ConfigError> {
        let field = zero_based("replacement", field)?;
        self.replacements.push(ReplacementRule {
            field,
            matches: matches.to_string(),
            replacement: replacement.to_string(),
        });
        Ok(())
    }

    /// Add rules from flat command line values, `per_rule` values per rule.
    pub fn add_raw(&mut self, kind: RuleKind, values: &[String]) -> Result<(), ConfigError> {
        let per_rule = kind.arity();
        if values.len() % per_rule != 0 {
            return Err(ConfigError::Arity {
                kind: kind.name(),
                expected: per_rule,
                got: values.len(),
            });
        }
        for chunk in values.chunks_exact(per_rule) {
            let field = parse_field_number(kind.name(), &chunk[0])?;
            match kind {
                RuleKind::Constant => self.add_constant(field, &chunk[1])?,
                RuleKind::Edit => self.add_edit(field, &chunk[1], &chunk[2])?,
                RuleKind::Replacement => self.add_replacement(field, &chunk[1], &chunk[2])?,
            }
        }
        Ok(())
    }

    /// Load rules from a YAML file. Rules in the file come first; callers
    /// append command line rules afterwards.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            ConfigError::RulesFormat { source, .. } => ConfigError::RulesFormat {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let file: RulesFile = serde_yaml::from_str(text).map_err(|source| ConfigError::RulesFormat {
            path: "<string>".to_string(),
            source,
        })?;

        let mut table = RuleTable::new();
        if let Some(mri) = file.missing {
            table.mri = mri;
        }
        for rule in &file.constants {
            table.add_constant(rule.field, &rule.value)?;
        }
        for rule in &file.edits {
            table.add_edit(rule.field, &rule.pattern, &rule.replacement)?;
        }
        for rule in &file.replacements {
            table.add_replacement(rule.field, &rule.matches, &rule.replacement)?;
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Constant,
    Edit,
    Replacement,
}

impl RuleKind {
    pub fn arity(&self) -> usize {
        match self {
            RuleKind::Constant => 2,
            RuleKind::Edit | RuleKind::Replacement => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Constant => "constant",
            RuleKind::Edit => "edit",
            RuleKind::Replacement => "replacement",
        }
    }
}

/// Parse a user-facing (one-based) field number.
pub fn parse_field_number(kind: &'static str, text: &str) -> Result<i64, ConfigError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::BadFieldNumber {
            kind,
            value: text.to_string(),
        })
}

/// Convert a one-based field number to a zero-based index.
pub fn zero_based(kind: &'static str, field: i64) -> Result<usize, ConfigError> {
    if field < 1 {
        return Err(ConfigError::NonPositiveField { kind, value: field });
    }
    Ok((field - 1) as usize)
}

/// Convert an edit replacement into `regex` expansion syntax.
///
/// Replacements are written with backslash references: `\1` or `\g<1>` for
/// a numbered group, `\g<name>` for a named one, `\n`, `\t` and friends for
/// control characters, `\\` for a backslash and `\0`/`\NNN` for octal
/// escapes. `$` has no special meaning. References to groups the pattern
/// does not have are rejected here rather than expanding to nothing.
pub fn expansion_template(template: &str, pattern: &Regex) -> Result<String, String> {
    let groups = pattern.captures_len();
    let group_number = |digits: &str| -> Result<String, String> {
        match digits.parse::<usize>() {
            Ok(n) if n < groups => Ok(format!("${{{}}}", n)),
            _ => Err(format!("invalid group reference {}", digits)),
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            push_literal(&mut out, c);
            continue;
        }
        let Some(escape) = chars.next() else {
            return Err("bad escape (end of template)".to_string());
        };
        match escape {
            'g' => {
                if chars.next() != Some('<') {
                    return Err("missing < after \\g".to_string());
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(ch) => name.push(ch),
                        None => return Err("missing >, unterminated name".to_string()),
                    }
                }
                if name.is_empty() {
                    return Err("missing group name".to_string());
                }
                if name.bytes().all(|b| b.is_ascii_digit()) {
                    out.push_str(&group_number(&name)?);
                } else if pattern.capture_names().flatten().any(|g| g == name) {
                    out.push_str(&format!("${{{}}}", name));
                } else {
                    return Err(format!("unknown group name '{}'", name));
                }
            }
            '0' => {
                let mut value = 0;
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                push_octal(&mut out, value)?;
            }
            '1'..='9' => {
                let mut digits = escape.to_string();
                if let Some(&second) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    chars.next();
                    digits.push(second);
                    let third = chars.peek().copied().filter(|d| d.is_digit(8));
                    if let (true, true, Some(third)) = (escape.is_digit(8), second.is_digit(8), third) {
                        chars.next();
                        digits.push(third);
                        let value = u32::from_str_radix(&digits, 8)
                            .map_err(|_| format!("bad octal escape \\{}", digits))?;
                        push_octal(&mut out, value)?;
                        continue;
                    }
                }
                out.push_str(&group_number(&digits)?);
            }
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{b}'),
            '\\' => out.push('\\'),
            other if other.is_ascii_alphabetic() => {
                return Err(format!("bad escape \\{}", other));
            }
            // Anything else keeps its backslash
            other => {
                out.push('\\');
                push_literal(&mut out, other);
            }
        }
    }
    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '$' {
        out.push_str("$$");
    } else {
        out.push(c);
    }
}

fn push_octal(out: &mut String, value: u32) -> Result<(), String> {
    match char::from_u32(value) {
        Some(c) if value <= 0o377 => {
            push_literal(out, c);
            Ok(())
        }
        _ => Err(format!("octal escape value \\{:o} outside of range 0-0o377", value)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    missing: Option<String>,
    #[serde(default)]
    constants: Vec<ConstantEntry>,
    #[serde(default)]
    edits: Vec<EditEntry>,
    #[serde(default)]
    replacements: Vec<ReplacementEntry>,
}

#[derive(Debug, Deserialize)]
struct ConstantEntry {
    field: i64,
    value: String,
}

#[derive(Debug, Deserialize)]
struct EditEntry {
    field: i64,
    pattern: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
struct ReplacementEntry {
    field: i64,
    #[serde(rename = "match")]
    matches: String,
    replacement: String,
}
