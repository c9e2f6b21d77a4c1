//! Core types for declarative property convergence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Output;

/// A normalized property value
///
/// Both desired values (from configuration) and current values (from a
/// snapshot) are stored in this form, so equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    /// One of a closed set of lowercase symbols
    Sym(String),
    /// Sub-namespace mapping; a `None` entry means "unset this key"
    Map(BTreeMap<String, Option<String>>),
}

impl Value {
    /// Render a scalar value in wire form.
    ///
    /// Maps have no single wire form; their keys are rendered one by one.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) | Self::Sym(s) => s.clone(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.as_deref().unwrap_or("")))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Borrow the mapping of a namespace value
    pub fn as_map(&self) -> Option<&BTreeMap<String, Option<String>>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the text of a string or symbol value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Raw, uncoerced input for a property
///
/// Configuration files and daemon output both arrive in this shape before
/// the property table normalizes them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<RawValue>),
    Table(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Render a scalar as text; lists are joined with `,`
    pub fn to_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::List(items) => items
                .iter()
                .map(Self::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Self::Table(table) => table
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.to_text()))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Feed a normalized value back through coercion
impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::Int(i),
            Value::Str(s) | Value::Sym(s) => Self::Str(s),
            Value::Map(map) => Self::Table(
                map.into_iter()
                    .map(|(k, v)| (k, Self::Str(v.unwrap_or_default())))
                    .collect(),
            ),
        }
    }
}

/// A single `key = value` assignment in wire form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub key: String,
    pub value: String,
    /// Masked in every printable form
    #[serde(default)]
    pub sensitive: bool,
}

impl Assignment {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            sensitive: false,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            sensitive: true,
        }
    }

    /// Value as it may be shown to a user
    pub fn display_value(&self) -> &str {
        if self.sensitive { "********" } else { &self.value }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.display_value())
    }
}

/// One mutating step needed to converge an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Create the entity with its initial properties in a single call
    Create { initial: Vec<Assignment> },
    /// Set one property on an existing entity
    Set(Assignment),
    /// Clear one property on an existing entity
    Unset { key: String },
    /// Remove the entity
    Delete,
    /// Replace a whole document (used where field-level diffing is not possible)
    Replace {
        target: String,
        previous: String,
        content: String,
    },
}

impl Change {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set(Assignment::new(key, value))
    }

    pub fn unset(key: impl Into<String>) -> Self {
        Self::Unset { key: key.into() }
    }

    /// Short verb used in progress output
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Set(_) => "set",
            Self::Unset { .. } => "unset",
            Self::Delete => "delete",
            Self::Replace { .. } => "replace",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { initial } if initial.is_empty() => write!(f, "create"),
            Self::Create { initial } => {
                let args: Vec<String> = initial.iter().map(ToString::to_string).collect();
                write!(f, "create {}", args.join(" "))
            }
            Self::Set(assignment) => write!(f, "set {}", assignment),
            Self::Unset { key } => write!(f, "unset {}", key),
            Self::Delete => write!(f, "delete"),
            Self::Replace { target, .. } => write!(f, "replace {}", target),
        }
    }
}

/// Result of converging one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Entity was created
    Created,
    /// Entity was modified
    Modified,
    /// Entity was removed
    Removed,
    /// Convergence failed
    Failed { error: String },
    /// Changes were computed but not applied
    Skipped { reason: String },
}

impl ApplyResult {
    /// Classify a successfully applied list of changes
    pub fn from_changes(changes: &[Change]) -> Self {
        if changes.is_empty() {
            Self::NoChange
        } else if changes.iter().any(|c| matches!(c, Change::Create { .. })) {
            Self::Created
        } else if changes.iter().any(|c| matches!(c, Change::Delete)) {
            Self::Removed
        } else {
            Self::Modified
        }
    }

    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// Individual changes applied (or pending, on a dry run)
    pub changes: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of entities processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Compute changes but do not apply them
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

/// A command to run against the external control plane
///
/// Arguments are passed to the process as-is, without a shell in between,
/// so values never need escaping. The printable form quotes for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    /// Text fed to the process on stdin
    pub stdin: Option<String>,
    /// Indices into `args` that must never be printed
    secret: Vec<usize>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            secret: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that is masked in logs and errors
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Whether any argument is secret
    pub fn is_sensitive(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if self.secret.contains(&idx) {
                write!(f, " ********")?;
            } else {
                write!(f, " {}", quote(arg))?;
            }
        }
        Ok(())
    }
}

/// Quote an argument for display the way a POSIX shell would accept it
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '@' | '+')
        });
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Output from a gateway command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub status: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            status: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().into_bytes(),
            stderr: Vec::new(),
            success: true,
            status: Some(0),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
            success: false,
            status: Some(1),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
