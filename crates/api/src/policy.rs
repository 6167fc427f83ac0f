//! Policy Enforcement
//!
//! Rules are a JSON object mapping a rule name (usually an action such as
//! `telemetry:get_alarm`) to an expression. Expressions combine checks with
//! `and`, `or`, `not` and parentheses:
//!
//! - `""` or `@` always passes, `!` never does
//! - `role:<name>` passes when the caller holds the role
//! - `rule:<name>` evaluates another rule
//! - `<field>:%(<target_field>)s` compares a credential field to the target
//! - `<field>:<literal>` compares a credential field to a literal
//!
//! The policy file is re-read when its modification time changes, checked at
//! most once per `check_interval_secs`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_RULE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy doesn't allow {0} to be performed.")]
    NotAuthorized(String),
    #[error("Failed to read policy file {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid policy: {0}")]
    Parse(String),
    #[error("Policy state unavailable: {0}")]
    Lock(String),
}

/// Caller credentials as seen by the policy engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub project_id: String,
    pub roles: Vec<String>,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "user_id" => Some(&self.user_id),
            "project_id" => Some(&self.project_id),
            _ => None,
        }
    }
}

/// Attributes of the object an action applies to
pub type Target = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
enum Check {
    Pass,
    Fail,
    Role(String),
    Rule(String),
    TargetField { field: String, target_field: String },
    Literal { field: String, value: String },
    Not(Box<Check>),
    And(Vec<Check>),
    Or(Vec<Check>),
}

fn tokenize(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in expression.split_whitespace() {
        let mut word = word;
        while let Some(rest) = word.strip_prefix('(') {
            tokens.push("(".to_string());
            word = rest;
        }
        // `%(field)s` ends in `s` and keeps its parens
        let mut closing = 0;
        while let Some(rest) = word.strip_suffix(')') {
            closing += 1;
            word = rest;
        }
        if !word.is_empty() {
            tokens.push(word.to_string());
        }
        tokens.extend(std::iter::repeat(")".to_string()).take(closing));
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Check, PolicyError> {
        let mut alternatives = vec![self.parse_and()?];
        while self.peek() == Some("or") {
            self.pos += 1;
            alternatives.push(self.parse_and()?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Check::Or(alternatives)
        })
    }

    fn parse_and(&mut self) -> Result<Check, PolicyError> {
        let mut checks = vec![self.parse_unary()?];
        while self.peek() == Some("and") {
            self.pos += 1;
            checks.push(self.parse_unary()?);
        }
        Ok(if checks.len() == 1 {
            checks.remove(0)
        } else {
            Check::And(checks)
        })
    }

    fn parse_unary(&mut self) -> Result<Check, PolicyError> {
        match self.next().as_deref() {
            Some("not") => Ok(Check::Not(Box::new(self.parse_unary()?))),
            Some("(") => {
                let inner = self.parse_or()?;
                match self.next().as_deref() {
                    Some(")") => Ok(inner),
                    _ => Err(PolicyError::Parse("unbalanced parentheses".to_string())),
                }
            }
            Some(atom) => parse_atom(atom),
            None => Err(PolicyError::Parse("unexpected end of rule".to_string())),
        }
    }
}

fn parse_atom(atom: &str) -> Result<Check, PolicyError> {
    match atom {
        "@" => return Ok(Check::Pass),
        "!" => return Ok(Check::Fail),
        _ => {}
    }

    let (kind, value) = atom
        .split_once(':')
        .ok_or_else(|| PolicyError::Parse(format!("malformed check '{}'", atom)))?;

    Ok(match kind {
        "role" => Check::Role(value.to_string()),
        "rule" => Check::Rule(value.to_string()),
        field => match value
            .strip_prefix("%(")
            .and_then(|rest| rest.strip_suffix(")s"))
        {
            Some(target_field) => Check::TargetField {
                field: field.to_string(),
                target_field: target_field.to_string(),
            },
            None => Check::Literal {
                field: field.to_string(),
                value: value.to_string(),
            },
        },
    })
}

fn parse_rule(expression: &str) -> Result<Check, PolicyError> {
    let tokens = tokenize(expression);
    if tokens.is_empty() {
        return Ok(Check::Pass);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let check = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(PolicyError::Parse(format!(
            "trailing input in rule '{}'",
            expression
        )));
    }
    Ok(check)
}

/// Parse a JSON policy document into named checks
fn parse_rules(data: &str) -> Result<HashMap<String, Check>, PolicyError> {
    let raw: HashMap<String, String> =
        serde_json::from_str(data).map_err(|e| PolicyError::Parse(e.to_string()))?;

    raw.iter()
        .map(|(name, expression)| {
            parse_rule(expression)
                .map(|check| (name.clone(), check))
                .map_err(|e| PolicyError::Parse(format!("rule {}: {}", name, e)))
        })
        .collect()
}

fn builtin_rules() -> HashMap<String, Check> {
    HashMap::from([
        (
            "context_is_admin".to_string(),
            Check::Role("admin".to_string()),
        ),
        (
            "segregation".to_string(),
            Check::Rule("context_is_admin".to_string()),
        ),
        ("default".to_string(), Check::Pass),
    ])
}

/// Policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// JSON policy file; built-in rules only when unset
    pub policy_file: Option<PathBuf>,
    /// Rule applied to actions without a rule of their own
    pub default_rule: String,
    /// Minimum seconds between policy file modification checks
    pub check_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_file: None,
            default_rule: "default".to_string(),
            check_interval_secs: 5,
        }
    }
}

#[derive(Debug)]
struct PolicyState {
    rules: HashMap<String, Check>,
    mtime: Option<SystemTime>,
    checked_at: Option<Instant>,
}

/// Rule-based authorization with a file-backed, mtime-invalidated cache
#[derive(Debug)]
pub struct PolicyEnforcer {
    config: PolicyConfig,
    state: RwLock<PolicyState>,
}

impl PolicyEnforcer {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            state: RwLock::new(PolicyState {
                rules: builtin_rules(),
                mtime: None,
                checked_at: None,
            }),
        }
    }

    /// Enforcer over an in-memory policy document, layered on the built-ins
    pub fn from_json(data: &str) -> Result<Self, PolicyError> {
        let enforcer = Self::new(PolicyConfig::default());
        enforcer.set_rules(parse_rules(data)?, None)?;
        Ok(enforcer)
    }

    /// Load the policy file if it changed since the last load
    pub fn init(&self) -> Result<(), PolicyError> {
        let Some(path) = &self.config.policy_file else {
            return Ok(());
        };

        let io_error = |e: std::io::Error| PolicyError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let mtime = fs::metadata(path).and_then(|m| m.modified()).map_err(io_error)?;

        let cached = {
            let mut state = self
                .state
                .write()
                .map_err(|e| PolicyError::Lock(e.to_string()))?;
            state.checked_at = Some(Instant::now());
            state.mtime
        };
        if cached == Some(mtime) {
            return Ok(());
        }

        let data = fs::read_to_string(path).map_err(io_error)?;
        let rules = parse_rules(&data)?;
        info!(path = %path.display(), rules = rules.len(), "Loaded policy file");
        self.set_rules(rules, Some(mtime))
    }

    /// Re-read the policy file regardless of its modification time
    pub fn reload(&self) -> Result<(), PolicyError> {
        self.state
            .write()
            .map_err(|e| PolicyError::Lock(e.to_string()))?
            .mtime = None;
        self.init()
    }

    /// Drop loaded rules and return to the built-ins
    pub fn reset(&self) -> Result<(), PolicyError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| PolicyError::Lock(e.to_string()))?;
        state.rules = builtin_rules();
        state.mtime = None;
        state.checked_at = None;
        debug!("Policy reset to built-in rules");
        Ok(())
    }

    fn set_rules(
        &self,
        loaded: HashMap<String, Check>,
        mtime: Option<SystemTime>,
    ) -> Result<(), PolicyError> {
        let mut rules = builtin_rules();
        rules.extend(loaded);

        let mut state = self
            .state
            .write()
            .map_err(|e| PolicyError::Lock(e.to_string()))?;
        state.rules = rules;
        state.mtime = mtime;
        Ok(())
    }

    /// Run [`PolicyEnforcer::init`] if the check interval has elapsed
    fn refresh(&self) -> Result<(), PolicyError> {
        if self.config.policy_file.is_none() {
            return Ok(());
        }
        let interval = Duration::from_secs(self.config.check_interval_secs);
        let due = self
            .state
            .read()
            .map_err(|e| PolicyError::Lock(e.to_string()))?
            .checked_at
            .map_or(true, |at| at.elapsed() >= interval);
        if due {
            self.init()?;
        }
        Ok(())
    }

    /// Evaluate a named rule; unknown names fall back to the default rule
    pub fn check(
        &self,
        action: &str,
        target: &Target,
        credentials: &Credentials,
    ) -> Result<bool, PolicyError> {
        self.refresh()?;
        let state = self
            .state
            .read()
            .map_err(|e| PolicyError::Lock(e.to_string()))?;

        let check = state
            .rules
            .get(action)
            .or_else(|| state.rules.get(&self.config.default_rule));
        Ok(check.is_some_and(|check| evaluate(check, &state.rules, target, credentials, 0)))
    }

    /// Require that the caller may perform an action on a target
    pub fn enforce(
        &self,
        action: &str,
        target: &Target,
        credentials: &Credentials,
    ) -> Result<(), PolicyError> {
        if self.check(action, target, credentials)? {
            Ok(())
        } else {
            warn!(action, user_id = %credentials.user_id, "Policy denied action");
            Err(PolicyError::NotAuthorized(action.to_string()))
        }
    }
}

fn evaluate(
    check: &Check,
    rules: &HashMap<String, Check>,
    target: &Target,
    credentials: &Credentials,
    depth: usize,
) -> bool {
    match check {
        Check::Pass => true,
        Check::Fail => false,
        Check::Role(role) => credentials
            .roles
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role)),
        Check::Rule(name) => {
            depth < MAX_RULE_DEPTH
                && rules
                    .get(name)
                    .is_some_and(|rule| evaluate(rule, rules, target, credentials, depth + 1))
        }
        Check::TargetField {
            field,
            target_field,
        } => match (credentials.field(field), target.get(target_field)) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        },
        Check::Literal { field, value } => credentials.field(field) == Some(value.as_str()),
        Check::Not(inner) => !evaluate(inner, rules, target, credentials, depth),
        Check::And(checks) => checks
            .iter()
            .all(|c| evaluate(c, rules, target, credentials, depth)),
        Check::Or(checks) => checks
            .iter()
            .any(|c| evaluate(c, rules, target, credentials, depth)),
    }
}
