//! Build-time fields: value domains and per-session fixed/variable state.
//!
//! Projects declare fields ([`FieldDecl`]) with an enumerable domain. A
//! session then marks fields as *variable* (explored by permutation) or
//! *fixed* (pinned to one value) through a [`FieldRegistry`]. Validation
//! against the declared domains is deferred until enumeration, because
//! fields may be configured before the projects declaring them are added.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// One value of a field's domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// Parse a command-line style value: booleans and integers are
    /// recognised, anything else is kept as a string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            other => other
                .parse::<i64>()
                .map(FieldValue::Int)
                .unwrap_or_else(|_| FieldValue::Str(other.to_string())),
        }
    }

    /// Truthiness used by `is_set` style queries.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Int(i) => *i != 0,
            FieldValue::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

/// A field declaration as supplied by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Value domain in declaration order. Empty means boolean.
    #[serde(default)]
    pub values: Vec<FieldValue>,
    /// Value used when the field is neither fixed nor permuted.
    #[serde(default)]
    pub default: Option<FieldValue>,
    /// Class that detects the field's value at runtime.
    #[serde(default)]
    pub detect: Option<String>,
}

impl FieldDecl {
    /// Boolean field with domain `{true, false}`.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            default: None,
            detect: None,
        }
    }

    /// Field with an explicit domain.
    pub fn enumerated(name: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            name: name.into(),
            values,
            default: None,
            detect: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_detect(mut self, class: impl Into<String>) -> Self {
        self.detect = Some(class.into());
        self
    }

    /// The effective domain, in declaration order. Repeated values keep
    /// their first position only.
    pub fn domain(&self) -> Vec<FieldValue> {
        if self.values.is_empty() {
            return vec![FieldValue::Bool(true), FieldValue::Bool(false)];
        }
        let mut domain: Vec<FieldValue> = Vec::with_capacity(self.values.len());
        for value in &self.values {
            if !domain.contains(value) {
                domain.push(value.clone());
            }
        }
        domain
    }

    /// First value listed more than once in `values`.
    pub fn repeated_value(&self) -> Option<&FieldValue> {
        self.values
            .iter()
            .enumerate()
            .find(|(i, v)| self.values[..*i].contains(v))
            .map(|(_, v)| v)
    }

    /// Declared default, falling back to the first domain value.
    pub fn default_value(&self) -> FieldValue {
        match &self.default {
            Some(v) => v.clone(),
            None => self
                .domain()
                .into_iter()
                .next()
                .unwrap_or(FieldValue::Bool(false)),
        }
    }

    pub fn allows(&self, value: &FieldValue) -> bool {
        self.domain().contains(value)
    }
}

/// Union of field declarations across projects, in declaration order.
///
/// The first declaration of a name wins; later duplicates are ignored.
#[derive(Debug, Clone, Default)]
pub struct FieldDomains {
    decls: Vec<FieldDecl>,
    index: HashMap<String, usize>,
}

impl FieldDomains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration. Returns `false` if the name was already known.
    pub fn declare(&mut self, decl: FieldDecl) -> bool {
        if let Some(&i) = self.index.get(&decl.name) {
            let kept = self.decls[i].domain();
            let ignored = decl.domain();
            if kept != ignored {
                tracing::warn!(
                    field = %decl.name,
                    kept = ?kept,
                    ignored = ?ignored,
                    "field redeclared with a different domain; keeping the first"
                );
            }
            return false;
        }
        self.index.insert(decl.name.clone(), self.decls.len());
        self.decls.push(decl);
        true
    }

    pub fn get(&self, name: &str) -> Option<&FieldDecl> {
        self.index.get(name).map(|&i| &self.decls[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDecl> {
        self.decls.iter()
    }

    /// Default value of `name`, if declared.
    pub fn default_of(&self, name: &str) -> Option<FieldValue> {
        self.get(name).map(FieldDecl::default_value)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// Session-level state of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    Variable,
    Fixed(FieldValue),
}

/// Tracks which fields are fixed and which are variable for one session.
///
/// A field is never both: the later call overrides the earlier one.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    states: BTreeMap<String, FieldState>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as variable.
    pub fn declare_variable(&mut self, name: impl Into<String>) {
        self.states.insert(name.into(), FieldState::Variable);
    }

    /// Pin `name` to `value`.
    pub fn fix(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.states.insert(name.into(), FieldState::Fixed(value.into()));
    }

    pub fn state(&self, name: &str) -> Option<&FieldState> {
        self.states.get(name)
    }

    pub fn is_variable(&self, name: &str) -> bool {
        matches!(self.states.get(name), Some(FieldState::Variable))
    }

    /// Fixed values after validating every referenced field against `domains`.
    pub fn fixed_values(&self, domains: &FieldDomains) -> Result<BTreeMap<String, FieldValue>> {
        self.validate(domains)?;
        Ok(self
            .states
            .iter()
            .filter_map(|(name, state)| match state {
                FieldState::Fixed(v) => Some((name.clone(), v.clone())),
                FieldState::Variable => None,
            })
            .collect())
    }

    /// Variable field declarations in project declaration order.
    pub fn variable_fields<'a>(&self, domains: &'a FieldDomains) -> Result<Vec<&'a FieldDecl>> {
        self.validate(domains)?;
        Ok(domains
            .iter()
            .filter(|decl| self.is_variable(&decl.name))
            .collect())
    }

    /// Every referenced field must be declared, and every fixed value must
    /// lie inside its domain.
    pub fn validate(&self, domains: &FieldDomains) -> Result<()> {
        for (name, state) in &self.states {
            let decl = domains.get(name).ok_or_else(|| ResolveError::UnknownField {
                name: name.clone(),
            })?;
            if let FieldState::Fixed(value) = state {
                if !decl.allows(value) {
                    return Err(ResolveError::InvalidFieldValue {
                        field: name.clone(),
                        value: value.to_string(),
                        allowed: decl.domain().iter().map(ToString::to_string).collect(),
                    });
                }
            }
        }
        Ok(())
    }
}
