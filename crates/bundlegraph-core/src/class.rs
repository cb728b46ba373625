//! Class metadata: the structured dependency records a project supplies.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};
use crate::field::FieldValue;

/// A dependency that only applies when `field` has `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalDependency {
    pub field: String,
    pub value: FieldValue,
    pub class: String,
}

/// Immutable dependency metadata of one class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassMeta {
    /// Dotted class name, e.g. `core.Module`.
    pub name: String,
    /// Unconditional dependencies; always part of the closure and always
    /// loaded first.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Field-guarded dependencies.
    #[serde(default)]
    pub conditional: Vec<ConditionalDependency>,
    /// Ordering-only dependencies, honoured when the target is in the
    /// closure for some other reason.
    #[serde(default)]
    pub optional: Vec<String>,
    /// Closure-only dependencies with no load-order edge.
    #[serde(default)]
    pub breaks: Vec<String>,
    /// Opaque asset references handed to asset exporters.
    #[serde(default)]
    pub assets: Vec<String>,
}

impl ClassMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn optional<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn breaks<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.breaks.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn when(
        mut self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
        class: impl Into<String>,
    ) -> Self {
        self.conditional.push(ConditionalDependency {
            field: field.into(),
            value: value.into(),
            class: class.into(),
        });
        self
    }

    pub fn asset(mut self, asset: impl Into<String>) -> Self {
        self.assets.push(asset.into());
        self
    }

    /// Every class name this record mentions, including itself.
    pub fn referenced_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.requires.iter().map(String::as_str))
            .chain(self.conditional.iter().map(|c| c.class.as_str()))
            .chain(self.optional.iter().map(String::as_str))
            .chain(self.breaks.iter().map(String::as_str))
    }

    /// Reject malformed names anywhere in the record.
    pub fn validate(&self) -> LoadResult<()> {
        for name in self.referenced_names() {
            validate_class_name(name)?;
        }
        Ok(())
    }
}

fn class_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$").expect("static pattern compiles")
    })
}

/// Check that `name` is a dotted identifier.
pub fn validate_class_name(name: &str) -> LoadResult<()> {
    if class_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(LoadError::InvalidClassName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_names_accepted() {
        for name in ["core.Module", "jquery", "ext.sugar.Array", "$.fn", "_private.x1"] {
            assert!(validate_class_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_malformed_names_rejected() {
        for name in ["", "core.", ".Module", "core..Module", "1core", "core Module"] {
            assert!(validate_class_name(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_validate_checks_dependency_names() {
        let meta = ClassMeta::new("core.Module").requires(["bad name"]);
        assert!(matches!(meta.validate(), Err(LoadError::InvalidClassName(n)) if n == "bad name"));
    }

    #[test]
    fn test_builder_collects_all_dependency_kinds() {
        let meta = ClassMeta::new("a.A")
            .requires(["a.B"])
            .optional(["a.C"])
            .breaks(["a.D"])
            .when("es5", false, "fix.ES5")
            .asset("a/*.png");
        let names: Vec<&str> = meta.referenced_names().collect();
        assert_eq!(names, vec!["a.A", "a.B", "fix.ES5", "a.C", "a.D"]);
        assert_eq!(meta.assets, vec!["a/*.png"]);
    }
}
