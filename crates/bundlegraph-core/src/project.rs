//! Projects: ordered class collections plus field declarations.
//!
//! Projects are loaded from TOML or JSON manifests (selected by file
//! extension) or assembled in code with the builder methods.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::class::ClassMeta;
use crate::error::{LoadError, LoadResult};
use crate::field::FieldDecl;

/// A named collection of classes and field declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub classes: Vec<ClassMeta>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: ClassMeta) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    /// Load and validate a manifest from disk.
    pub fn load(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let project = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw)?,
            _ => Self::from_toml(&raw)?,
        };
        tracing::debug!(
            project = %project.name,
            classes = project.classes.len(),
            fields = project.fields.len(),
            path = %path.display(),
            "loaded project manifest"
        );
        Ok(project)
    }

    pub fn from_toml(raw: &str) -> LoadResult<Self> {
        let project: Project = toml::from_str(raw)?;
        project.validate()?;
        Ok(project)
    }

    pub fn from_json(raw: &str) -> LoadResult<Self> {
        let project: Project = serde_json::from_str(raw)?;
        project.validate()?;
        Ok(project)
    }

    /// Names must be well formed and unique inside the project.
    pub fn validate(&self) -> LoadResult<()> {
        if self.name.trim().is_empty() {
            return Err(LoadError::InvalidManifest("project name is empty".into()));
        }
        let mut seen = HashSet::new();
        for class in &self.classes {
            class.validate()?;
            if !seen.insert(class.name.as_str()) {
                return Err(LoadError::InvalidManifest(format!(
                    "class {} declared twice in project '{}'",
                    class.name, self.name
                )));
            }
        }
        let mut fields = HashSet::new();
        for field in &self.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(LoadError::InvalidManifest(format!(
                    "field {} declared twice in project '{}'",
                    field.name, self.name
                )));
            }
            if let Some(value) = field.repeated_value() {
                return Err(LoadError::InvalidManifest(format!(
                    "value {value} listed twice in the domain of field {}",
                    field.name
                )));
            }
            if let Some(default) = &field.default {
                if !field.allows(default) {
                    return Err(LoadError::InvalidManifest(format!(
                        "default {default} of field {} is outside its domain",
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    const MANIFEST: &str = r#"
name = "core"

[[fields]]
name = "debug"
default = false

[[fields]]
name = "engine"
values = ["gecko", "webkit"]
detect = "core.detect.Engine"

[[classes]]
name = "core.Module"
requires = ["core.Main"]
optional = ["core.Env"]
breaks = ["core.Class"]
assets = ["core/module/*"]

[[classes.conditional]]
field = "debug"
value = true
class = "core.Assert"

[[classes]]
name = "core.Main"
"#;

    #[test]
    fn test_toml_manifest_parses_all_sections() {
        let p = Project::from_toml(MANIFEST).unwrap();
        assert_eq!(p.name, "core");
        assert_eq!(p.fields.len(), 2);
        assert_eq!(p.fields[0].default, Some(FieldValue::Bool(false)));
        assert_eq!(p.fields[1].detect.as_deref(), Some("core.detect.Engine"));
        let module = &p.classes[0];
        assert_eq!(module.requires, vec!["core.Main"]);
        assert_eq!(module.optional, vec!["core.Env"]);
        assert_eq!(module.breaks, vec!["core.Class"]);
        assert_eq!(module.conditional[0].value, FieldValue::Bool(true));
        assert_eq!(module.conditional[0].class, "core.Assert");
    }

    #[test]
    fn test_json_manifest_parses() {
        let raw = r#"{
            "name": "app",
            "classes": [{ "name": "app.Main", "requires": ["core.Module"] }]
        }"#;
        let p = Project::from_json(raw).unwrap();
        assert_eq!(p.classes[0].requires, vec!["core.Module"]);
        assert!(p.fields.is_empty());
    }

    #[test]
    fn test_duplicate_class_within_project_rejected() {
        let p = Project::new("x")
            .with_class(ClassMeta::new("a.A"))
            .with_class(ClassMeta::new("a.A"));
        assert!(matches!(p.validate(), Err(LoadError::InvalidManifest(_))));
    }

    #[test]
    fn test_default_outside_domain_rejected() {
        let raw = r#"
name = "x"
[[fields]]
name = "engine"
values = ["gecko"]
default = "presto"
"#;
        assert!(matches!(
            Project::from_toml(raw),
            Err(LoadError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_repeated_domain_value_rejected() {
        let raw = r#"
name = "x"
[[fields]]
name = "engine"
values = ["a", "a"]
"#;
        match Project::from_toml(raw) {
            Err(LoadError::InvalidManifest(msg)) => assert!(msg.contains("engine"), "{msg}"),
            other => panic!("expected InvalidManifest, got {other:?}"),
        }
    }

    #[test]
    fn test_load_reads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("project.toml");
        std::fs::write(&toml_path, MANIFEST).unwrap();
        assert_eq!(Project::load(&toml_path).unwrap().name, "core");

        let json_path = dir.path().join("project.json");
        std::fs::write(&json_path, r#"{"name":"j"}"#).unwrap();
        assert_eq!(Project::load(&json_path).unwrap().name, "j");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
