//! The class database: union of every project's classes and fields.
//!
//! Class-name collisions across projects are detected eagerly, when a
//! project is added, so a database that exists is always conflict-free.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::class::ClassMeta;
use crate::error::{ResolveError, Result};
use crate::field::FieldDomains;
use crate::project::Project;

#[derive(Debug, Clone)]
struct Entry {
    project: usize,
    meta: Arc<ClassMeta>,
}

/// Read-only catalog mapping class names to metadata.
#[derive(Debug, Clone, Default)]
pub struct ClassDatabase {
    projects: Vec<String>,
    classes: HashMap<String, Entry>,
    fields: FieldDomains,
    identity: String,
}

impl ClassDatabase {
    pub fn new() -> Self {
        let mut db = Self::default();
        db.identity = db.compute_identity();
        db
    }

    /// Build a database from projects in order.
    pub fn from_projects<'a>(projects: impl IntoIterator<Item = &'a Project>) -> Result<Self> {
        let mut db = Self::new();
        for project in projects {
            db.add_project(project)?;
        }
        Ok(db)
    }

    /// Merge `project` in. Fails without modifying the database if any of
    /// its classes is already defined by an earlier project.
    pub fn add_project(&mut self, project: &Project) -> Result<()> {
        for class in &project.classes {
            if let Some(existing) = self.classes.get(&class.name) {
                return Err(ResolveError::DuplicateClass {
                    name: class.name.clone(),
                    first: self.projects[existing.project].clone(),
                    second: project.name.clone(),
                });
            }
        }

        let index = self.projects.len();
        self.projects.push(project.name.clone());
        for class in &project.classes {
            self.classes.insert(
                class.name.clone(),
                Entry {
                    project: index,
                    meta: Arc::new(class.clone()),
                },
            );
        }
        for field in &project.fields {
            self.fields.declare(field.clone());
        }
        self.identity = self.compute_identity();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassMeta> {
        self.classes.get(name).map(|e| e.meta.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Name of the project defining `name`.
    pub fn project_of(&self, name: &str) -> Option<&str> {
        self.classes
            .get(name)
            .map(|e| self.projects[e.project].as_str())
    }

    pub fn fields(&self) -> &FieldDomains {
        &self.fields
    }

    pub fn project_names(&self) -> &[String] {
        &self.projects
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Stable digest over the project set and every class record.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn compute_identity(&self) -> String {
        let mut names: Vec<&String> = self.classes.keys().collect();
        names.sort();

        let mut hasher = Sha256::new();
        for project in &self.projects {
            hasher.update(project.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x01");
        for name in names {
            let meta = &self.classes[name].meta;
            // Struct fields serialize in declaration order, so this is canonical.
            let record = serde_json::to_string(meta.as_ref()).unwrap_or_default();
            hasher.update(record.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x01");
        for field in self.fields.iter() {
            let record = serde_json::to_string(field).unwrap_or_default();
            hasher.update(record.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}
