//! Asset export boundary.
//!
//! Given the classes included in an artifact, an [`AssetExporter`] describes
//! the non-script resources they reach. The description is opaque here and
//! only travels through to the output sink.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::database::ClassDatabase;

/// Produces an opaque asset description for a set of classes.
pub trait AssetExporter: Send + Sync {
    fn export(&self, db: &ClassDatabase, classes: &[String]) -> Value;
}

/// Exports the `assets` references each class declares, keyed by class.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredAssetExporter;

impl AssetExporter for DeclaredAssetExporter {
    fn export(&self, db: &ClassDatabase, classes: &[String]) -> Value {
        let mut by_class: BTreeMap<&str, &[String]> = BTreeMap::new();
        for name in classes {
            if let Some(meta) = db.get(name) {
                if !meta.assets.is_empty() {
                    by_class.insert(meta.name.as_str(), &meta.assets);
                }
            }
        }
        serde_json::json!(by_class)
    }
}

/// Exports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAssets;

impl AssetExporter for NoAssets {
    fn export(&self, _db: &ClassDatabase, _classes: &[String]) -> Value {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassMeta;
    use crate::project::Project;

    #[test]
    fn test_declared_assets_only_for_included_classes() {
        let project = Project::new("ui")
            .with_class(ClassMeta::new("ui.Button").asset("ui/button.css"))
            .with_class(ClassMeta::new("ui.Icon").asset("ui/icons/*"))
            .with_class(ClassMeta::new("ui.Plain"));
        let db = ClassDatabase::from_projects([&project]).unwrap();

        let value = DeclaredAssetExporter.export(&db, &["ui.Button".into(), "ui.Plain".into()]);
        assert_eq!(value, serde_json::json!({ "ui.Button": ["ui/button.css"] }));
    }

    #[test]
    fn test_no_assets_is_null() {
        let db = ClassDatabase::new();
        assert!(NoAssets.export(&db, &[]).is_null());
    }
}
