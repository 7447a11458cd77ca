//! Favor kind catalog
//!
//! A versioned table of the favor kinds users may record, loaded once at
//! startup and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::types::{FavorrError, Result};

/// One recognized favor kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavorKind {
    pub id: String,
    pub label: String,
    /// Repayment must be evidenced by a photo from the debtor
    pub requires_proof: bool,
}

impl FavorKind {
    fn new(id: &str, label: &str, requires_proof: bool) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            requires_proof,
        }
    }
}

/// Versioned favor kind table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavorCatalog {
    pub version: u32,
    pub kinds: Vec<FavorKind>,
}

impl Default for FavorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FavorCatalog {
    /// Catalog compiled into the binary
    pub fn builtin() -> Self {
        Self {
            version: 1,
            kinds: vec![
                FavorKind::new("coffee", "Coffee", true),
                FavorKind::new("bubble_tea", "Bubble tea", true),
                FavorKind::new("lunch", "Lunch", true),
                FavorKind::new("snack", "Snack", true),
                FavorKind::new("chocolate", "Chocolate", true),
                FavorKind::new("ride", "Ride", false),
                FavorKind::new("study_help", "Study help", false),
                FavorKind::new("proofreading", "Proofreading", false),
                FavorKind::new("moving_help", "Help moving house", false),
            ],
        }
    }

    /// Parse and check a catalog document
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: FavorCatalog = serde_json::from_str(json)
            .map_err(|e| FavorrError::Config(format!("Invalid favor catalog: {}", e)))?;
        catalog.check()?;
        Ok(catalog)
    }

    /// Load from `path`, or the built-in catalog when unset
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let catalog = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    FavorrError::Config(format!(
                        "Cannot read favor catalog {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_json(&json)?
            }
            None => Self::builtin(),
        };

        info!(
            "Favor catalog v{} loaded ({} kinds)",
            catalog.version,
            catalog.kinds.len()
        );
        Ok(catalog)
    }

    fn check(&self) -> Result<()> {
        if self.kinds.is_empty() {
            return Err(FavorrError::Config("Favor catalog has no kinds".into()));
        }
        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if kind.id.trim().is_empty() {
                return Err(FavorrError::Config("Favor kind with empty id".into()));
            }
            if !seen.insert(kind.id.as_str()) {
                return Err(FavorrError::Config(format!(
                    "Duplicate favor kind '{}'",
                    kind.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&FavorKind> {
        self.kinds.iter().find(|k| k.id == id)
    }

    /// Look up a kind, failing with `Validation` for ids not in the table
    pub fn require(&self, id: &str) -> Result<&FavorKind> {
        self.get(id)
            .ok_or_else(|| FavorrError::Validation(format!("Unknown favor kind '{}'", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let catalog = FavorCatalog::builtin();
        assert!(catalog.require("coffee").unwrap().requires_proof);
        assert!(!catalog.require("ride").unwrap().requires_proof);
        assert!(matches!(
            catalog.require("unicorn").unwrap_err(),
            FavorrError::Validation(_)
        ));
    }

    #[test]
    fn test_from_json() {
        let catalog = FavorCatalog::from_json(
            r#"{"version": 3, "kinds": [{"id": "pizza", "label": "Pizza", "requiresProof": true}]}"#,
        )
        .unwrap();
        assert_eq!(catalog.version, 3);
        assert!(catalog.get("pizza").is_some());
        assert!(catalog.get("coffee").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = FavorCatalog::from_json(
            r#"{"version": 1, "kinds": [
                {"id": "pizza", "label": "Pizza", "requiresProof": true},
                {"id": "pizza", "label": "More pizza", "requiresProof": false}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, FavorrError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"version": 2, "kinds": [{"id": "ride", "label": "Ride", "requiresProof": false}]}"#,
        )
        .unwrap();

        let catalog = FavorCatalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.version, 2);
        assert!(FavorCatalog::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
