//! Import resolution and flattening.
//!
//! Before element resolution runs, the import closure of the main document
//! is fetched, loaded, and merged into one combined document. Mapping
//! sections merge key-by-key; a key declared by two different documents is
//! a collision. Every imported document must agree with the main
//! document's `definitions_version`. Already-visited locations are skipped,
//! so diamond-shaped import graphs flatten cleanly.

use crate::loader::load_yaml;
use indexmap::IndexSet;
use keystone_core::{CompileError, CompileResult, ValueMap, string_seq};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Sections the main document alone decides.
const UNMERGED_SECTIONS: &[&str] = &["imports", "definitions_version", "description"];

/// Supplies imported documents to the compiler.
pub trait ImportResolver {
    /// Turn an import name into a fetchable location, relative to the
    /// importing document's location when one is known.
    fn resolve_location(&self, name: &str, base: Option<&str>) -> Option<String>;

    /// Fetch the raw text behind a resolved location.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnresolvedImport`] when the location cannot
    /// be read.
    fn fetch(&self, uri: &str) -> CompileResult<String>;
}

/// Resolves nothing; for documents without imports.
pub struct NullResolver;

impl ImportResolver for NullResolver {
    fn resolve_location(&self, _name: &str, _base: Option<&str>) -> Option<String> {
        None
    }

    fn fetch(&self, uri: &str) -> CompileResult<String> {
        Err(CompileError::UnresolvedImport {
            import: uri.to_string(),
        })
    }
}

/// In-memory resolver, keyed by import name.
#[derive(Default)]
pub struct MemoryResolver {
    documents: indexmap::IndexMap<String, String>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under an import name.
    #[must_use]
    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.documents.insert(name.to_string(), text.to_string());
        self
    }
}

impl ImportResolver for MemoryResolver {
    fn resolve_location(&self, name: &str, _base: Option<&str>) -> Option<String> {
        self.documents.contains_key(name).then(|| name.to_string())
    }

    fn fetch(&self, uri: &str) -> CompileResult<String> {
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| CompileError::UnresolvedImport {
                import: uri.to_string(),
            })
    }
}

/// Filesystem resolver: import names are paths relative to the importing
/// document (or to the root directory for the main document).
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    /// Create a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImportResolver for FsResolver {
    fn resolve_location(&self, name: &str, base: Option<&str>) -> Option<String> {
        let candidate = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            let anchor = base
                .map(Path::new)
                .and_then(Path::parent)
                .map_or_else(|| self.root.clone(), Path::to_path_buf);
            anchor.join(name)
        };
        candidate
            .is_file()
            .then(|| candidate.to_string_lossy().into_owned())
    }

    fn fetch(&self, uri: &str) -> CompileResult<String> {
        std::fs::read_to_string(uri).map_err(|_| CompileError::UnresolvedImport {
            import: uri.to_string(),
        })
    }
}

/// Flatten the import closure of `document` into one combined document.
///
/// # Errors
///
/// Returns [`CompileError::UnresolvedImport`],
/// [`CompileError::VersionMismatch`], or [`CompileError::ImportCollision`],
/// plus loader errors for unreadable imported documents.
pub fn flatten(document: Value, resolver: &dyn ImportResolver) -> CompileResult<Value> {
    let Value::Object(mut combined) = document else {
        return Err(CompileError::InvalidDocument {
            reason: "top level must be a mapping".to_string(),
        });
    };

    let main_version = combined
        .get("definitions_version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let imports = combined
        .get("imports")
        .and_then(string_seq)
        .unwrap_or_default();

    let mut visited = IndexSet::new();
    for import in imports {
        merge_import(
            &mut combined,
            &import,
            None,
            resolver,
            main_version.as_deref(),
            &mut visited,
        )?;
    }
    Ok(Value::Object(combined))
}

fn merge_import(
    combined: &mut ValueMap,
    name: &str,
    base: Option<&str>,
    resolver: &dyn ImportResolver,
    main_version: Option<&str>,
    visited: &mut IndexSet<String>,
) -> CompileResult<()> {
    let uri = resolver
        .resolve_location(name, base)
        .ok_or_else(|| CompileError::UnresolvedImport {
            import: name.to_string(),
        })?;
    if !visited.insert(uri.clone()) {
        return Ok(());
    }
    tracing::debug!(import = %uri, "merging import");

    let imported = load_yaml(&resolver.fetch(&uri)?)?;
    let Value::Object(imported) = imported else {
        return Err(CompileError::InvalidDocument {
            reason: format!("import '{uri}' is not a mapping"),
        });
    };

    if let (Some(main), Some(declared)) = (
        main_version,
        imported.get("definitions_version").and_then(Value::as_str),
    ) {
        if main != declared {
            return Err(CompileError::VersionMismatch {
                import: uri,
                main: main.to_string(),
                imported: declared.to_string(),
            });
        }
    }

    // Depth-first: an import's own imports land before its sections.
    for nested in imported
        .get("imports")
        .and_then(string_seq)
        .unwrap_or_default()
    {
        merge_import(combined, &nested, Some(&uri), resolver, main_version, visited)?;
    }

    for (section, value) in &imported {
        if UNMERGED_SECTIONS.contains(&section.as_str()) {
            continue;
        }
        match combined.get_mut(section) {
            None => {
                combined.insert(section.clone(), value.clone());
            }
            Some(Value::Object(existing)) => {
                let Some(incoming) = value.as_object() else {
                    return Err(CompileError::ImportCollision {
                        import: uri.clone(),
                        section: section.clone(),
                        key: section.clone(),
                    });
                };
                for (key, entry) in incoming {
                    if existing.contains_key(key) {
                        return Err(CompileError::ImportCollision {
                            import: uri.clone(),
                            section: section.clone(),
                            key: key.clone(),
                        });
                    }
                    existing.insert(key.clone(), entry.clone());
                }
            }
            Some(_) => {
                return Err(CompileError::ImportCollision {
                    import: uri.clone(),
                    section: section.clone(),
                    key: section.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_without_imports_is_identity() {
        let doc = json!({"definitions_version": "keystone_dsl_1_0", "node_types": {}});
        let flat = flatten(doc.clone(), &NullResolver).unwrap();
        assert_eq!(flat, doc);
    }

    #[test]
    fn test_flatten_merges_disjoint_sections() {
        let resolver = MemoryResolver::new().with(
            "types.yaml",
            "definitions_version: keystone_dsl_1_0\nnode_types:\n  imported: {}\n",
        );
        let doc = json!({
            "definitions_version": "keystone_dsl_1_0",
            "imports": ["types.yaml"],
            "node_types": {"local": {}},
        });
        let flat = flatten(doc, &resolver).unwrap();
        assert_eq!(
            flat["node_types"],
            json!({"local": {}, "imported": {}})
        );
    }

    #[test]
    fn test_flatten_detects_collision() {
        let resolver = MemoryResolver::new().with(
            "types.yaml",
            "node_types:\n  local: {}\n",
        );
        let doc = json!({
            "definitions_version": "keystone_dsl_1_0",
            "imports": ["types.yaml"],
            "node_types": {"local": {}},
        });
        let err = flatten(doc, &resolver).unwrap_err();
        assert_eq!(err.code(), 311);
    }

    #[test]
    fn test_flatten_version_mismatch() {
        let resolver = MemoryResolver::new().with(
            "old.yaml",
            "definitions_version: keystone_dsl_0_9\n",
        );
        let doc = json!({
            "definitions_version": "keystone_dsl_1_0",
            "imports": ["old.yaml"],
        });
        let err = flatten(doc, &resolver).unwrap_err();
        assert_eq!(err.code(), 310);
    }

    #[test]
    fn test_flatten_unresolved_import() {
        let doc = json!({"imports": ["nowhere.yaml"]});
        let err = flatten(doc, &NullResolver).unwrap_err();
        assert_eq!(err.code(), 312);
    }

    #[test]
    fn test_flatten_diamond_imports_once() {
        let resolver = MemoryResolver::new()
            .with("a.yaml", "imports: [shared.yaml]\nnode_types:\n  a: {}\n")
            .with("b.yaml", "imports: [shared.yaml]\nnode_types:\n  b: {}\n")
            .with("shared.yaml", "node_types:\n  shared: {}\n");
        let doc = json!({
            "definitions_version": "keystone_dsl_1_0",
            "imports": ["a.yaml", "b.yaml"],
        });
        let flat = flatten(doc, &resolver).unwrap();
        assert_eq!(
            flat["node_types"],
            json!({"shared": {}, "a": {}, "b": {}})
        );
    }
}
