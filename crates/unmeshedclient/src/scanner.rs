//! Worker discovery from JSON manifests.
//!
//! A manifest plays the role of a worker annotation: it names a handler from
//! a [`HandlerCatalog`] and the queue settings to register it with.
//!
//! ```json
//! { "handler": "list_no_test", "namespace": "testns3",
//!   "workerQueueNames": ["res_list", "res_list2"], "maxInProgress": 100 }
//! ```

use crate::registry::{WorkerRegistration, DEFAULT_MAX_IN_PROGRESS, DEFAULT_NAMESPACE};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unmeshedcore::{RegistryError, Result, Worker};

/// Named handlers that manifests can refer to
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    handlers: HashMap<String, Arc<dyn Worker>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: impl Worker + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerManifest {
    pub handler: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub worker_queue_names: Vec<String>,
    pub max_in_progress: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    One(WorkerManifest),
    Many(Vec<WorkerManifest>),
}

pub struct WorkerScanner;

impl WorkerScanner {
    /// Walk `dir` recursively and bind every manifest to its handler
    pub fn scan(dir: impl AsRef<Path>, catalog: &HandlerCatalog) -> Result<Vec<WorkerRegistration>> {
        let mut files = Vec::new();
        collect_json_files(dir.as_ref(), &mut files)?;
        files.sort();

        let mut registrations = Vec::new();
        for path in files {
            for manifest in read_manifests(&path)? {
                let handler = catalog
                    .get(&manifest.handler)
                    .ok_or_else(|| RegistryError::UnknownHandler(manifest.handler.clone()))?;

                tracing::debug!("Found worker manifest for {} in {}", manifest.handler, path.display());

                let name = manifest.name.unwrap_or_else(|| manifest.handler.clone());
                registrations.push(
                    WorkerRegistration::from_handler(name, handler)
                        .with_namespace(manifest.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
                        .with_queue_names(manifest.worker_queue_names)
                        .with_max_in_progress(manifest.max_in_progress.unwrap_or(DEFAULT_MAX_IN_PROGRESS)),
                );
            }
        }

        tracing::info!("Scanned {} worker manifests under {}", registrations.len(), dir.as_ref().display());
        Ok(registrations)
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension() == Some("json".as_ref()) {
            out.push(path);
        }
    }
    Ok(())
}

fn read_manifests(path: &Path) -> Result<Vec<WorkerManifest>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: ManifestFile = serde_json::from_str(&raw).map_err(|e| RegistryError::InvalidManifest {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(match parsed {
        ManifestFile::One(manifest) => vec![manifest],
        ManifestFile::Many(manifests) => manifests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use unmeshedcore::{FnWorker, UnmeshedError};

    fn catalog() -> HandlerCatalog {
        let mut catalog = HandlerCatalog::new();
        catalog.insert("echo", FnWorker::new(|input| Ok(json!(input))));
        catalog
    }

    #[test]
    fn scans_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"handler": "echo", "name": "worker3_alt", "maxInProgress": 500}"#,
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("b.json"),
            r#"[{"handler": "echo", "namespace": "testns3", "workerQueueNames": ["q1", "q2"]}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = WorkerScanner::scan(dir.path(), &catalog()).unwrap();
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].name, "worker3_alt");
        assert_eq!(found[0].namespace, "default");
        assert_eq!(found[0].max_in_progress, 500);

        assert_eq!(found[1].name, "echo");
        assert_eq!(found[1].namespace, "testns3");
        assert_eq!(found[1].queue_names(), vec!["q1", "q2"]);
        assert_eq!(found[1].max_in_progress, DEFAULT_MAX_IN_PROGRESS);
    }

    #[test]
    fn unknown_handler_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"handler": "missing"}"#).unwrap();

        let err = WorkerScanner::scan(dir.path(), &catalog()).unwrap_err();
        assert!(matches!(
            err,
            UnmeshedError::Registry(RegistryError::UnknownHandler(ref name)) if name == "missing"
        ));
    }

    #[test]
    fn malformed_manifest_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), r#"{"name": 3}"#).unwrap();

        let err = WorkerScanner::scan(dir.path(), &catalog()).unwrap_err();
        match err {
            UnmeshedError::Registry(RegistryError::InvalidManifest { path, .. }) => {
                assert!(path.ends_with("bad.json"))
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
