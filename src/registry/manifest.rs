//! Plugin-directory discovery.
//!
//! A plugin directory holds `*.toml` manifests naming the managers and timers
//! to enable, each with an optional priority:
//!
//! ```toml
//! [[managers]]
//! name = "locale"
//! priority = 10
//!
//! [[timers]]
//! name = "tracing"
//! ```
//!
//! Names are resolved through a [`FactoryCatalog`] supplied by the host
//! application, so nothing is loaded dynamically.

use crate::error::DiscoveryError;
use crate::manager::ContextManager;
use crate::registry::discovery::{Candidate, Discovered, Discovery, Factory};
use crate::registry::order;
use crate::registry::DiscoveryScope;
use crate::timer::Timer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// One `[[managers]]` or `[[timers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Parsed manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub managers: Vec<ManifestEntry>,
    #[serde(default)]
    pub timers: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(path: &Path, content: &str) -> Result<Self, DiscoveryError> {
        toml::from_str(content).map_err(|e| DiscoveryError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// A manifest file together with its parse outcome.
#[derive(Debug)]
pub struct ManifestFile {
    pub path: PathBuf,
    pub manifest: Result<Manifest, DiscoveryError>,
}

/// Read every manifest in `dir`, sorted by file name.
///
/// A missing or unreadable directory fails the whole scan; a manifest that
/// cannot be read or parsed is reported in its own `ManifestFile`.
pub fn read_manifest_dir(dir: &Path) -> Result<Vec<ManifestFile>, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::Unavailable(format!(
            "plugin directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let manifest = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
            .and_then(|content| Manifest::parse(path, &content));
        files.push(ManifestFile {
            path: path.to_path_buf(),
            manifest,
        });
    }
    debug!(dir = %dir.display(), manifests = files.len(), "scanned plugin directory");
    Ok(files)
}

/// One enabled entry and the manifest that enabled it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    pub name: String,
    pub priority: Option<i32>,
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidManifest {
    pub path: PathBuf,
    pub reason: String,
}

/// What a plugin directory enables, in effective priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestPlan {
    pub managers: Vec<PlannedEntry>,
    pub timers: Vec<PlannedEntry>,
    pub invalid: Vec<InvalidManifest>,
}

/// Order the entries of already-read manifests without constructing anything.
pub fn plan(files: Vec<ManifestFile>) -> ManifestPlan {
    let mut managers = Vec::new();
    let mut timers = Vec::new();
    let mut invalid = Vec::new();
    for file in files {
        let manifest = match file.manifest {
            Ok(manifest) => manifest,
            Err(err) => {
                invalid.push(InvalidManifest {
                    path: file.path,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let planned = |entry: ManifestEntry| {
            (
                entry.priority,
                PlannedEntry {
                    name: entry.name,
                    priority: entry.priority,
                    manifest: file.path.clone(),
                },
            )
        };
        managers.extend(manifest.managers.into_iter().map(planned));
        timers.extend(manifest.timers.into_iter().map(planned));
    }
    ManifestPlan {
        managers: order::by_priority(managers),
        timers: order::by_priority(timers),
        invalid,
    }
}

/// Name → factory table the manifests resolve against.
#[derive(Default)]
pub struct FactoryCatalog {
    managers: HashMap<String, Factory<dyn ContextManager>>,
    timers: HashMap<String, Factory<dyn Timer>>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ContextManager>, DiscoveryError> + Send + Sync + 'static,
    {
        self.managers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn timer<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Timer>, DiscoveryError> + Send + Sync + 'static,
    {
        self.timers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn manager_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.managers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Discovery backed by a plugin directory.
///
/// `Path` scopes select the directory directly; the default scope uses the
/// configured default directory. Named scopes are not supported.
pub struct ManifestDiscovery {
    default_dir: Option<PathBuf>,
    catalog: Arc<FactoryCatalog>,
}

impl ManifestDiscovery {
    pub fn new(catalog: FactoryCatalog) -> Self {
        ManifestDiscovery {
            default_dir: None,
            catalog: Arc::new(catalog),
        }
    }

    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = Some(dir.into());
        self
    }

    fn dir_for<'a>(&'a self, scope: &'a DiscoveryScope) -> Result<&'a Path, DiscoveryError> {
        match scope {
            DiscoveryScope::Path(path) => Ok(path.as_path()),
            DiscoveryScope::Default => self.default_dir.as_deref().ok_or_else(|| {
                DiscoveryError::Unavailable("no default plugin directory configured".to_string())
            }),
            DiscoveryScope::Named(name) => Err(DiscoveryError::UnsupportedScope(format!(
                "plugin directories are selected by path, not by name ({})",
                name
            ))),
        }
    }

    fn resolve<T: ?Sized>(
        &self,
        scope: &DiscoveryScope,
        select: impl Fn(&Manifest) -> &[ManifestEntry],
        factories: &HashMap<String, Factory<T>>,
    ) -> Result<Discovered<T>, DiscoveryError> {
        let dir = self.dir_for(scope)?;
        let mut discovered = Vec::new();
        for file in read_manifest_dir(dir)? {
            let manifest = match file.manifest {
                Ok(manifest) => manifest,
                Err(err) => {
                    discovered.push(Err(err));
                    continue;
                }
            };
            for entry in select(&manifest) {
                let candidate = match factories.get(&entry.name) {
                    Some(factory) => {
                        let mut candidate = Candidate::with_factory(&entry.name, factory.clone());
                        candidate.set_priority(entry.priority);
                        Ok(candidate)
                    }
                    None => Err(DiscoveryError::UnknownPlugin {
                        name: entry.name.clone(),
                        manifest: file.path.clone(),
                    }),
                };
                discovered.push(candidate);
            }
        }
        Ok(discovered)
    }
}

impl Discovery for ManifestDiscovery {
    fn managers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn ContextManager>, DiscoveryError> {
        self.resolve(scope, |m| &m.managers, &self.catalog.managers)
    }

    fn timers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn Timer>, DiscoveryError> {
        self.resolve(scope, |m| &m.timers, &self.catalog.timers)
    }
}
