//! Manifest Store (C1): load/save `egg.yaml` and enforce its invariants.
//!
//! The project manifest is the authoritative declaration of a project's
//! service topology (spec §3.1). This module owns its typed shape, its
//! serialization in any of the three supported formats, and the invariant
//! checks that must hold after every successful write.

use crate::core::error::EggError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical manifest file name, written by `init`.
pub const MANIFEST_FILE_NAME: &str = "egg.yaml";

static BACKEND_ID_RE: &str = r"^[a-z][a-z0-9-]*$";
static FRONTEND_ID_RE: &str = r"^[a-z][a-z0-9_]*$";

/// On-disk format a manifest was read from or should be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Toml,
    Json,
}

impl ManifestFormat {
    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(ManifestFormat::Yaml),
            Some("toml") => Some(ManifestFormat::Toml),
            Some("json") => Some(ManifestFormat::Json),
            _ => None,
        }
    }
}

/// Proto scaffold selection for a backend service (spec §3.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtoTemplate {
    Echo,
    Crud,
    None,
}

/// Target platform for a frontend service (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Android,
    Ios,
    Macos,
    Windows,
    Linux,
}

/// The three ports owned by a backend service; all mutually distinct and
/// unique project-wide (invariant 4 / P2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPorts {
    pub http: u16,
    pub health: u16,
    pub metrics: u16,
}

impl BackendPorts {
    pub fn as_triple(&self) -> [u16; 3] {
        [self.http, self.health, self.metrics]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendService {
    /// Must equal the map key this service is stored under (invariant 1).
    pub name: String,
    pub proto_template: ProtoTemplate,
    pub ports: BackendPorts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendService {
    pub name: String,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub web_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_db_image")]
    pub image: String,
    #[serde(default)]
    pub root_password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_db_image() -> String {
    "mysql:9.4".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            enabled: false,
            image: default_db_image(),
            root_password: String::new(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureConfig {
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// The project manifest (spec §3.1 / §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_name: String,
    pub module_prefix: String,
    #[serde(default)]
    pub docker_registry: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub backend: BTreeMap<String, BackendService>,
    #[serde(default)]
    pub frontend: BTreeMap<String, FrontendService>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Unknown keys captured verbatim at `Load` so an older `egg` binary's
    /// additions round-trip even when this binary doesn't understand them.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

fn default_version() -> String {
    "v0.1.0".to_string()
}

impl Project {
    pub fn new(project_name: String, module_prefix: String) -> Self {
        Project {
            project_name,
            module_prefix,
            docker_registry: String::new(),
            version: default_version(),
            backend: BTreeMap::new(),
            frontend: BTreeMap::new(),
            database: DatabaseConfig::default(),
            infrastructure: InfrastructureConfig::default(),
            unknown: BTreeMap::new(),
        }
    }

    /// Full invariant check of spec §3.1. Returns every offending rule,
    /// never just the first, so `ManifestInvalid` can report them all.
    pub fn validate(&self) -> Vec<String> {
        let mut offenses = Vec::new();
        let backend_re = regex::Regex::new(BACKEND_ID_RE).unwrap();
        let frontend_re = regex::Regex::new(FRONTEND_ID_RE).unwrap();

        // Invariant 1: disjoint name sets across types.
        for key in self.backend.keys() {
            if self.frontend.contains_key(key) {
                offenses.push(format!(
                    "service id '{key}' is used by both a backend and a frontend service"
                ));
            }
        }

        // Invariant 2: backend id shape.
        for key in self.backend.keys() {
            if !backend_re.is_match(key) {
                offenses.push(format!(
                    "backend service id '{key}' must match {BACKEND_ID_RE}"
                ));
            }
            if key.ends_with("-service") {
                offenses.push(format!(
                    "backend service id '{key}' must not end in '-service'"
                ));
            }
        }

        // Invariant 3: frontend id shape.
        for key in self.frontend.keys() {
            if !frontend_re.is_match(key) {
                offenses.push(format!(
                    "frontend service id '{key}' must match {FRONTEND_ID_RE}"
                ));
            }
        }

        // name == map key.
        for (key, svc) in &self.backend {
            if &svc.name != key {
                offenses.push(format!(
                    "backend service at key '{key}' has mismatched name '{}'",
                    svc.name
                ));
            }
        }
        for (key, svc) in &self.frontend {
            if &svc.name != key {
                offenses.push(format!(
                    "frontend service at key '{key}' has mismatched name '{}'",
                    svc.name
                ));
            }
            if svc.platforms.is_empty() {
                offenses.push(format!(
                    "frontend service '{key}' must declare at least one platform"
                ));
            }
        }

        // Invariant 4: port uniqueness (P2/B1).
        let mut seen_backend_ports: BTreeMap<u16, String> = BTreeMap::new();
        for (key, svc) in &self.backend {
            for port in svc.ports.as_triple() {
                if let Some(owner) = seen_backend_ports.insert(port, key.clone()) {
                    if owner != *key {
                        offenses.push(format!(
                            "port {port} is used by both backend '{owner}' and backend '{key}'"
                        ));
                    } else {
                        offenses.push(format!(
                            "backend '{key}' reuses port {port} within its own ports triple"
                        ));
                    }
                }
            }
        }
        let mut seen_frontend_ports: BTreeMap<u16, String> = BTreeMap::new();
        for (key, svc) in &self.frontend {
            if let Some(owner) = seen_frontend_ports.insert(svc.web_port, key.clone()) {
                if owner != *key {
                    offenses.push(format!(
                        "web_port {} is used by both frontend '{owner}' and frontend '{key}'",
                        svc.web_port
                    ));
                }
            }
        }

        offenses
    }
}

/// Loads, validates, and atomically saves the project manifest.
pub struct ManifestStore {
    path: PathBuf,
    format: ManifestFormat,
}

impl ManifestStore {
    /// Points the store at `<repo_root>/egg.yaml` (or whichever of the three
    /// supported extensions is present). Does not read the file yet.
    pub fn at_repo_root(repo_root: &Path) -> Self {
        for candidate in [MANIFEST_FILE_NAME, "egg.yml", "egg.toml", "egg.json"] {
            let path = repo_root.join(candidate);
            if path.exists() {
                let format = ManifestFormat::from_extension(&path).unwrap_or(ManifestFormat::Yaml);
                return ManifestStore { path, format };
            }
        }
        ManifestStore {
            path: repo_root.join(MANIFEST_FILE_NAME),
            format: ManifestFormat::Yaml,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the manifest file.
    ///
    /// Fails with `ManifestNotFound` if absent, `ManifestCorrupt` if the
    /// document cannot be parsed in its detected (or any fallback) format.
    pub fn load(&self) -> Result<Project, EggError> {
        if !self.path.exists() {
            return Err(EggError::ManifestNotFound(self.path.display().to_string()));
        }
        let raw = fs::read_to_string(&self.path)?;
        parse_any_format(&raw, self.format)
            .map_err(|e| EggError::ManifestCorrupt(format!("{}: {e}", self.path.display())))
    }

    /// Validates and atomically writes the manifest (write-to-temp, then
    /// rename). Never touches the on-disk file if validation fails.
    pub fn save(&self, project: &Project) -> Result<(), EggError> {
        let offenses = project.validate();
        if !offenses.is_empty() {
            return Err(EggError::ManifestInvalid(offenses));
        }

        let serialized = serialize_in_format(project, self.format)
            .map_err(|e| EggError::ManifestCorrupt(e.to_string()))?;

        let tmp_path = self.path.with_extension(format!(
            "{}.tmp",
            self.path.extension().and_then(|e| e.to_str()).unwrap_or("yaml")
        ));
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn parse_any_format(raw: &str, preferred: ManifestFormat) -> Result<Project, String> {
    let attempts: [ManifestFormat; 3] = match preferred {
        ManifestFormat::Yaml => [ManifestFormat::Yaml, ManifestFormat::Toml, ManifestFormat::Json],
        ManifestFormat::Toml => [ManifestFormat::Toml, ManifestFormat::Yaml, ManifestFormat::Json],
        ManifestFormat::Json => [ManifestFormat::Json, ManifestFormat::Yaml, ManifestFormat::Toml],
    };

    let mut last_err = String::new();
    for fmt in attempts {
        match fmt {
            ManifestFormat::Yaml => match serde_yaml::from_str::<Project>(raw) {
                Ok(p) => return Ok(p),
                Err(e) => last_err = e.to_string(),
            },
            ManifestFormat::Toml => match toml::from_str::<Project>(raw) {
                Ok(p) => return Ok(p),
                Err(e) => last_err = e.to_string(),
            },
            ManifestFormat::Json => match serde_json::from_str::<Project>(raw) {
                Ok(p) => return Ok(p),
                Err(e) => last_err = e.to_string(),
            },
        }
    }
    Err(last_err)
}

fn serialize_in_format(project: &Project, format: ManifestFormat) -> Result<String, String> {
    match format {
        ManifestFormat::Yaml => serde_yaml::to_string(project).map_err(|e| e.to_string()),
        ManifestFormat::Toml => toml::to_string_pretty(project).map_err(|e| e.to_string()),
        ManifestFormat::Json => serde_json::to_string_pretty(project).map_err(|e| e.to_string()),
    }
}
