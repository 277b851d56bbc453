//! Module Graph (C2): the typed, in-memory view of every Go module manifest
//! and the workspace file reachable from the repository root, with
//! transactional mutation and the generated-module reconciliation algorithm.
//!
//! Discovery walks `backend/*/go.mod` and `gen/go/go.mod`; parsing follows
//! the same line/block grammar any `go.mod` reader uses (`module`, `go`,
//! `require (...)`, `replace (...)`, with single-line forms of each). This
//! module also owns serialization, since the teacher's manifest readers it
//! is grounded on are read-only — writing canonical `go.mod`/`go.work` text
//! back out is new.

use crate::core::error::EggError;
use crate::core::tool_invoker::ToolInvoker;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Discriminates what role a discovered module plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    BackendService,
    GeneratedCode,
    FrameworkEgg,
    Unknown,
}

/// A dependency override: either a local filesystem path or a pinned
/// version, never both (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub target_module: String,
    pub path: Option<String>,
    pub version: Option<String>,
}

impl Replacement {
    pub fn local(target_module: impl Into<String>, path: impl Into<String>) -> Self {
        Replacement { target_module: target_module.into(), path: Some(path.into()), version: None }
    }
}

/// One parsed `go.mod`.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub manifest_path: PathBuf,
    pub module_path: String,
    pub language_version: String,
    pub requires: BTreeMap<String, String>,
    pub replaces: BTreeMap<String, Replacement>,
    pub kind: ModuleKind,
    dirty: bool,
    original_bytes: Option<Vec<u8>>,
}

impl ModuleNode {
    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("module {}\n\n", self.module_path));
        out.push_str(&format!("go {}\n", self.language_version));

        if !self.requires.is_empty() {
            out.push('\n');
            if self.requires.len() == 1 {
                let (m, v) = self.requires.iter().next().unwrap();
                out.push_str(&format!("require {m} {v}\n"));
            } else {
                out.push_str("require (\n");
                for (m, v) in &self.requires {
                    out.push_str(&format!("\t{m} {v}\n"));
                }
                out.push_str(")\n");
            }
        }

        if !self.replaces.is_empty() {
            out.push('\n');
            if self.replaces.len() == 1 {
                let r = self.replaces.values().next().unwrap();
                out.push_str(&format!("replace {}\n", render_replace_rhs(r)));
            } else {
                out.push_str("replace (\n");
                for r in self.replaces.values() {
                    out.push_str(&format!("\t{}\n", render_replace_rhs(r)));
                }
                out.push_str(")\n");
            }
        }
        out
    }
}

fn render_replace_rhs(r: &Replacement) -> String {
    let rhs = match (&r.path, &r.version) {
        (Some(p), _) => p.clone(),
        (None, Some(v)) => format!("{} {}", r.target_module, v),
        (None, None) => r.target_module.clone(),
    };
    format!("{} => {}", r.target_module, rhs)
}

/// The `backend/go.work` workspace file.
#[derive(Debug, Clone)]
pub struct WorkspaceFile {
    pub path: PathBuf,
    pub language_version: String,
    pub use_dirs: Vec<String>,
    dirty: bool,
    original_bytes: Option<Vec<u8>>,
}

impl WorkspaceFile {
    fn render(&self) -> String {
        let mut out = format!("go {}\n", self.language_version);
        for dir in &self.use_dirs {
            out.push_str(&format!("\nuse {dir}\n"));
        }
        out
    }
}

/// The in-memory typed snapshot of every module manifest and the workspace
/// file (spec §3.2).
pub struct ModuleGraph {
    pub workspace: Option<WorkspaceFile>,
    pub modules: BTreeMap<String, ModuleNode>,
    pub filesystem_root: PathBuf,
}

impl ModuleGraph {
    /// Discovers every `go.mod` under `backend/*/` and `gen/go`, plus the
    /// workspace file at `backend/go.work`. Discovery is order-insensitive;
    /// a missing `gen/go` is not an error.
    pub fn open(root: &Path) -> Result<Self, EggError> {
        let mut modules = BTreeMap::new();

        let backend_dir = root.join("backend");
        if backend_dir.is_dir() {
            for entry in fs::read_dir(&backend_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let go_mod = entry.path().join("go.mod");
                if go_mod.is_file() {
                    let node = parse_module(&go_mod, ModuleKind::BackendService)?;
                    modules.insert(node.module_path.clone(), node);
                }
            }
        }

        let gen_go_mod = root.join("gen/go/go.mod");
        if gen_go_mod.is_file() {
            let node = parse_module(&gen_go_mod, ModuleKind::GeneratedCode)?;
            modules.insert(node.module_path.clone(), node);
        }

        let workspace_path = root.join("backend/go.work");
        let workspace = if workspace_path.is_file() {
            Some(parse_workspace(&workspace_path)?)
        } else {
            None
        };

        Ok(ModuleGraph { workspace, modules, filesystem_root: root.to_path_buf() })
    }

    /// Records a replace directive. Fails with `ReplaceConflict` if a
    /// differing replace for `target` already exists, unless `overwrite`.
    pub fn add_replace(
        &mut self,
        module_path: &str,
        target: &str,
        replacement: Replacement,
        overwrite: bool,
    ) -> Result<(), EggError> {
        let node = self.module_mut(module_path)?;
        if let Some(existing) = node.replaces.get(target) {
            if existing != &replacement && !overwrite {
                return Err(EggError::ReplaceConflict {
                    module: module_path.to_string(),
                    existing: render_replace_rhs(existing),
                    requested: render_replace_rhs(&replacement),
                });
            }
        }
        node.replaces.insert(target.to_string(), replacement);
        node.dirty = true;
        Ok(())
    }

    /// Idempotent: removing an absent replace directive is not an error.
    pub fn remove_replace(&mut self, module_path: &str, target: &str) -> Result<(), EggError> {
        let node = self.module_mut(module_path)?;
        if node.replaces.remove(target).is_some() {
            node.dirty = true;
        }
        Ok(())
    }

    pub fn ensure_require(&mut self, module_path: &str, target: &str, version: &str) -> Result<(), EggError> {
        let node = self.module_mut(module_path)?;
        if node.requires.get(target).map(|v| v.as_str()) != Some(version) {
            node.requires.insert(target.to_string(), version.to_string());
            node.dirty = true;
        }
        Ok(())
    }

    /// Materializes a new module node. The manifest file must not already
    /// exist on disk.
    pub fn create_module(
        &mut self,
        manifest_path: PathBuf,
        module_path: String,
        language_version: String,
        kind: ModuleKind,
    ) -> Result<(), EggError> {
        if manifest_path.exists() {
            return Err(EggError::Validation(format!(
                "module manifest already exists at {}",
                manifest_path.display()
            )));
        }
        self.modules.insert(
            module_path.clone(),
            ModuleNode {
                manifest_path,
                module_path,
                language_version,
                requires: BTreeMap::new(),
                replaces: BTreeMap::new(),
                kind,
                dirty: true,
                original_bytes: None,
            },
        );
        Ok(())
    }

    /// Adds `relative_dir` to the workspace `use` list if absent. Creates
    /// the workspace file (toolchain version taken from the first
    /// discovered module) if it does not exist yet.
    pub fn ensure_workspace_use(&mut self, relative_dir: &str) -> Result<(), EggError> {
        if self.workspace.is_none() {
            let language_version = self
                .modules
                .values()
                .next()
                .map(|m| m.language_version.clone())
                .unwrap_or_else(|| "1.22".to_string());
            self.workspace = Some(WorkspaceFile {
                path: self.filesystem_root.join("backend/go.work"),
                language_version,
                use_dirs: Vec::new(),
                dirty: true,
                original_bytes: None,
            });
        }
        let ws = self.workspace.as_mut().unwrap();
        if !ws.use_dirs.iter().any(|d| d == relative_dir) {
            ws.use_dirs.push(relative_dir.to_string());
            ws.dirty = true;
        }
        Ok(())
    }

    fn module_mut(&mut self, module_path: &str) -> Result<&mut ModuleNode, EggError> {
        self.modules
            .get_mut(module_path)
            .ok_or_else(|| EggError::Validation(format!("unknown module: {module_path}")))
    }

    /// Writes every dirty node back to disk atomically (temp + rename per
    /// file). Rolls back all earlier writes in this commit if any later
    /// write fails, restoring the bytes cached at `open`. Never partially
    /// commits.
    pub fn commit(&mut self) -> Result<(), EggError> {
        let mut written: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();

        let result = (|| -> Result<(), EggError> {
            for node in self.modules.values() {
                if !node.dirty {
                    continue;
                }
                written.push((node.manifest_path.clone(), node.original_bytes.clone()));
                atomic_write(&node.manifest_path, node.render().as_bytes())?;
            }
            if let Some(ws) = &self.workspace {
                if ws.dirty {
                    written.push((ws.path.clone(), ws.original_bytes.clone()));
                    atomic_write(&ws.path, ws.render().as_bytes())?;
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                for node in self.modules.values_mut() {
                    node.dirty = false;
                    node.original_bytes = Some(node.render().into_bytes());
                }
                if let Some(ws) = self.workspace.as_mut() {
                    ws.dirty = false;
                    ws.original_bytes = Some(ws.render().into_bytes());
                }
                Ok(())
            }
            Err(err) => {
                for (path, original) in written.into_iter().rev() {
                    match original {
                        Some(bytes) => {
                            let _ = fs::write(&path, bytes);
                        }
                        None => {
                            let _ = fs::remove_file(&path);
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Invokes the external Go toolchain to tidy imports for each given
    /// module. Any non-zero exit aborts (the caller's transaction is left
    /// to decide how to react; this function does not itself roll back
    /// `commit`, which has already landed on disk by the time tidy runs,
    /// per the reconciliation algorithm's ordering).
    pub fn run_tidy(
        &self,
        module_paths: &[String],
        env: &[(String, String)],
        invoker: &ToolInvoker,
    ) -> Result<(), EggError> {
        for module_path in module_paths {
            let node = self
                .modules
                .get(module_path)
                .ok_or_else(|| EggError::Validation(format!("unknown module: {module_path}")))?;
            let dir = node
                .manifest_path
                .parent()
                .ok_or_else(|| EggError::Validation("module manifest has no parent dir".into()))?;
            invoker.run_with_env_in_dir("go", &["mod", "tidy"], dir, env)?;
        }
        Ok(())
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EggError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp_write");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn parse_module(path: &Path, kind: ModuleKind) -> Result<ModuleNode, EggError> {
    let raw = fs::read_to_string(path)?;
    let mut module_path = String::new();
    let mut language_version = "1.22".to_string();
    let mut requires = BTreeMap::new();
    let mut replaces = BTreeMap::new();

    let mut in_require_block = false;
    let mut in_replace_block = false;

    for line in raw.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("module ") {
            module_path = rest.trim().to_string();
            continue;
        }
        if let Some(rest) = line.strip_prefix("go ") {
            language_version = rest.trim().to_string();
            continue;
        }
        if line == "require (" {
            in_require_block = true;
            continue;
        }
        if line == "replace (" {
            in_replace_block = true;
            continue;
        }
        if line == ")" {
            in_require_block = false;
            in_replace_block = false;
            continue;
        }
        if let Some(rest) = line.strip_prefix("require ") {
            if let Some((m, v)) = parse_require(rest) {
                requires.insert(m, v);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("replace ") {
            if let Some(r) = parse_replace(rest) {
                replaces.insert(r.target_module.clone(), r);
            }
            continue;
        }
        if in_require_block {
            if let Some((m, v)) = parse_require(line) {
                requires.insert(m, v);
            }
        } else if in_replace_block {
            if let Some(r) = parse_replace(line) {
                replaces.insert(r.target_module.clone(), r);
            }
        }
    }

    if module_path.is_empty() {
        return Err(EggError::Validation(format!(
            "no module declaration in {}",
            path.display()
        )));
    }

    Ok(ModuleNode {
        manifest_path: path.to_path_buf(),
        module_path,
        language_version,
        requires,
        replaces,
        kind,
        dirty: false,
        original_bytes: Some(raw.into_bytes()),
    })
}

fn parse_require(line: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [m, v, ..] => Some((m.to_string(), v.to_string())),
        _ => None,
    }
}

fn parse_replace(line: &str) -> Option<Replacement> {
    let parts: Vec<&str> = line.splitn(2, "=>").collect();
    if parts.len() != 2 {
        return None;
    }
    let target_module = parts[0].split_whitespace().next()?.to_string();
    let rhs = parts[1].trim();
    let rhs_parts: Vec<&str> = rhs.split_whitespace().collect();
    if rhs_parts.is_empty() {
        return None;
    }
    if rhs_parts[0].starts_with('.') || rhs_parts[0].starts_with('/') {
        Some(Replacement { target_module, path: Some(rhs_parts[0].to_string()), version: None })
    } else if rhs_parts.len() >= 2 {
        Some(Replacement {
            target_module: target_module.clone(),
            path: None,
            version: Some(rhs_parts[1].to_string()),
        })
    } else {
        Some(Replacement { target_module, path: None, version: Some(rhs_parts[0].to_string()) })
    }
}

fn parse_workspace(path: &Path) -> Result<WorkspaceFile, EggError> {
    let raw = fs::read_to_string(path)?;
    let mut language_version = "1.22".to_string();
    let mut use_dirs = Vec::new();

    for line in raw.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("go ") {
            language_version = rest.trim().to_string();
            continue;
        }
        if let Some(rest) = line.strip_prefix("use ") {
            use_dirs.push(rest.trim().to_string());
        }
    }

    Ok(WorkspaceFile {
        path: path.to_path_buf(),
        language_version,
        use_dirs,
        dirty: false,
        original_bytes: Some(raw.into_bytes()),
    })
}

/// Generated-Module Reconciliation (spec §4.2 / §4.5).
///
/// `local_replace_mode` is the mode the orchestrator already decided on
/// (consulting the first backend module, per §4.5 "Mode selection") before
/// calling in. This function only applies it.
pub fn reconcile_generated_module(
    graph: &mut ModuleGraph,
    module_prefix: &str,
    language_version: &str,
    local_replace_mode: bool,
) -> Result<String, EggError> {
    let gen_module_path = format!("{module_prefix}/gen/go");

    if !graph.modules.contains_key(&gen_module_path) {
        graph.create_module(
            graph.filesystem_root.join("gen/go/go.mod"),
            gen_module_path.clone(),
            language_version.to_string(),
            ModuleKind::GeneratedCode,
        )?;
    }

    let backend_module_paths: Vec<String> = graph
        .modules
        .values()
        .filter(|m| m.kind == ModuleKind::BackendService)
        .map(|m| m.module_path.clone())
        .collect();

    for backend_path in &backend_module_paths {
        if local_replace_mode {
            graph.add_replace(
                backend_path,
                &gen_module_path,
                Replacement::local(gen_module_path.clone(), "../../gen/go"),
                true,
            )?;
        } else {
            graph.remove_replace(backend_path, &gen_module_path)?;
            graph.ensure_require(backend_path, &gen_module_path, "v0.0.0-dev")?;
        }
    }

    graph.ensure_workspace_use("./gen/go")?;

    Ok(gen_module_path)
}

/// Determines whether a backend module is already in local-replace mode
/// for its internal (non-stdlib-looking, same-prefix) dependencies. Used
/// by the Generator Orchestrator's mode-selection step (§4.5).
pub fn is_local_replace_mode(node: &ModuleNode, module_prefix: &str) -> bool {
    node.replaces
        .keys()
        .any(|target| target.starts_with(module_prefix) && node.replaces[target].path.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn parses_single_line_require_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let go_mod = dir.path().join("backend/user/go.mod");
        write(
            &go_mod,
            "module example.com/shop/backend/user\n\ngo 1.22\n\nrequire example.com/shop/gen/go v0.0.0-dev\n",
        );
        let node = parse_module(&go_mod, ModuleKind::BackendService).unwrap();
        assert_eq!(node.module_path, "example.com/shop/backend/user");
        assert_eq!(
            node.requires.get("example.com/shop/gen/go"),
            Some(&"v0.0.0-dev".to_string())
        );
    }

    #[test]
    fn parses_block_form_require_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let go_mod = dir.path().join("backend/user/go.mod");
        write(
            &go_mod,
            "module example.com/shop/backend/user\n\ngo 1.22\n\nrequire (\n\texample.com/shop/gen/go v0.0.0-dev\n)\n\nreplace (\n\texample.com/shop/gen/go => ../../gen/go\n)\n",
        );
        let node = parse_module(&go_mod, ModuleKind::BackendService).unwrap();
        assert_eq!(node.requires.len(), 1);
        assert_eq!(
            node.replaces.get("example.com/shop/gen/go").unwrap().path.as_deref(),
            Some("../../gen/go")
        );
    }

    #[test]
    fn reconcile_creates_gen_module_and_wires_version_pin_mode() {
        let dir = tempfile::tempdir().unwrap();
        let backend_mod = dir.path().join("backend/user/go.mod");
        write(&backend_mod, "module example.com/shop/backend/user\n\ngo 1.22\n");
        let mut graph = ModuleGraph::open(dir.path()).unwrap();

        let gen_path = reconcile_generated_module(&mut graph, "example.com/shop", "1.22", false).unwrap();
        assert_eq!(gen_path, "example.com/shop/gen/go");
        assert!(graph.modules.contains_key(&gen_path));
        let backend = &graph.modules["example.com/shop/backend/user"];
        assert_eq!(backend.requires.get(&gen_path), Some(&"v0.0.0-dev".to_string()));
        assert!(!backend.replaces.contains_key(&gen_path));
        assert_eq!(graph.workspace.as_ref().unwrap().use_dirs, vec!["./gen/go".to_string()]);

        graph.commit().unwrap();
        assert!(dir.path().join("gen/go/go.mod").exists());
        assert!(dir.path().join("backend/go.work").exists());
    }

    #[test]
    fn reconcile_local_replace_mode_wires_replace_not_require() {
        let dir = tempfile::tempdir().unwrap();
        let backend_mod = dir.path().join("backend/user/go.mod");
        write(&backend_mod, "module example.com/shop/backend/user\n\ngo 1.22\n");
        let mut graph = ModuleGraph::open(dir.path()).unwrap();
        let gen_path = reconcile_generated_module(&mut graph, "example.com/shop", "1.22", true).unwrap();
        let backend = &graph.modules["example.com/shop/backend/user"];
        assert!(backend.replaces.contains_key(&gen_path));
        assert!(!backend.requires.contains_key(&gen_path));
    }

    #[test]
    fn workspace_use_entry_is_added_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("backend")).unwrap();
        let mut graph = ModuleGraph::open(dir.path()).unwrap();
        graph.ensure_workspace_use("./gen/go").unwrap();
        graph.ensure_workspace_use("./gen/go").unwrap();
        assert_eq!(graph.workspace.as_ref().unwrap().use_dirs.len(), 1);
    }

    #[test]
    fn add_replace_conflict_without_overwrite_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend_mod = dir.path().join("backend/user/go.mod");
        write(&backend_mod, "module example.com/shop/backend/user\n\ngo 1.22\n");
        let mut graph = ModuleGraph::open(dir.path()).unwrap();
        graph
            .add_replace(
                "example.com/shop/backend/user",
                "example.com/shop/gen/go",
                Replacement::local("example.com/shop/gen/go", "../../gen/go"),
                false,
            )
            .unwrap();
        let result = graph.add_replace(
            "example.com/shop/backend/user",
            "example.com/shop/gen/go",
            Replacement::local("example.com/shop/gen/go", "../../other"),
            false,
        );
        assert!(matches!(result, Err(EggError::ReplaceConflict { .. })));
    }

    #[test]
    fn commit_rolls_back_all_writes_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend_mod = dir.path().join("backend/user/go.mod");
        write(&backend_mod, "module example.com/shop/backend/user\n\ngo 1.22\n");
        let other_mod = dir.path().join("backend/order/go.mod");
        write(&other_mod, "module example.com/shop/backend/order\n\ngo 1.22\n");

        let mut graph = ModuleGraph::open(dir.path()).unwrap();
        graph
            .ensure_require("example.com/shop/backend/user", "example.com/shop/gen/go", "v0.0.0-dev")
            .unwrap();
        graph
            .ensure_require("example.com/shop/backend/order", "example.com/shop/gen/go", "v0.0.0-dev")
            .unwrap();

        // Make the second write target unwritable by replacing its manifest
        // path with a directory, forcing `fs::write` to fail mid-commit.
        let node = graph.modules.get_mut("example.com/shop/backend/order").unwrap();
        let bogus_dir = dir.path().join("bogus_dir_as_file");
        fs::create_dir_all(&bogus_dir).unwrap();
        node.manifest_path = bogus_dir;

        let before_user = fs::read_to_string(&backend_mod).unwrap();
        let result = graph.commit();
        assert!(result.is_err());
        let after_user = fs::read_to_string(&backend_mod).unwrap();
        assert_eq!(before_user, after_user);
    }
}
