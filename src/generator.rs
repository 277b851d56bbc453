//! Generator Orchestrator (C5): drives `buf generate` and reconciles the
//! module graph afterward (spec §4.5).

use crate::core::error::EggError;
use crate::core::manifest::Project;
use crate::core::module_graph::{is_local_replace_mode, reconcile_generated_module, ModuleGraph, ModuleKind};
use crate::core::tool_invoker::ToolInvoker;
use std::path::Path;

const GENERATE_DEADLINE_SECS: u64 = 300;

pub struct GenerateReport {
    pub gen_module_path: String,
    pub tidied_modules: Vec<String>,
}

/// Runs the full `api generate` sequence: preflight, invoke `buf generate`,
/// scan outputs, reconcile, tidy. Steps 1-3 leave the filesystem untouched
/// beyond whatever `buf` itself wrote; step 4 is transactional and rolls
/// back entirely on failure (spec §4.5).
pub fn generate(
    repo_root: &Path,
    project: &Project,
    invoker: &ToolInvoker,
) -> Result<GenerateReport, EggError> {
    preflight(repo_root, invoker)?;

    let api_dir = repo_root.join("api");
    let result = invoker.run_with_env_in_dir_deadline(
        "buf",
        &["generate"],
        &api_dir,
        &[],
        Some(std::time::Duration::from_secs(GENERATE_DEADLINE_SECS)),
    )?;
    if !result.success() {
        return Err(EggError::GenerationFailed {
            exit_code: result.exit_code,
            stderr_tail: result.stderr_tail(200),
        });
    }

    let gen_go_has_sources = walk_has_extension(&repo_root.join("gen/go"), "go");
    if !gen_go_has_sources {
        return Ok(GenerateReport { gen_module_path: String::new(), tidied_modules: Vec::new() });
    }

    let mut graph = ModuleGraph::open(repo_root)?;
    let local_replace_mode = select_mode(&graph, &project.module_prefix)?;

    let reconcile_result = reconcile_generated_module(
        &mut graph,
        &project.module_prefix,
        "1.22",
        local_replace_mode,
    )
    .and_then(|gen_module_path| {
        graph.commit()?;
        Ok(gen_module_path)
    });

    let gen_module_path = match reconcile_result {
        Ok(path) => path,
        Err(err) => {
            return Err(EggError::Validation(format!(
                "code was generated but module wiring failed; see {err}"
            )));
        }
    };

    let mut tidy_targets: Vec<String> = graph
        .modules
        .values()
        .filter(|m| m.kind == ModuleKind::BackendService)
        .map(|m| m.module_path.clone())
        .collect();
    tidy_targets.sort();
    let mut all_targets = vec![gen_module_path.clone()];
    all_targets.extend(tidy_targets.clone());

    // §6.5: version-pin mode tidies against the `v0.0.0-dev` sentinel, which
    // no proxy or checksum database has ever heard of.
    let tidy_env: Vec<(String, String)> = if !local_replace_mode {
        vec![("GOPROXY".to_string(), "direct".to_string()), ("GOSUMDB".to_string(), "off".to_string())]
    } else {
        Vec::new()
    };
    graph.run_tidy(&all_targets, &tidy_env, invoker)?;

    Ok(GenerateReport { gen_module_path, tidied_modules: all_targets })
}

fn preflight(repo_root: &Path, invoker: &ToolInvoker) -> Result<(), EggError> {
    let buf_yaml = repo_root.join("api/buf.yaml");
    let buf_gen_yaml = repo_root.join("api/buf.gen.yaml");
    if !buf_yaml.exists() || !buf_gen_yaml.exists() {
        return Err(EggError::Validation(
            "api/buf.yaml and api/buf.gen.yaml must exist before `api generate` (run `init` first)"
                .into(),
        ));
    }

    let mut missing = Vec::new();
    for plugin in required_plugins() {
        if !invoker.is_available(plugin) {
            missing.push(plugin.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(EggError::ToolchainMissing(missing));
    }
    Ok(())
}

/// The fixed plugin set referenced by `project_init/buf_gen_yaml.tera`.
pub fn required_plugins() -> &'static [&'static str] {
    &["protoc-gen-go", "protoc-gen-connect-go", "protoc-gen-dart", "protoc-gen-openapi"]
}

/// Consults the first backend module (in module-path order, for
/// determinism) to decide local-replace vs. version-pin mode; aborts with
/// `InconsistentModes` if backends disagree (spec §4.5 "Mode selection").
fn select_mode(graph: &ModuleGraph, module_prefix: &str) -> Result<bool, EggError> {
    let mut backend_modes: Vec<(String, bool)> = graph
        .modules
        .values()
        .filter(|m| m.kind == ModuleKind::BackendService)
        .map(|m| (m.module_path.clone(), is_local_replace_mode(m, module_prefix)))
        .collect();
    backend_modes.sort_by(|a, b| a.0.cmp(&b.0));

    let Some((_, first_mode)) = backend_modes.first().cloned() else {
        return Ok(false);
    };
    let disagreeing: Vec<String> = backend_modes
        .iter()
        .filter(|(_, mode)| *mode != first_mode)
        .map(|(path, _)| path.clone())
        .collect();
    if !disagreeing.is_empty() {
        return Err(EggError::InconsistentModes(disagreeing.join(", ")));
    }
    Ok(first_mode)
}

fn walk_has_extension(dir: &Path, ext: &str) -> bool {
    if !dir.is_dir() {
        return false;
    }
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(ext)
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn preflight_fails_without_buf_config() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = ToolInvoker::new(false);
        let result = preflight(dir.path(), &invoker);
        assert!(matches!(result, Err(EggError::Validation(_))));
    }

    #[test]
    fn select_mode_ok_when_no_backends_exist() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("backend")).unwrap();
        let graph = ModuleGraph::open(dir.path()).unwrap();
        assert_eq!(select_mode(&graph, "example.com/shop").unwrap(), false);
    }

    #[test]
    fn select_mode_rejects_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("backend/a")).unwrap();
        fs::write(
            dir.path().join("backend/a/go.mod"),
            "module example.com/shop/backend/a\n\ngo 1.22\n\nreplace example.com/shop/gen/go => ../../gen/go\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("backend/b")).unwrap();
        fs::write(dir.path().join("backend/b/go.mod"), "module example.com/shop/backend/b\n\ngo 1.22\n")
            .unwrap();
        let graph = ModuleGraph::open(dir.path()).unwrap();
        let result = select_mode(&graph, "example.com/shop");
        assert!(matches!(result, Err(EggError::InconsistentModes(_))));
    }
}
