//! Build Orchestrator (C6): produces container images from backend and
//! frontend services (spec §4.6).

use crate::core::error::EggError;
use crate::core::manifest::Project;
use crate::core::template_context::TemplateContext;
use crate::core::tool_invoker::ToolInvoker;
use std::fs;
use std::path::Path;
use std::time::Duration;

const BUILD_DEADLINE_SECS: u64 = 1800;

/// Target platforms + push/load mode for a single build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub platforms: Vec<String>,
    pub push: bool,
}

impl BuildOptions {
    /// The batch verb's default: multi-arch, pushed.
    pub fn default_multiarch() -> Self {
        BuildOptions { platforms: default_platforms(), push: true }
    }

    /// `build --local`: host platform only, never pushed.
    pub fn local() -> Self {
        BuildOptions { platforms: vec![host_platform()], push: false }
    }

    fn preflight(&self) -> Result<(), EggError> {
        if self.platforms.len() > 1 && !self.push {
            return Err(EggError::PushRequiredForMultiArch);
        }
        Ok(())
    }
}

fn default_platforms() -> Vec<String> {
    vec!["linux/amd64".to_string(), "linux/arm64".to_string()]
}

#[cfg(target_arch = "x86_64")]
fn host_platform() -> String {
    "linux/amd64".to_string()
}
#[cfg(target_arch = "aarch64")]
fn host_platform() -> String {
    "linux/arm64".to_string()
}
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn host_platform() -> String {
    "linux/amd64".to_string()
}

/// Outcome of a `build all` batch run (spec §4.6): the set of services that
/// completed before the first failure, if any.
pub struct BatchReport {
    pub completed: Vec<String>,
    pub failed: Option<(String, EggError)>,
}

pub fn build_backend(
    repo_root: &Path,
    ctx: &TemplateContext,
    service_id: &str,
    opts: &BuildOptions,
    invoker: &ToolInvoker,
) -> Result<(), EggError> {
    opts.preflight()?;
    let dockerfile = repo_root.join("build/Dockerfile.backend");
    let tag = ctx.full_image(service_id);
    let module_path = ctx.backend_module_path(service_id);

    run_buildx(
        repo_root,
        &dockerfile,
        &tag,
        opts,
        &[
            ("SERVICE_ID".to_string(), service_id.to_string()),
            ("MODULE_PATH".to_string(), module_path),
        ],
        invoker,
    )
}

pub fn build_frontend(
    repo_root: &Path,
    ctx: &TemplateContext,
    service_id: &str,
    opts: &BuildOptions,
    invoker: &ToolInvoker,
) -> Result<(), EggError> {
    opts.preflight()?;

    let frontend_dir = repo_root.join("frontend").join(service_id);
    invoker.run_with_env_in_dir(
        "flutter",
        &["build", "web"],
        &frontend_dir,
        &[],
    )?;

    let staged = repo_root.join("bin/frontend").join(service_id);
    if staged.exists() {
        fs::remove_dir_all(&staged)?;
    }
    copy_dir_recursive(&frontend_dir.join("build/web"), &staged)?;

    let dockerfile = repo_root.join("build/Dockerfile.frontend");
    let tag = ctx.full_image(service_id);
    run_buildx(
        repo_root,
        &dockerfile,
        &tag,
        opts,
        &[("SERVICE_ID".to_string(), service_id.to_string())],
        invoker,
    )
}

fn run_buildx(
    repo_root: &Path,
    dockerfile: &Path,
    tag: &str,
    opts: &BuildOptions,
    build_args: &[(String, String)],
    invoker: &ToolInvoker,
) -> Result<(), EggError> {
    let platform_list = opts.platforms.join(",");
    let mut args: Vec<String> = vec![
        "buildx".to_string(),
        "build".to_string(),
        "--platform".to_string(),
        platform_list,
        "-f".to_string(),
        dockerfile.display().to_string(),
        "-t".to_string(),
        tag.to_string(),
        "--label".to_string(),
        format!("org.opencontainers.image.created={}", chrono::Utc::now().to_rfc3339()),
    ];
    for (k, v) in build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{k}={v}"));
    }
    args.push(if opts.push { "--push".to_string() } else { "--load".to_string() });
    args.push(".".to_string());

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = invoker.run_with_env_in_dir_deadline(
        "docker",
        &arg_refs,
        repo_root,
        &[],
        Some(Duration::from_secs(BUILD_DEADLINE_SECS)),
    )?;
    if !result.success() {
        return Err(EggError::ToolExit { tool: "docker".to_string(), code: result.exit_code });
    }
    Ok(())
}

/// `build all`: backends first (no interdependence), then frontends. A
/// failure in any single service aborts the remainder.
pub fn build_all(
    repo_root: &Path,
    project: &Project,
    opts: &BuildOptions,
    invoker: &ToolInvoker,
) -> BatchReport {
    let ctx = TemplateContext::new(project.clone());
    let mut completed = Vec::new();

    for service_id in project.backend.keys() {
        match build_backend(repo_root, &ctx, service_id, opts, invoker) {
            Ok(()) => completed.push(service_id.clone()),
            Err(err) => return BatchReport { completed, failed: Some((service_id.clone(), err)) },
        }
    }
    for service_id in project.frontend.keys() {
        match build_frontend(repo_root, &ctx, service_id, opts, invoker) {
            Ok(()) => completed.push(service_id.clone()),
            Err(err) => return BatchReport { completed, failed: Some((service_id.clone(), err)) },
        }
    }

    BatchReport { completed, failed: None }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), EggError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiarch_without_push_is_rejected() {
        let opts = BuildOptions { platforms: default_platforms(), push: false };
        assert!(matches!(opts.preflight(), Err(EggError::PushRequiredForMultiArch)));
    }

    #[test]
    fn single_platform_without_push_is_allowed() {
        let opts = BuildOptions::local();
        assert!(opts.preflight().is_ok());
    }

    #[test]
    fn default_multiarch_requires_push() {
        let opts = BuildOptions::default_multiarch();
        assert!(opts.push);
        assert_eq!(opts.platforms.len(), 2);
    }

    #[test]
    fn copy_dir_recursive_mirrors_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        fs::write(src.path().join("sub/b.txt"), b"b").unwrap();

        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("out");
        copy_dir_recursive(src.path(), &target).unwrap();
        assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(target.join("sub/b.txt")).unwrap(), b"b");
    }
}
