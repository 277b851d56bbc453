//! Doctor (C10): read-only capability probe, with an opt-in remediation
//! path for the protobuf plugin subset the Go toolchain can install.
//!
//! Grounded on the teacher's `plugins/doctor.rs` shape (a flat list of
//! independent checks folded into pass/fail/warn counts) and its
//! `core/validate.rs` colored status-line idiom.

use crate::core::error::EggError;
use crate::core::tool_invoker::ToolInvoker;
use crate::generator::required_plugins;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

/// The plugin subset doctor manages via `go install` (spec §4.10): the
/// same set the Generator Orchestrator requires, each pinned to a known
/// version. Anything not in this table is reported as "install manually".
const MANAGED_PLUGINS: &[(&str, &str)] = &[
    ("protoc-gen-go", "google.golang.org/protobuf/cmd/protoc-gen-go@v1.34.2"),
    ("protoc-gen-connect-go", "connectrpc.com/connect/cmd/protoc-gen-connect-go@v1.16.2"),
];

/// Plugins outside the managed set, with the canonical install command an
/// operator should run themselves.
const UNMANAGED_PLUGINS: &[(&str, &str)] = &[
    ("protoc-gen-dart", "dart pub global activate protoc_plugin"),
    ("protoc-gen-openapi", "go install github.com/google/gnostic/cmd/protoc-gen-openapi@latest"),
];

/// Runs every probe and returns the aggregate report. Never mutates the
/// manifest or module graph (spec §4.10).
pub fn run(repo_root: &Path, invoker: &ToolInvoker) -> DoctorReport {
    let mut checks = Vec::new();

    checks.push(check_go_toolchain(invoker));
    checks.push(check_container_runtime(invoker));
    checks.push(check_buildx(invoker));
    checks.push(check_protobuf_driver(invoker));
    for plugin in required_plugins() {
        checks.push(check_plugin(invoker, plugin));
    }
    checks.push(check_optional_cli(invoker, "kubectl", &["version", "--client"]));
    checks.push(check_optional_cli(invoker, "helm", &["version"]));
    checks.push(check_manifest_present(repo_root));

    summarize(checks)
}

/// `doctor --install`: installs every managed plugin that is currently
/// missing via `go install <pinned-version>`. Returns one `CheckResult`
/// per attempted installation. Plugins outside the managed set are never
/// touched; callers should print the manual command from `unmanaged_hint`.
pub fn install_missing(invoker: &ToolInvoker) -> Result<Vec<CheckResult>, EggError> {
    let mut results = Vec::new();
    for (plugin, install_target) in MANAGED_PLUGINS {
        if invoker.is_available(plugin) {
            results.push(CheckResult {
                name: format!("Install: {plugin}"),
                status: CheckStatus::Pass,
                message: "already present".to_string(),
            });
            continue;
        }
        let outcome = invoker.run("go", &["install", install_target]);
        match outcome {
            Ok(result) if result.success() => results.push(CheckResult {
                name: format!("Install: {plugin}"),
                status: CheckStatus::Pass,
                message: format!("installed via {install_target}"),
            }),
            Ok(result) => results.push(CheckResult {
                name: format!("Install: {plugin}"),
                status: CheckStatus::Fail,
                message: format!("go install failed: {}", result.stderr_tail(5)),
            }),
            Err(e) => results.push(CheckResult {
                name: format!("Install: {plugin}"),
                status: CheckStatus::Fail,
                message: e.to_string(),
            }),
        }
    }
    Ok(results)
}

/// The manual install command for a plugin outside the managed set, if
/// any. Returns `None` for plugins doctor can install itself.
pub fn unmanaged_hint(plugin: &str) -> Option<&'static str> {
    UNMANAGED_PLUGINS
        .iter()
        .find(|(name, _)| *name == plugin)
        .map(|(_, cmd)| *cmd)
}

fn check_go_toolchain(invoker: &ToolInvoker) -> CheckResult {
    match invoker.run("go", &["version"]) {
        Ok(result) if result.success() => CheckResult {
            name: "Go toolchain".to_string(),
            status: CheckStatus::Pass,
            message: result.stdout.trim().to_string(),
        },
        Ok(result) => CheckResult {
            name: "Go toolchain".to_string(),
            status: CheckStatus::Fail,
            message: format!("go version exited non-zero: {}", result.stderr_tail(3)),
        },
        Err(_) => CheckResult {
            name: "Go toolchain".to_string(),
            status: CheckStatus::Fail,
            message: "go not found on PATH".to_string(),
        },
    }
}

fn check_container_runtime(invoker: &ToolInvoker) -> CheckResult {
    match invoker.run("docker", &["version", "--format", "{{.Server.Version}}"]) {
        Ok(result) if result.success() => CheckResult {
            name: "Container runtime".to_string(),
            status: CheckStatus::Pass,
            message: format!("docker server {}", result.stdout.trim()),
        },
        _ => CheckResult {
            name: "Container runtime".to_string(),
            status: CheckStatus::Fail,
            message: "docker not available or daemon unreachable".to_string(),
        },
    }
}

fn check_buildx(invoker: &ToolInvoker) -> CheckResult {
    match invoker.run("docker", &["buildx", "version"]) {
        Ok(result) if result.success() => CheckResult {
            name: "Multi-arch builder (buildx)".to_string(),
            status: CheckStatus::Pass,
            message: result.stdout.trim().to_string(),
        },
        _ => CheckResult {
            name: "Multi-arch builder (buildx)".to_string(),
            status: CheckStatus::Fail,
            message: "docker buildx plugin not available".to_string(),
        },
    }
}

fn check_protobuf_driver(invoker: &ToolInvoker) -> CheckResult {
    match invoker.run("buf", &["--version"]) {
        Ok(result) if result.success() => CheckResult {
            name: "Protobuf driver (buf)".to_string(),
            status: CheckStatus::Pass,
            message: result.stdout.trim().to_string(),
        },
        _ => CheckResult {
            name: "Protobuf driver (buf)".to_string(),
            status: CheckStatus::Fail,
            message: "buf not found on PATH".to_string(),
        },
    }
}

fn check_plugin(invoker: &ToolInvoker, plugin: &str) -> CheckResult {
    if invoker.is_available(plugin) {
        CheckResult {
            name: format!("Plugin: {plugin}"),
            status: CheckStatus::Pass,
            message: "present on PATH".to_string(),
        }
    } else {
        let hint = unmanaged_hint(plugin)
            .map(|cmd| format!(" (install manually: {cmd})"))
            .unwrap_or_default();
        CheckResult {
            name: format!("Plugin: {plugin}"),
            status: CheckStatus::Fail,
            message: format!("not found on PATH{hint}"),
        }
    }
}

fn check_optional_cli(invoker: &ToolInvoker, tool: &str, version_args: &[&str]) -> CheckResult {
    if !invoker.is_available(tool) {
        return CheckResult {
            name: format!("Optional: {tool}"),
            status: CheckStatus::Warn,
            message: "not found on PATH (optional)".to_string(),
        };
    }
    match invoker.run(tool, version_args) {
        Ok(result) => CheckResult {
            name: format!("Optional: {tool}"),
            status: CheckStatus::Pass,
            message: result.stdout.lines().next().unwrap_or("present").to_string(),
        },
        Err(_) => CheckResult {
            name: format!("Optional: {tool}"),
            status: CheckStatus::Warn,
            message: "present on PATH but failed to report a version".to_string(),
        },
    }
}

fn check_manifest_present(repo_root: &Path) -> CheckResult {
    let found = ["egg.yaml", "egg.yml", "egg.toml", "egg.json"]
        .iter()
        .any(|name| repo_root.join(name).exists());
    if found {
        CheckResult {
            name: "Manifest".to_string(),
            status: CheckStatus::Pass,
            message: "present".to_string(),
        }
    } else {
        CheckResult {
            name: "Manifest".to_string(),
            status: CheckStatus::Warn,
            message: "no egg manifest found (run `egg init`)".to_string(),
        }
    }
}

fn summarize(checks: Vec<CheckResult>) -> DoctorReport {
    let passed = checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
    let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warn).count();
    DoctorReport { checks, passed, failed, warnings }
}

/// Prints the report in the teacher's colored pass/fail/warn idiom.
pub fn print_report(report: &DoctorReport) {
    println!("egg doctor — capability probe\n");
    for check in &report.checks {
        match check.status {
            CheckStatus::Pass => println!("    {} {}: {}", "●".bright_green(), check.name.bright_white(), check.message),
            CheckStatus::Fail => println!("    {} {}: {}", "●".bright_red(), check.name.bright_white(), check.message),
            CheckStatus::Warn => println!("    {} {}: {}", "●".bright_yellow(), check.name.bright_white(), check.message),
        }
    }
    println!(
        "\nSummary: {} passed, {} failed, {} warnings",
        report.passed, report.failed, report.warnings
    );
}
