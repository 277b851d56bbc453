//! Command Dispatcher (C11): one `run()` entry point, one `match` over the
//! clap-derived verb, transaction discipline per write-shaped verb (spec
//! §4.11). Grounded on the teacher's `lib.rs::run()` monolithic match —
//! there is no separate dispatch-table layer, the `Command` enum itself is
//! the tagged sum of verb descriptors (spec §9).

use crate::builder::{self, BuildOptions};
use crate::cli::{
    ApiCommand, BuildCommand, Cli, Command, ComposeCommand, CreateCommand, KubeCommand,
};
use crate::compose;
use crate::core::error::EggError;
use crate::core::lock::RepoLock;
use crate::core::manifest::{
    BackendPorts, BackendService, FrontendService, ManifestStore, Project, ProtoTemplate,
};
use crate::core::module_graph::ModuleGraph;
use crate::core::ports::{self, PortCategory};
use crate::core::template_context::TemplateContext;
use crate::core::tool_invoker::ToolInvoker;
use crate::doctor;
use crate::generator;
use crate::helm;
use crate::templates::TemplateEngine;
use std::path::{Path, PathBuf};

pub fn run(cli: Cli, invoker: &ToolInvoker) -> Result<(), EggError> {
    if cli.version {
        println!("egg {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(command) = cli.command else {
        return Err(EggError::Validation("no command given; try `egg --help`".into()));
    };

    match command {
        Command::Version => {
            println!("egg {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init(init_cli) => {
            let repo_root = init_cli.dir.clone().unwrap_or(current_dir()?);
            run_init(&repo_root, &init_cli)
        }
        Command::Create(create_cli) => {
            let repo_root = current_dir()?;
            match create_cli.command {
                CreateCommand::Backend { service_id, proto_template } => {
                    run_create_backend(&repo_root, &service_id, proto_template.into())
                }
                CreateCommand::Frontend { service_id, platforms } => {
                    let platforms = platforms.into_iter().map(Into::into).collect();
                    run_create_frontend(&repo_root, &service_id, platforms)
                }
            }
        }
        Command::Api(api_cli) => {
            let repo_root = current_dir()?;
            match api_cli.command {
                ApiCommand::Generate => run_api_generate(&repo_root, invoker),
            }
        }
        Command::Build(build_cli) => {
            let repo_root = current_dir()?;
            run_build(&repo_root, build_cli.command, invoker)
        }
        Command::Compose(compose_cli) => {
            let repo_root = current_dir()?;
            run_compose(&repo_root, compose_cli.command, invoker)
        }
        Command::Kube(kube_cli) => {
            let repo_root = current_dir()?;
            run_kube(&repo_root, kube_cli.command, invoker)
        }
        Command::Doctor(doctor_cli) => {
            let repo_root = current_dir()?;
            if doctor_cli.install {
                let results = doctor::install_missing(invoker)?;
                for r in &results {
                    println!("{}: {:?} — {}", r.name, r.status, r.message);
                }
                Ok(())
            } else {
                let report = doctor::run(&repo_root, invoker);
                doctor::print_report(&report);
                if report.failed > 0 {
                    Err(EggError::ToolchainMissing(vec!["see doctor report above".to_string()]))
                } else {
                    Ok(())
                }
            }
        }
        Command::Check => run_check(&current_dir()?),
    }
}

fn current_dir() -> Result<PathBuf, EggError> {
    Ok(std::env::current_dir()?)
}

/// The fixed minimal `backend/go.work` content written by `init` (spec §4.2):
/// no `use` entries since no backend modules exist yet.
const EMPTY_WORKSPACE: &str = "go 1.22\n";

fn run_init(repo_root: &Path, init_cli: &crate::cli::InitCli) -> Result<(), EggError> {
    let _lock = RepoLock::acquire(repo_root)?;

    let store = ManifestStore::at_repo_root(repo_root);
    if store.path().exists() && !init_cli.force {
        return Err(EggError::FileExists(store.path().display().to_string()));
    }

    let mut project = Project::new(init_cli.project_name.clone(), init_cli.module_prefix.clone());
    project.docker_registry = init_cli.docker_registry.clone();

    let engine = TemplateEngine::new()?;
    let ctx = TemplateContext::new(project.clone());
    let project_ctx = ctx.tera_context_for_project();

    engine.write_file(
        "project_init/gitignore.tera",
        &repo_root.join(".gitignore"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/buf_yaml.tera",
        &repo_root.join("api/buf.yaml"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/buf_gen_yaml.tera",
        &repo_root.join("api/buf.gen.yaml"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/dockerfile_backend.tera",
        &repo_root.join("build/Dockerfile.backend"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/dockerfile_frontend.tera",
        &repo_root.join("build/Dockerfile.frontend"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/entrypoint_sh.tera",
        &repo_root.join("build/entrypoint.sh"),
        &project_ctx,
        init_cli.force,
    )?;
    engine.write_file(
        "project_init/nginx_conf.tera",
        &repo_root.join("build/nginx.conf"),
        &project_ctx,
        init_cli.force,
    )?;

    crate::templates::write_rendered(
        &repo_root.join("backend/go.work"),
        EMPTY_WORKSPACE.as_bytes(),
        init_cli.force,
    )?;

    store.save(&project)?;
    Ok(())
}

fn run_create_backend(
    repo_root: &Path,
    service_id: &str,
    proto_template: ProtoTemplate,
) -> Result<(), EggError> {
    let _lock = RepoLock::acquire(repo_root)?;

    let store = ManifestStore::at_repo_root(repo_root);
    let mut project = store.load()?;

    ports::validate_cross_type_name(&project, service_id, true)?;
    let (http, health, metrics) = ports::allocate_backend(&project)?;

    project.backend.insert(
        service_id.to_string(),
        BackendService {
            name: service_id.to_string(),
            proto_template,
            ports: BackendPorts { http, health, metrics },
        },
    );

    let engine = TemplateEngine::new()?;
    let ctx = TemplateContext::new(project.clone());
    let backend_ctx = ctx.tera_context_for_backend(service_id);
    let service_dir = repo_root.join("backend").join(service_id);

    // `ProtoTemplate::None` reuses the echo skeleton's Go scaffold but emits
    // no `.proto` IDL file at all.
    let template_set = match proto_template {
        ProtoTemplate::Crud => "backend_crud",
        ProtoTemplate::Echo | ProtoTemplate::None => "backend_echo",
    };

    engine.write_file(
        &format!("{template_set}/go_mod.tera"),
        &service_dir.join("go.mod"),
        &backend_ctx,
        false,
    )?;
    engine.write_file(
        &format!("{template_set}/cmd/server/main_go.tera"),
        &service_dir.join("cmd/server/main.go"),
        &backend_ctx,
        false,
    )?;
    engine.write_file(
        &format!("{template_set}/internal/config/config_go.tera"),
        &service_dir.join("internal/config/config.go"),
        &backend_ctx,
        false,
    )?;
    engine.write_file(
        &format!("{template_set}/internal/handler/handler_go.tera"),
        &service_dir.join("internal/handler/handler.go"),
        &backend_ctx,
        false,
    )?;
    if template_set == "backend_crud" {
        engine.write_file(
            "backend_crud/internal/service/service_go.tera",
            &service_dir.join("internal/service/service.go"),
            &backend_ctx,
            false,
        )?;
        engine.write_file(
            "backend_crud/internal/repository/repository_go.tera",
            &service_dir.join("internal/repository/repository.go"),
            &backend_ctx,
            false,
        )?;
        engine.write_file(
            "backend_crud/internal/model/model_go.tera",
            &service_dir.join("internal/model/model.go"),
            &backend_ctx,
            false,
        )?;
    }
    if !matches!(proto_template, ProtoTemplate::None) {
        engine.write_file(
            &format!("{template_set}/proto/service_proto.tera"),
            &repo_root.join("api").join(service_id).join("v1").join(format!("{service_id}.proto")),
            &backend_ctx,
            false,
        )?;
    }

    // Re-open the graph now that go.mod exists on disk: this picks up the
    // exact requires the template rendered, rather than the bare
    // `module ... \ngo ...` a freshly-created node would carry.
    let mut graph = ModuleGraph::open(repo_root)?;
    graph.ensure_workspace_use(&format!("./backend/{service_id}"))?;
    graph.commit()?;

    store.save(&project)?;
    Ok(())
}

fn run_create_frontend(
    repo_root: &Path,
    service_id: &str,
    platforms: Vec<crate::core::manifest::Platform>,
) -> Result<(), EggError> {
    let _lock = RepoLock::acquire(repo_root)?;

    let store = ManifestStore::at_repo_root(repo_root);
    let mut project = store.load()?;

    ports::validate_cross_type_name(&project, service_id, false)?;
    let web_port = ports::allocate_frontend(&project)?;

    project.frontend.insert(
        service_id.to_string(),
        FrontendService { name: service_id.to_string(), platforms, web_port },
    );

    let engine = TemplateEngine::new()?;
    let ctx = TemplateContext::new(project.clone());
    let frontend_ctx = ctx.tera_context_for_frontend(service_id);
    let service_dir = repo_root.join("frontend").join(service_id);

    engine.write_file(
        "frontend/pubspec_yaml.tera",
        &service_dir.join("pubspec.yaml"),
        &frontend_ctx,
        false,
    )?;
    engine.write_file(
        "frontend/main_dart.tera",
        &service_dir.join("lib/main.dart"),
        &frontend_ctx,
        false,
    )?;

    store.save(&project)?;
    Ok(())
}

fn run_api_generate(repo_root: &Path, invoker: &ToolInvoker) -> Result<(), EggError> {
    let _lock = RepoLock::acquire(repo_root)?;
    let store = ManifestStore::at_repo_root(repo_root);
    let project = store.load()?;
    let report = generator::generate(repo_root, &project, invoker)?;
    if report.gen_module_path.is_empty() {
        println!("no generated Go sources found under gen/go; nothing to reconcile");
    } else {
        println!("reconciled {} (tidied: {})", report.gen_module_path, report.tidied_modules.join(", "));
    }
    Ok(())
}

fn build_options(platform: &[String], local: bool, push: bool) -> BuildOptions {
    if local {
        BuildOptions::local()
    } else if !platform.is_empty() {
        BuildOptions { platforms: platform.to_vec(), push }
    } else {
        BuildOptions::default_multiarch()
    }
}

fn run_build(repo_root: &Path, command: BuildCommand, invoker: &ToolInvoker) -> Result<(), EggError> {
    let store = ManifestStore::at_repo_root(repo_root);
    let project = store.load()?;
    let ctx = TemplateContext::new(project.clone());

    match command {
        BuildCommand::Backend { service_id, platform, local, push } => {
            let opts = build_options(&platform, local, push);
            builder::build_backend(repo_root, &ctx, &service_id, &opts, invoker)
        }
        BuildCommand::Frontend { service_id, platform, local, push } => {
            let opts = build_options(&platform, local, push);
            builder::build_frontend(repo_root, &ctx, &service_id, &opts, invoker)
        }
        BuildCommand::All { platform, local, push } => {
            let opts = build_options(&platform, local, push);
            let report = builder::build_all(repo_root, &project, &opts, invoker);
            match report.failed {
                None => {
                    println!("built {} service(s)", report.completed.len());
                    Ok(())
                }
                Some((service_id, err)) => {
                    eprintln!(
                        "build failed at {service_id} after completing {}: {err}",
                        report.completed.join(", ")
                    );
                    Err(err)
                }
            }
        }
    }
}

fn run_compose(repo_root: &Path, command: ComposeCommand, invoker: &ToolInvoker) -> Result<(), EggError> {
    let compose_dir = repo_root.join("deploy/compose");
    let compose_file = compose_dir.join("compose.yaml");
    let store = ManifestStore::at_repo_root(repo_root);

    match command {
        ComposeCommand::Generate => {
            let _lock = RepoLock::acquire(repo_root)?;
            let project = store.load()?;
            compose::generate(repo_root, &project)
        }
        ComposeCommand::Up => {
            let path_str = compose_file.display().to_string();
            run_tool_passthrough(invoker, "docker", &["compose", "-f", &path_str, "up", "-d"], &compose_dir)
        }
        ComposeCommand::Down => {
            let path_str = compose_file.display().to_string();
            run_tool_passthrough(invoker, "docker", &["compose", "-f", &path_str, "down"], &compose_dir)
        }
        ComposeCommand::Logs { service } => {
            let path_str = compose_file.display().to_string();
            let mut args = vec!["compose", "-f", path_str.as_str(), "logs"];
            if let Some(s) = &service {
                args.push(s.as_str());
            }
            run_tool_passthrough(invoker, "docker", &args, &compose_dir)
        }
        ComposeCommand::Proxy { service, target_port, local_port } => {
            let project = store.load()?;
            let port = compose::proxy_start(&project, &hyphenate(&service), target_port, local_port, invoker)?;
            println!("proxying {service}:{target_port} -> 127.0.0.1:{port}");
            Ok(())
        }
        ComposeCommand::ProxyStop { service, port } => {
            compose::proxy_stop(&hyphenate(&service), port, invoker)
        }
    }
}

fn hyphenate(id: &str) -> String {
    crate::core::template_context::hyphenated(id)
}

fn run_kube(repo_root: &Path, command: KubeCommand, invoker: &ToolInvoker) -> Result<(), EggError> {
    let store = ManifestStore::at_repo_root(repo_root);

    match command {
        KubeCommand::Generate => {
            let _lock = RepoLock::acquire(repo_root)?;
            let project = store.load()?;
            let engine = TemplateEngine::new()?;
            helm::generate(repo_root, &project, &engine)?;
            Ok(())
        }
        KubeCommand::Template => {
            let project = store.load()?;
            let chart_dir = repo_root.join("deploy/helm").join(&project.project_name);
            let dir_str = chart_dir.display().to_string();
            run_tool_passthrough(invoker, "helm", &["template", &project.project_name, &dir_str], repo_root)
        }
        KubeCommand::Apply => {
            let project = store.load()?;
            let chart_dir = repo_root.join("deploy/helm").join(&project.project_name);
            let dir_str = chart_dir.display().to_string();
            run_tool_passthrough(
                invoker,
                "helm",
                &["upgrade", "--install", &project.project_name, &dir_str],
                repo_root,
            )
        }
        KubeCommand::Uninstall => {
            let project = store.load()?;
            run_tool_passthrough(invoker, "helm", &["uninstall", &project.project_name], repo_root)
        }
    }
}

/// Runs an external tool as the final step of a verb: a non-zero exit
/// propagates as the CLI's own exit code (spec §6.4), not a mapped error.
fn run_tool_passthrough(invoker: &ToolInvoker, tool: &str, args: &[&str], dir: &Path) -> Result<(), EggError> {
    let result = invoker.run_with_env_in_dir(tool, args, dir, &[])?;
    if !result.success() {
        return Err(EggError::ToolExit { tool: tool.to_string(), code: result.exit_code });
    }
    Ok(())
}

fn run_check(repo_root: &Path) -> Result<(), EggError> {
    let store = ManifestStore::at_repo_root(repo_root);
    let project = store.load()?;
    let offenses = project.validate();
    if !offenses.is_empty() {
        return Err(EggError::ManifestInvalid(offenses));
    }
    ModuleGraph::open(repo_root)?;
    println!("manifest and module graph are consistent");
    Ok(())
}
