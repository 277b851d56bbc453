//! CLI surface definitions (spec §6.1). All clap-derived types live here;
//! dispatch logic lives in `dispatch.rs`.

use crate::core::manifest::{Platform, ProtoTemplate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "egg",
    version = env!("CARGO_PKG_VERSION"),
    about = "egg scaffolds and drives the build/generate/deploy lifecycle of a polyglot microservice project",
    disable_version_flag = true
)]
pub struct Cli {
    /// Increase log density: stream every invoked tool's stdout/stderr.
    #[clap(long, short = 'V', global = true)]
    pub verbose: bool,

    /// Short-form version print. Never consumes positional args.
    #[clap(long = "version", short = 'v', global = true)]
    pub version: bool,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scaffold a new project in the target directory
    Init(InitCli),

    /// Add a new backend or frontend service to the project
    Create(CreateCli),

    /// Protobuf code generation
    Api(ApiCli),

    /// Container image builds
    Build(BuildCli),

    /// Docker Compose topology
    Compose(ComposeCli),

    /// Helm chart generation and lifecycle
    Kube(KubeCli),

    /// Probe the local toolchain for required binaries
    Doctor(DoctorCli),

    /// Print the CLI version
    Version,

    /// Validate the manifest and module graph without writing anything
    Check,
}

#[derive(clap::Args, Debug)]
pub struct InitCli {
    /// Directory to initialize (defaults to the current working directory).
    #[clap(long)]
    pub dir: Option<PathBuf>,
    /// Project name (manifest's `project_name`).
    #[clap(long)]
    pub project_name: String,
    /// Go module prefix (manifest's `module_prefix`).
    #[clap(long)]
    pub module_prefix: String,
    /// Container registry prefix for built images.
    #[clap(long, default_value = "")]
    pub docker_registry: String,
    /// Overwrite an existing manifest and scaffold at the target directory.
    #[clap(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct CreateCli {
    #[clap(subcommand)]
    pub command: CreateCommand,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ProtoTemplateArg {
    Echo,
    Crud,
    None,
}

impl From<ProtoTemplateArg> for ProtoTemplate {
    fn from(value: ProtoTemplateArg) -> Self {
        match value {
            ProtoTemplateArg::Echo => ProtoTemplate::Echo,
            ProtoTemplateArg::Crud => ProtoTemplate::Crud,
            ProtoTemplateArg::None => ProtoTemplate::None,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum PlatformArg {
    Web,
    Android,
    Ios,
    Macos,
    Windows,
    Linux,
}

impl From<PlatformArg> for Platform {
    fn from(value: PlatformArg) -> Self {
        match value {
            PlatformArg::Web => Platform::Web,
            PlatformArg::Android => Platform::Android,
            PlatformArg::Ios => Platform::Ios,
            PlatformArg::Macos => Platform::Macos,
            PlatformArg::Windows => Platform::Windows,
            PlatformArg::Linux => Platform::Linux,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CreateCommand {
    /// Add a backend service: allocates ports and scaffolds a Go module
    Backend {
        service_id: String,
        #[clap(long = "proto", value_enum, default_value_t = ProtoTemplateArg::Crud)]
        proto_template: ProtoTemplateArg,
    },
    /// Add a frontend service: allocates a web port and scaffolds a project
    Frontend {
        service_id: String,
        #[clap(long = "platforms", value_enum, value_delimiter = ',', default_values_t = [PlatformArg::Web])]
        platforms: Vec<PlatformArg>,
    },
}

#[derive(clap::Args, Debug)]
pub struct ApiCli {
    #[clap(subcommand)]
    pub command: ApiCommand,
}

#[derive(Subcommand, Debug)]
pub enum ApiCommand {
    /// Run the protobuf generator and reconcile the module graph
    Generate,
}

#[derive(clap::Args, Debug)]
pub struct BuildCli {
    #[clap(subcommand)]
    pub command: BuildCommand,
}

#[derive(Subcommand, Debug)]
pub enum BuildCommand {
    /// Build a single backend service's container image
    Backend {
        service_id: String,
        /// Comma-separated target platforms, e.g. linux/amd64,linux/arm64
        #[clap(long, value_delimiter = ',')]
        platform: Vec<String>,
        /// Build only for the host platform; never pushed.
        #[clap(long)]
        local: bool,
        #[clap(long)]
        push: bool,
    },
    /// Build a single frontend service's container image
    Frontend {
        service_id: String,
        #[clap(long, value_delimiter = ',')]
        platform: Vec<String>,
        #[clap(long)]
        local: bool,
        #[clap(long)]
        push: bool,
    },
    /// Build every backend then every frontend; aborts on first failure
    All {
        #[clap(long, value_delimiter = ',')]
        platform: Vec<String>,
        #[clap(long)]
        local: bool,
        #[clap(long)]
        push: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ComposeCli {
    #[clap(subcommand)]
    pub command: ComposeCommand,
}

#[derive(Subcommand, Debug)]
pub enum ComposeCommand {
    /// Render `deploy/compose/compose.yaml` from the manifest
    Generate,
    /// `docker compose up -d`
    Up,
    /// `docker compose down`
    Down,
    /// `docker compose logs`, optionally scoped to one service
    Logs { service: Option<String> },
    /// Start a loopback proxy sidecar to a service's port
    Proxy {
        service: String,
        target_port: u16,
        #[clap(long)]
        local_port: Option<u16>,
    },
    /// Stop a proxy sidecar started with `compose proxy`
    ProxyStop { service: String, port: u16 },
}

#[derive(clap::Args, Debug)]
pub struct KubeCli {
    #[clap(subcommand)]
    pub command: KubeCommand,
}

#[derive(Subcommand, Debug)]
pub enum KubeCommand {
    /// Regenerate the project's Helm chart
    Generate,
    /// `helm template` the generated chart
    Template,
    /// `helm upgrade --install` the generated chart
    Apply,
    /// `helm uninstall` the project's release
    Uninstall,
}

#[derive(clap::Args, Debug)]
pub struct DoctorCli {
    /// Install the subset of protobuf plugins the Go toolchain manages
    #[clap(long)]
    pub install: bool,
}
