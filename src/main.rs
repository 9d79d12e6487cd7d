//! data-baits CLI
//!
//! Entry point for the `data-baits` command-line tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use data_baits::config::{Environment, CONFIG_PATH_ENV};
use data_baits::manifest;
use data_baits::registry::ConfigMapRegistry;
use data_baits::remote::{KfpClient, KubeClient};
use data_baits::state::RunMode;
use data_baits::{EffectiveConfig, ReconcileError, Reconciler, RunReport, RunSummary};
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "data-baits")]
#[command(about = "Deploy data baits exactly once per version", version)]
struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = Verbosity::Info, global = true)]
    verbosity: Verbosity,

    /// Force the active environment; only artifacts targeting it are declared
    #[arg(long, value_enum, global = true)]
    environment: Option<EnvironmentArg>,

    /// Path to a TOML config file
    #[arg(long, short = 'c', env = CONFIG_PATH_ENV, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy (or roll back) the declared artifacts
    Deploy(DeployArgs),
}

#[derive(Args)]
struct DeployArgs {
    /// Directory scanned recursively for *.yaml / *.yml manifests
    #[arg(long, conflicts_with = "from_secrets", required_unless_present = "from_secrets")]
    path: Option<PathBuf>,

    /// Read manifests from labelled secrets across all namespaces
    #[arg(long)]
    from_secrets: bool,

    /// Label selecting manifest secrets (default: manifest_label setting)
    #[arg(long, requires = "from_secrets")]
    label: Option<String>,

    /// Use explicit endpoints and credentials instead of in-cluster ones
    #[arg(long)]
    external: bool,

    /// Kubernetes API server URL (external mode)
    #[arg(long, env = "KUBE_API_URL")]
    kube_api: Option<String>,

    /// Kubernetes bearer token (external mode)
    #[arg(long, env = "KUBE_TOKEN", hide_env_values = true)]
    kube_token: Option<String>,

    /// Kubeflow endpoint (external mode)
    #[arg(long, env = "KUBEFLOW_ENDPOINT")]
    endpoint: Option<String>,

    /// Kubeflow username (external mode)
    #[arg(long, env = "KUBEFLOW_USERNAME")]
    username: Option<String>,

    /// Kubeflow password (external mode)
    #[arg(long, env = "KUBEFLOW_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Undo the recorded versions of the declared artifacts
    #[arg(long)]
    rollback: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Verbosity {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

impl Verbosity {
    fn filter(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warn",
            Verbosity::Error | Verbosity::Critical => "error",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvironmentArg {
    Development,
    Production,
}

impl From<EnvironmentArg> for Environment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Development => Environment::Development,
            EnvironmentArg::Production => Environment::Production,
        }
    }
}

fn init_tracing(verbosity: Verbosity) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| verbosity.filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    let environment = cli.environment.map(Environment::from);
    let code = match &cli.command {
        Commands::Deploy(args) => run_deploy(cli.config.as_deref(), environment, args),
    };
    process::exit(code);
}

fn run_deploy(config_path: Option<&std::path::Path>, environment: Option<Environment>, args: &DeployArgs) -> i32 {
    let mode = if args.rollback {
        RunMode::Rollback
    } else {
        RunMode::Deploy
    };
    let start = Instant::now();

    let result = execute(config_path, environment, args, mode);
    let duration_ms = start.elapsed().as_millis() as u64;

    let summary = match &result {
        Ok(report) => RunSummary::from_report(report, duration_ms),
        Err(e) => RunSummary::from_error(mode, e, duration_ms),
    };

    if args.json {
        match summary.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize run summary: {}", e),
        }
    } else {
        println!("{}", summary.human_summary);
        for artifact in &summary.artifacts {
            if let Some(detail) = &artifact.detail {
                println!("  {:?} {} {}: {}", artifact.status, artifact.identity, artifact.version, detail);
            }
        }
        if let Some(error) = &summary.error {
            eprintln!("Error: {}", error);
        }
    }

    summary.exit_code
}

fn execute(
    config_path: Option<&std::path::Path>,
    environment: Option<Environment>,
    args: &DeployArgs,
    mode: RunMode,
) -> Result<RunReport, ReconcileError> {
    let cli_layer = environment.map(|env| serde_json::json!({ "environment": env.as_str() }));
    let effective = EffectiveConfig::build(config_path, std::env::vars(), cli_layer)?;
    debug!(config = %effective.config, sources = effective.sources.len(), "Effective configuration");
    let settings = effective.settings();

    info!(mode = mode.as_str(), external = args.external, "Connecting");
    let (cluster, pipelines) = connect(args)?;

    let registry = ConfigMapRegistry::new(&cluster, &settings.registry.namespace, &settings.registry.name);
    let reconciler = Reconciler::new(&registry, &pipelines, &cluster, settings.dispatch_options());
    reconciler.verify_pipeline_service()?;

    let namespace = settings.default_namespace()?;
    let mut declared = match &args.path {
        Some(path) => manifest::load_directory(path, &namespace)?,
        None => {
            let label = args.label.as_deref().unwrap_or(&settings.manifest_label);
            manifest::load_secrets(&cluster, label, &namespace)?
        }
    };

    if environment.is_some() {
        let active = settings
            .environment
            .as_name()
            .map_err(|e| ReconcileError::configuration(e.to_string()))?;
        declared = manifest::filter_environment(declared, &active);
    }
    info!(count = declared.len(), "Declared artifacts loaded");

    match mode {
        RunMode::Deploy => reconciler.deploy(&declared),
        RunMode::Rollback => reconciler.rollback(&declared),
    }
}

fn connect(args: &DeployArgs) -> Result<(KubeClient, KfpClient), ReconcileError> {
    if !args.external {
        let cluster = KubeClient::in_cluster().map_err(|e| {
            ReconcileError::configuration(format!("in-cluster Kubernetes credentials unavailable: {}", e))
        })?;
        let pipelines = KfpClient::in_cluster().map_err(|e| {
            ReconcileError::configuration(format!("in-cluster pipeline credentials unavailable: {}", e))
        })?;
        return Ok((cluster, pipelines));
    }

    let kube_api = required(&args.kube_api, "--kube-api", "KUBE_API_URL")?;
    let endpoint = required(&args.endpoint, "--endpoint", "KUBEFLOW_ENDPOINT")?;
    let username = required(&args.username, "--username", "KUBEFLOW_USERNAME")?;
    let password = required(&args.password, "--password", "KUBEFLOW_PASSWORD")?;

    let cluster = KubeClient::external(kube_api, args.kube_token.as_deref())
        .map_err(|e| ReconcileError::configuration(format!("Kubernetes client: {}", e)))?;
    let pipelines = KfpClient::external(endpoint, username, password)
        .map_err(|e| ReconcileError::configuration(format!("pipeline client: {}", e)))?;
    Ok((cluster, pipelines))
}

fn required<'a>(value: &'a Option<String>, flag: &str, env: &str) -> Result<&'a str, ReconcileError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReconcileError::configuration(format!("{} is required in external mode (or set {})", flag, env)))
}
