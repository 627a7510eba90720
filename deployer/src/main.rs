use clap::{Parser, Subcommand};
use deployer::{
    force_unlock, resolve_runtime, CommandRunner, ContainerRuntime, DeployConfig, DeployPlan,
    DeployReport, DeploySecrets, Deployer, SystemRunner,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Redeploy the FIFA Rivalry Tracker stack on this host")]
struct Cli {
    /// Deploy configuration (TOML); built-in defaults when omitted
    #[arg(long, global = true, env = "DEPLOY_CONFIG")]
    config: Option<PathBuf>,
    /// Write the run report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync, tear down, rebuild and verify the whole stack
    Deploy,
    /// Sync the checkout and (re)install the nginx proxy only
    SetupProxy,
    /// Probe the running app and proxy without changing anything
    Check,
    /// Write the env file from the current environment and exit
    RenderEnv,
    /// Print the commands a deploy would run
    Plan,
    /// Remove a lock left behind by a crashed run
    Unlock,
}

impl Commands {
    fn kind(&self) -> &'static str {
        match self {
            Commands::Deploy => "deploy",
            Commands::SetupProxy => "setup-proxy",
            Commands::Check => "check",
            Commands::RenderEnv => "render-env",
            Commands::Plan => "plan",
            Commands::Unlock => "unlock",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DeployConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan => {
            let runtime = config.runtime.requested().unwrap_or(ContainerRuntime::Docker);
            let project = config.compose_project(runtime);
            print!("{}", DeployPlan::for_config(&config, &project));
            return Ok(());
        }
        Commands::Unlock => {
            let path = config.lock_path();
            match force_unlock(&path)? {
                Some(owner) => println!("Removed {} held by {}", path.display(), owner),
                None => println!("No readable lock at {}", path.display()),
            }
            return Ok(());
        }
        Commands::RenderEnv => {
            let secrets = load_secrets(&config)?;
            let deployer = Deployer::from_config(
                config,
                ContainerRuntime::None,
                Arc::new(SystemRunner::new()),
            )?
            .with_secrets(secrets);
            let path = deployer
                .render_env()
                .map_err(|e| deployer.redactor().redact(&e.to_string()))?;
            println!("Wrote {}", path.display());
            return Ok(());
        }
        Commands::Deploy | Commands::SetupProxy | Commands::Check => {}
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let runtime = match resolve_runtime(config.runtime.requested(), runner.as_ref()) {
        Ok(runtime) => runtime,
        // health checks and nginx setup run without a container runtime
        Err(e) if !matches!(cli.command, Commands::Deploy) => {
            warn!("{}; continuing without container diagnostics", e);
            ContainerRuntime::None
        }
        Err(e) => return Err(e.into()),
    };
    if runtime.is_available() {
        info!("Using {} as container runtime", runtime.command());
    }

    let mut deployer = Deployer::from_config(config.clone(), runtime, runner)?;
    if matches!(cli.command, Commands::Deploy) {
        deployer = deployer.with_secrets(load_secrets(&config)?);
    }

    let mut report = DeployReport::new(cli.command.kind());
    info!("Starting {} run {}", report.kind, report.run_id);

    let result = match cli.command {
        Commands::Deploy => deployer.deploy(&mut report).await,
        Commands::SetupProxy => deployer.setup_proxy(&mut report).await,
        _ => deployer.check(&mut report).await,
    };
    deployer.conclude(&mut report, &result);

    println!("{}", report.summary());
    if let Some(path) = &cli.report {
        match report.write_json(path) {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report to {}: {}", path.display(), e),
        }
    }

    match report.error {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}

fn load_secrets(config: &DeployConfig) -> Result<DeploySecrets, Box<dyn std::error::Error>> {
    Ok(DeploySecrets::from_env()?.with_default_api_url(config.stack.api_url()))
}
