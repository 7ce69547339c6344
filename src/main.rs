use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kube_health_auditor::config::{load_config, AuditConfig, CheckArgs, Cli, Command, OutputFormat};
use kube_health_auditor::error::AuditError;
use kube_health_auditor::executor::HttpFetcher;
use kube_health_auditor::kubernetes::{KubeExecutor, KubeInspector};
use kube_health_auditor::probes::default_probes;
use kube_health_auditor::render::{render_json, render_text};
use kube_health_auditor::runner::ProbeRunner;

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Check(args) = cli.command;
    init_tracing(args.debug);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<AuditError>() {
            Some(AuditError::Cancelled) => {
                error!("interrupted");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            _ => {
                error!("{:#}", err);
                ExitCode::from(EXIT_FAILURE)
            }
        },
    }
}

async fn run(args: &CheckArgs) -> Result<()> {
    let cfg = load_config(args)?;
    let client = build_client(&cfg).await?;

    let http = HttpFetcher::new(cfg.probe_timeout, cfg.accept_invalid_certs, cfg.retry_policy())
        .context("Failed to build HTTP client")?;
    let inspector = KubeInspector::new(client.clone());
    // two test pods must finish inside one probe timeout
    let executor = KubeExecutor::new(client, http).with_completion_deadline(cfg.probe_timeout / 3);

    let probes = default_probes(&cfg);
    info!("running {} probes", probes.len());
    let summary = ProbeRunner::new(&inspector, &executor, &cfg)
        .execute_until(&probes, shutdown_signal())
        .await?;

    match cfg.output {
        OutputFormat::Text => print!("{}", render_text(&summary, cfg.debug)),
        OutputFormat::Json => println!("{}", render_json(&summary)?),
    }
    Ok(())
}

async fn build_client(cfg: &AuditConfig) -> Result<Client> {
    let config = match &cfg.kubeconfig {
        Some(path) => kubeconfig_from_path(path).await?,
        None => Config::infer().await.context("Failed to infer cluster configuration")?,
    };
    Client::try_from(config).context("Failed to create Kubernetes client")
}

async fn kubeconfig_from_path(path: &Path) -> Result<Config> {
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("Failed to load kubeconfig {}", path.display()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler; never cancel
        std::future::pending::<()>().await;
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
