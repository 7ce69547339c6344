use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::executor::RetryPolicy;
use crate::types::Severity;

pub const DEFAULT_CHANNEL_GRAPH_URL: &str = "https://api.openshift.com/api/upgrades_info/v1/graph";
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_NETWORK_TEST_IMAGE: &str = "registry.redhat.io/openshift4/network-tools-rhel8";

/// Read-only health audit for OpenShift clusters.
#[derive(Debug, Parser)]
#[command(name = "kube-health-auditor")]
#[command(about = "Run a battery of read-only health probes against an OpenShift cluster")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every probe and print the report.
    Check(CheckArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Path to the kubeconfig file (defaults to `$HOME/.kube/config`).
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,

    /// Container restart count above which a pod is reported.
    #[arg(short = 'r', long, default_value = "10")]
    pub container_restart: i32,

    /// Show underlying errors and debug logging.
    #[arg(short, long, default_value = "false")]
    pub debug: bool,

    /// Per-probe timeout in seconds.
    #[arg(long, default_value = "120")]
    pub timeout: u64,

    /// Number of probes run at once after the admin gate.
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Accept self-signed certificates on cluster routes.
    #[arg(long, default_value = "false")]
    pub insecure_skip_tls_verify: bool,

    /// Severity a failed probe counts as in the overall verdict.
    #[arg(long, default_value = "warning")]
    pub probe_error_severity: Severity,

    /// Bearer token for the Alertmanager route (or set `AUDIT_BEARER_TOKEN`).
    /// Defaults to the kubeconfig user's token.
    #[arg(long)]
    pub token: Option<String>,

    /// Node allocation/utilization percentage that triggers a warning.
    #[arg(long, default_value = "80")]
    pub capacity_threshold: f64,

    /// Alert names never reported (comma-separated), e.g. `Watchdog`.
    #[arg(long, value_delimiter = ',')]
    pub ignore_alert: Vec<String>,

    /// Total attempts for outbound HTTP calls.
    #[arg(long, default_value = "3")]
    pub http_attempts: u32,

    /// Namespace the network test pods run in.
    #[arg(long, default_value = "openshift-monitoring")]
    pub network_namespace: String,

    #[arg(long, default_value = DEFAULT_NETWORK_TEST_IMAGE)]
    pub network_image: String,

    /// External host the egress and DNS tests target.
    #[arg(long, default_value = "www.redhat.com")]
    pub network_target: String,
}

impl Default for CheckArgs {
    fn default() -> Self {
        let defaults = AuditConfig::default();
        Self {
            kubeconfig: None,
            container_restart: defaults.container_restart_threshold,
            debug: false,
            timeout: defaults.probe_timeout.as_secs(),
            concurrency: defaults.concurrency,
            output: OutputFormat::Text,
            insecure_skip_tls_verify: false,
            probe_error_severity: defaults.probe_error_severity,
            token: None,
            capacity_threshold: defaults.capacity_threshold_percent,
            ignore_alert: defaults.ignored_alerts,
            http_attempts: defaults.http_attempts,
            network_namespace: defaults.network.namespace,
            network_image: defaults.network.image,
            network_target: defaults.network.target,
        }
    }
}

/// Workload settings for the egress and DNS tests.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTestConfig {
    pub namespace: String,
    pub image: String,
    pub target: String,
}

impl Default for NetworkTestConfig {
    fn default() -> Self {
        Self {
            namespace: "openshift-monitoring".to_string(),
            image: DEFAULT_NETWORK_TEST_IMAGE.to_string(),
            target: "www.redhat.com".to_string(),
        }
    }
}

/// Everything one audit run needs; built once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// `None` means infer (in-cluster or the client's default resolution).
    pub kubeconfig: Option<PathBuf>,
    pub container_restart_threshold: i32,
    pub debug: bool,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    pub capacity_threshold_percent: f64,
    pub channel_graph_url: String,
    pub bearer_token: Option<String>,
    pub ignored_alerts: Vec<String>,
    pub http_attempts: u32,
    pub accept_invalid_certs: bool,
    pub network: NetworkTestConfig,
    pub probe_error_severity: Severity,
    pub output: OutputFormat,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            container_restart_threshold: 10,
            debug: false,
            probe_timeout: Duration::from_secs(120),
            concurrency: 4,
            capacity_threshold_percent: 80.0,
            channel_graph_url: DEFAULT_CHANNEL_GRAPH_URL.to_string(),
            bearer_token: None,
            ignored_alerts: Vec::new(),
            http_attempts: 3,
            accept_invalid_certs: false,
            network: NetworkTestConfig::default(),
            probe_error_severity: Severity::Warning,
            output: OutputFormat::Text,
        }
    }
}

impl AuditConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.http_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

/// Trait for abstracting environment access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;

    fn read_file(&self, path: &Path) -> Option<String>;
}

/// Production implementation using std::env and std::fs
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
    files: HashMap<PathBuf, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }

    pub fn with_file<P, C>(mut self, path: P, contents: C) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.files.get(path).cloned()
    }
}

pub fn load_config(args: &CheckArgs) -> Result<AuditConfig> {
    load_config_with_env(args, &SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(args: &CheckArgs, env: &E) -> Result<AuditConfig> {
    if args.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }
    if args.timeout == 0 {
        bail!("--timeout must be greater than zero");
    }
    if !(args.capacity_threshold > 0.0 && args.capacity_threshold <= 100.0) {
        bail!("--capacity-threshold must be within (0, 100]");
    }
    if args.container_restart < 0 {
        bail!("--container-restart must not be negative");
    }

    let kubeconfig = resolve_kubeconfig(args.kubeconfig.as_deref(), env)?;

    let bearer_token = args
        .token
        .clone()
        .or_else(|| env.get_var("AUDIT_BEARER_TOKEN"))
        .or_else(|| kubeconfig.as_deref().and_then(|path| kubeconfig_token(path, env)))
        .or_else(|| env.read_file(Path::new(SERVICE_ACCOUNT_TOKEN_PATH)))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let channel_graph_url = env
        .get_var("AUDIT_CHANNEL_GRAPH_URL")
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHANNEL_GRAPH_URL.to_string());

    Ok(AuditConfig {
        kubeconfig,
        container_restart_threshold: args.container_restart,
        debug: args.debug,
        probe_timeout: Duration::from_secs(args.timeout),
        concurrency: args.concurrency,
        capacity_threshold_percent: args.capacity_threshold,
        channel_graph_url,
        bearer_token,
        ignored_alerts: args
            .ignore_alert
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        http_attempts: args.http_attempts.max(1),
        accept_invalid_certs: args.insecure_skip_tls_verify,
        network: NetworkTestConfig {
            namespace: args.network_namespace.clone(),
            image: args.network_image.clone(),
            target: args.network_target.clone(),
        },
        probe_error_severity: args.probe_error_severity,
        output: args.output,
    })
}

/// An explicit path must exist; otherwise `$HOME/.kube/config` is used when present.
fn resolve_kubeconfig<E: EnvironmentProvider>(
    explicit: Option<&Path>,
    env: &E,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(anyhow!("kubeconfig {} does not exist", path.display()));
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(env
        .get_var("HOME")
        .map(|home| Path::new(&home).join(".kube").join("config"))
        .filter(|p| p.exists()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeconfigView {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextView,
}

#[derive(Debug, Deserialize)]
struct ContextView {
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    token_file: Option<String>,
}

/// Bearer token of the current context's user, as left by `oc login`.
fn kubeconfig_token<E: EnvironmentProvider>(path: &Path, env: &E) -> Option<String> {
    let view: KubeconfigView = match serde_yaml::from_str(&env.read_file(path)?) {
        Ok(view) => view,
        Err(e) => {
            debug!("kubeconfig {} not readable for a token: {}", path.display(), e);
            return None;
        }
    };
    let current = view.current_context.as_deref()?;
    let user_name = &view.contexts.iter().find(|c| c.name == current)?.context.user;
    let user = &view.users.iter().find(|u| &u.name == user_name)?.user;
    user.token.clone().or_else(|| user.token_file.as_deref().and_then(|f| env.read_file(Path::new(f))))
}
