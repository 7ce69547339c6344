// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod parsing;
pub mod inspector;
pub mod executor;
pub mod kubernetes;
pub mod openshift;
pub mod probes;
pub mod runner;
pub mod report;
pub mod render;

// Re-export commonly used items
pub use types::*;
pub use error::{AuditError, ProbeError};
pub use config::{
    load_config, load_config_with_env, AuditConfig, CheckArgs, Cli, Command, EnvironmentProvider,
    MockEnvironment, NetworkTestConfig, OutputFormat, SystemEnvironment,
};
pub use parsing::{parse_channel, parse_cpu_millicores, parse_memory_bytes, Channel};
pub use inspector::{ClusterInspector, InspectorCall, MockInspector};
pub use executor::{HttpFetcher, MockExecutor, RemoteExecutor, RetryPolicy};
pub use kubernetes::{KubeExecutor, KubeInspector};
pub use probes::{default_probes, Probe};
pub use runner::ProbeRunner;
pub use report::{RunSummary, SeverityCounts};
pub use render::{render_json, render_text};
