//! `arena` — runs configured scenarios against configured providers and
//! reports pass/fail per run. `clap::Parser` subcommands, JSON tracing,
//! config-validate-then-dispatch, `std::process::exit` on the resolved
//! exit code.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arena_domain::config::{ArenaConfig, ConfigError, ConfigSeverity, StateStoreKind};
use arena_domain::result::RunResult;
use arena_domain::tool::ToolMode;
use arena_engine::result::{dedupe_by_fingerprint, ResultSummary};
use arena_engine::{EventBus, ScenarioEngine};
use arena_mcp_client::McpManager;
use arena_providers::{MockConfig, MockProvider, ProviderRegistry};
use arena_state::{InMemoryCacheBackend, InMemoryStore, OutOfProcessStore, StateStore};
use arena_tools::{ExternalServerExecutor, HttpExecutor, MockExecutor, ToolRegistry};

#[derive(Debug, Parser)]
#[command(name = "arena", version, about = "PromptArena scenario runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every configured (or filtered) scenario against every
    /// configured (or filtered) provider.
    Run(RunArgs),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate {
        #[arg(short = 'c', long, default_value = "arena.yaml")]
        config: PathBuf,
    },
    /// Dump the resolved configuration (with defaults filled in) as JSON.
    Show {
        #[arg(short = 'c', long, default_value = "arena.yaml")]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the arena config file (.yaml/.yml/.json).
    #[arg(short = 'c', long, default_value = "arena.yaml")]
    config: PathBuf,
    /// Only run these provider ids (comma-separated). Default: all configured.
    #[arg(long, value_delimiter = ',')]
    provider: Vec<String>,
    /// Only run these scenario ids (comma-separated). Default: all configured.
    #[arg(long, value_delimiter = ',')]
    scenario: Vec<String>,
    /// Serve every provider from a deterministic mock instead of calling a live vendor.
    #[arg(long)]
    mock_provider: bool,
    /// Mock fixture file to load (and serve from) when `--mock-provider` is set.
    #[arg(long)]
    mock_config: Option<PathBuf>,
    /// Override `max_concurrent` from the config file.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Collapse duplicate runs by fingerprint, for regression-corpus gating.
    #[arg(long)]
    ci: bool,
    /// Output formats for the written run artifacts (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "json")]
    format: Vec<String>,
    /// Override `defaults.output_dir` from the config file.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,arena_engine=debug")))
        .json()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Run(args) => run(args).await?,
        Command::Config(ConfigCommand::Validate { config }) => {
            let config = load_config(&config)?;
            let errors = config.validate();
            print_validation(&errors);
            if ArenaConfig::has_errors(&errors) {
                2
            } else {
                println!("config OK");
                0
            }
        }
        Command::Config(ConfigCommand::Show { config }) => {
            let config = load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            0
        }
        Command::Version => {
            println!("arena {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    std::process::exit(exit_code);
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let mut config = load_config(&args.config)?;

    if !args.provider.is_empty() {
        let wanted: HashSet<&str> = args.provider.iter().map(String::as_str).collect();
        config.providers.retain(|p| wanted.contains(p.id.as_str()));
    }
    if !args.scenario.is_empty() {
        let wanted: HashSet<&str> = args.scenario.iter().map(String::as_str).collect();
        config.scenarios.retain(|s| wanted.contains(s.id.as_str()));
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent = concurrency;
    }

    let errors = config.validate();
    print_validation(&errors);
    if ArenaConfig::has_errors(&errors) {
        return Ok(2);
    }

    for format in &args.format {
        if format != "json" {
            tracing::warn!(format = %format, "only the json output format is implemented, ignoring");
        }
    }

    let provider_registry: Arc<ProviderRegistry> = if args.mock_provider {
        Arc::new(build_mock_registry(&config, args.mock_config.as_deref()).await?)
    } else {
        Arc::new(ProviderRegistry::from_configs(&config.providers))
    };
    for init_error in provider_registry.init_errors() {
        tracing::warn!(
            provider_id = %init_error.provider_id,
            vendor = %init_error.vendor_tag,
            error = %init_error.error,
            "provider failed to initialize, skipping"
        );
    }

    let tool_registry = Arc::new(build_tool_registry(&config).await);

    let store: Arc<dyn StateStore> = match config.state_store.kind {
        StateStoreKind::InMemory => Arc::new(InMemoryStore::new()),
        StateStoreKind::OutOfProcess => Arc::new(OutOfProcessStore::new(
            Box::new(InMemoryCacheBackend::new()),
            config.state_store.key_prefix.clone(),
            config.state_store.ttl_secs,
        )),
    };

    let event_bus = Arc::new(EventBus::new());
    let engine = Arc::new(ScenarioEngine::new(&config, provider_registry, tool_registry, store, event_bus));

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt, cancelling in-flight runs");
            cancel.cancel();
        }
    });

    let mut results = engine.run().await;
    let was_cancelled = results.iter().any(|r| r.error.as_deref() == Some("run cancelled"));
    if args.ci {
        results = dedupe_by_fingerprint(results);
    }

    let output_dir = args.out.unwrap_or_else(|| PathBuf::from(config.defaults.output_dir.clone()));
    write_results(&output_dir, &results).await?;

    let summary = ResultSummary::from_runs(&results);
    print_summary(&summary);

    if was_cancelled {
        return Ok(3);
    }
    Ok(summary.exit_code())
}

fn load_config(path: &Path) -> anyhow::Result<ArenaConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display()))?,
        _ => serde_yaml::from_str(&raw).with_context(|| format!("parsing {} as YAML", path.display()))?,
    };
    Ok(config)
}

fn print_validation(errors: &[ConfigError]) {
    for e in errors {
        match e.severity {
            ConfigSeverity::Warning => tracing::warn!(field = %e.field, message = %e.message, "config warning"),
            ConfigSeverity::Error => tracing::error!(field = %e.field, message = %e.message, "config error"),
        }
    }
}

async fn build_mock_registry(config: &ArenaConfig, mock_config_path: Option<&Path>) -> anyhow::Result<ProviderRegistry> {
    let mock_config = match mock_config_path {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice::<MockConfig>(&bytes).with_context(|| format!("parsing {} as mock config", path.display()))?
        }
        None => MockConfig::default(),
    };

    let mut registry = ProviderRegistry::empty();
    for provider_cfg in &config.providers {
        registry.insert(provider_cfg.id.clone(), Arc::new(MockProvider::new(provider_cfg.id.clone(), mock_config.clone())));
    }
    Ok(registry)
}

async fn build_tool_registry(config: &ArenaConfig) -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry.register_executor(ToolMode::Mock, Arc::new(MockExecutor));
    registry.register_executor(ToolMode::Live, Arc::new(HttpExecutor::new()));

    if !config.tool_servers.is_empty() {
        let manager = Arc::new(McpManager::from_config(&config.tool_servers).await);
        tracing::info!(servers = manager.server_count(), tools = manager.tool_count(), "tool servers ready");
        registry.register_executor(ToolMode::ExternalServer, Arc::new(ExternalServerExecutor::new(manager)));
    }

    for prompt_config in &config.prompt_configs {
        for tool in &prompt_config.tools {
            registry.register(tool.clone());
        }
    }
    registry
}

async fn write_results(dir: &Path, results: &[RunResult]) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await.with_context(|| format!("creating {}", dir.display()))?;
    for run in results {
        let path = dir.join(format!("{}.json", run.run_id));
        let bytes = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&path, bytes).await.with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn print_summary(summary: &ResultSummary) {
    println!(
        "{} total, {} passed, {} failed, {} passed-with-violations, {} pending-approval",
        summary.total, summary.passed, summary.failed, summary.passed_with_violations, summary.pending_approval
    );
    println!("scenarios: {}", summary.scenarios.join(", "));
    println!("providers: {}", summary.providers.join(", "));
    println!("regions: {}", summary.regions.join(", "));
    println!(
        "cost: ${:.4}  prompt_tokens: {}  completion_tokens: {}  duration_ms: {}",
        summary.total_cost, summary.total_prompt_tokens, summary.total_completion_tokens, summary.total_duration_ms
    );
}
