//! CLI binary for validating material sets and running synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crucible_llm::{LlmClient, UsageTrackingMiddleware};
use crucible_materials::{
    classify_all, validate_materials, KnowledgeBase, RawItem, SynthesisRequest, TargetSpec,
    ValidationResult,
};
use crucible_pipeline::{
    ContentSchema, Identity, InMemoryQuotaLedger, Orchestrator, PipelineConfig, PromptComposer,
};
use crucible_types::{CrucibleError, Severity};

#[derive(Parser)]
#[command(name = "crucible", version, about = "Synthesize game content from source materials")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a request's materials and check them against the vessel's requirements
    Validate {
        /// Path to the request JSON file
        request: PathBuf,

        /// Knowledge base TOML (default: built-in)
        #[arg(long)]
        kb: Option<PathBuf>,
    },

    /// Print the prompt a request would produce
    Compose {
        /// Path to the request JSON file
        request: PathBuf,

        /// Seed for random-choice resolution
        #[arg(long)]
        seed: Option<u64>,

        /// Knowledge base TOML (default: built-in)
        #[arg(long)]
        kb: Option<PathBuf>,
    },

    /// Run the full pipeline against the configured provider
    Synthesize {
        /// Path to the request JSON file
        request: PathBuf,

        /// Pipeline config (default: ./crucible.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Knowledge base TOML (default: built-in)
        #[arg(long)]
        kb: Option<PathBuf>,

        /// Identity charged for the run
        #[arg(long, default_value = "local")]
        identity: String,

        /// Bypass the quota ledger
        #[arg(long)]
        privileged: bool,

        /// Starting balance for the identity
        #[arg(long, default_value = "1")]
        balance: u64,
    },
}

/// The request file: raw items plus the target description.
#[derive(Debug, Deserialize)]
struct RequestFile {
    items: Vec<RawItem>,
    target: TargetSpec,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { request, kb } => {
            cmd_validate(&request, kb.as_deref())?;
        }
        Commands::Compose { request, seed, kb } => {
            cmd_compose(&request, seed, kb.as_deref())?;
        }
        Commands::Synthesize {
            request,
            config,
            kb,
            identity,
            privileged,
            balance,
        } => {
            let identity = if privileged {
                Identity::privileged(identity)
            } else {
                Identity::user(identity)
            };
            cmd_synthesize(&request, config.as_deref(), kb.as_deref(), identity, balance).await?;
        }
    }

    Ok(())
}

fn load_request(path: &Path) -> anyhow::Result<RequestFile> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    let request = serde_json::from_str(&source)
        .with_context(|| format!("parsing request {}", path.display()))?;
    Ok(request)
}

fn load_knowledge(path: Option<&Path>) -> anyhow::Result<KnowledgeBase> {
    match path {
        Some(path) => KnowledgeBase::load(path)
            .with_context(|| format!("loading knowledge base {}", path.display())),
        None => Ok(KnowledgeBase::builtin()),
    }
}

fn print_validation(result: &ValidationResult) {
    println!("Materials:");
    for (role, refs) in &result.breakdown {
        let names: Vec<&str> = refs.iter().map(|r| r.display_name.as_str()).collect();
        println!("  {} ({}): {}", role, refs.len(), names.join(", "));
    }

    for error in &result.errors {
        println!("[ERROR] {}", error);
    }
    for warning in &result.warnings {
        println!("[WARN] {}", warning);
    }
    for suggestion in &result.suggestions {
        println!("[HINT] {}", suggestion);
    }
    if result.is_valid {
        println!("Request is valid");
    }
}

fn cmd_validate(path: &Path, kb: Option<&Path>) -> anyhow::Result<()> {
    let request = load_request(path)?;
    let kb = load_knowledge(kb)?;

    let materials = match classify_all(&request.items, &kb) {
        Ok(materials) => materials,
        Err(e @ CrucibleError::Classification { .. }) => {
            println!("[ERROR] {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let result = validate_materials(&materials);
    print_validation(&result);
    if !result.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_compose(path: &Path, seed: Option<u64>, kb: Option<&Path>) -> anyhow::Result<()> {
    let file = load_request(path)?;
    let kb = load_knowledge(kb)?;
    let (request, _) = SynthesisRequest::assemble(&file.items, file.target, &kb)?;

    let schema = ContentSchema::builtin(request.target().kind);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let prompt = PromptComposer::compose(&request, &schema, &mut rng);
    println!("{}", prompt.text);
    Ok(())
}

async fn cmd_synthesize(
    path: &Path,
    config: Option<&Path>,
    kb: Option<&Path>,
    identity: Identity,
    balance: u64,
) -> anyhow::Result<()> {
    let file = load_request(path)?;
    let config = match config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::load_or_default(".")?,
    };
    let kb = load_knowledge(kb)?;

    let usage = UsageTrackingMiddleware::new();
    let client = LlmClient::from_env()?.with_middleware(usage.clone());
    let ledger = InMemoryQuotaLedger::new();
    ledger.set_balance(&identity.id, balance).await;

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(kb),
        Arc::new(ledger),
        config,
    );
    let (request, validation) = exit_on_caller_error(orchestrator.prepare(&file.items, file.target))?;
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }

    let outcome = exit_on_caller_error(orchestrator.synthesize(&request, &identity).await)?;

    println!("{}", outcome.object.to_pretty_json());
    if !outcome.diagnostics.is_empty() {
        eprintln!("\nDiagnostics:");
        for diag in &outcome.diagnostics {
            let severity = match diag.severity {
                Severity::Warning => "WARN",
                Severity::Info => "INFO",
            };
            match &diag.field {
                Some(field) => eprintln!("[{}] {} ({}): {}", severity, diag.rule, field, diag.message),
                None => eprintln!("[{}] {}: {}", severity, diag.rule, diag.message),
            }
        }
    }
    eprintln!(
        "\nGenerated in {} attempt(s), request {}",
        outcome.report.generate_attempts, outcome.report.request_id
    );
    eprintln!(
        "Tokens: {} in, {} out",
        usage.input_tokens(),
        usage.output_tokens()
    );
    Ok(())
}

/// Report a synthesis error the caller is expected to handle and exit 1;
/// anything else propagates as an internal failure.
fn exit_on_caller_error<T>(result: Result<T, CrucibleError>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_caller_visible() => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
