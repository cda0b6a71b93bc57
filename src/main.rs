// src/main.rs
//
// =============================================================================
// N8N-CLI: COMMANDER & ENTRY POINT
// =============================================================================
//
// The wiring center: clap surface, config resolution, lifecycle setup and
// dispatch into the core subsystems. Command handlers stay thin; anything
// interesting lives in the library modules.
//
// Modes:
// 1. Local analysis:  validate / fix / apply / nodes / history.
// 2. Remote control:  list / get / push / delete / trigger / executions /
//    health (all through the retrying client, mutations behind a backup).

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

use n8n_cli::autofix::{Confidence, FixConfig, FixEngine, FixType};
use n8n_cli::catalog::{CatalogStore, SearchMode};
use n8n_cli::client::{ApiClient, N8nApi};
use n8n_cli::config::{self, Config};
use n8n_cli::diff::{DiffEngine, DiffOp, DiffOptions};
use n8n_cli::errors::CliError;
use n8n_cli::lifecycle::Lifecycle;
use n8n_cli::parse::{self, ParseOptions};
use n8n_cli::store::LocalStore;
use n8n_cli::validator::{Mode, Profile, Validator};
use n8n_cli::Workflow;

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(
    name = "n8n-cli",
    version,
    about = "Control plane for n8n workflow automation servers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct WorkflowFileArgs {
    /// Path to the workflow JSON document.
    file: PathBuf,

    /// Accept relaxed JSON (comments, trailing commas, bare keys).
    #[arg(long)]
    relaxed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow document against the node catalog.
    Validate {
        #[command(flatten)]
        input: WorkflowFileArgs,

        #[arg(long, value_enum, default_value = "runtime")]
        profile: Profile,

        #[arg(long, value_enum, default_value = "full")]
        mode: Mode,
    },

    /// Generate (and optionally apply) fixes for a workflow document.
    Fix {
        #[command(flatten)]
        input: WorkflowFileArgs,

        /// Write the fixed workflow back (to --output or stdout).
        #[arg(long)]
        apply: bool,

        /// Restrict to these fix types (default: all).
        #[arg(long = "fix-type", value_delimiter = ',')]
        fix_types: Vec<String>,

        #[arg(long, value_enum, default_value = "low")]
        confidence: Confidence,

        #[arg(long, default_value_t = 50)]
        max_fixes: usize,

        /// Enable the typeVersion upgrade pipeline.
        #[arg(long)]
        upgrade_versions: bool,

        /// Where to write the fixed workflow (default stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Apply a JSON file of diff operations to a workflow document.
    Apply {
        #[command(flatten)]
        input: WorkflowFileArgs,

        /// Path to the JSON array of operations.
        ops: PathBuf,

        /// Validate everything but leave the document unchanged.
        #[arg(long)]
        dry_run: bool,

        /// Attempt every operation and report failures instead of aborting.
        #[arg(long)]
        continue_on_error: bool,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Query the bundled node catalog.
    Nodes {
        #[command(subcommand)]
        command: NodesCommands,
    },

    /// Snapshot history recorded for a workflow.
    History { workflow_id: String },

    /// List workflows on the server.
    List,

    /// Fetch one workflow and print it as JSON.
    Get { id: String },

    /// Create or update a workflow on the server (backup taken first).
    Push {
        #[command(flatten)]
        input: WorkflowFileArgs,

        /// Update this workflow id; omit to create.
        #[arg(long)]
        id: Option<String>,

        /// Abort if the pre-mutation backup cannot be written.
        #[arg(long)]
        strict_backup: bool,
    },

    /// Delete a workflow on the server (backup taken first).
    Delete {
        id: String,

        #[arg(long)]
        strict_backup: bool,
    },

    /// Trigger a webhook URL.
    Trigger {
        url: String,

        /// JSON body to send.
        #[arg(long)]
        data: Option<String>,

        /// Wait for the workflow's response instead of fire-and-forget.
        #[arg(long)]
        wait: bool,
    },

    /// Inspect executions.
    Executions {
        #[command(subcommand)]
        command: ExecutionsCommands,
    },

    /// Check server health.
    Health,
}

#[derive(Subcommand)]
enum NodesCommands {
    /// Full-text or fuzzy search over the catalog.
    Search {
        query: String,

        #[arg(long, value_enum, default_value = "or")]
        mode: SearchModeArg,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one node type (normalizes short and DB-form names).
    Info { node_type: String },
    /// List known versions of a node type.
    Versions { node_type: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SearchModeArg {
    Or,
    And,
    Fuzzy,
}

impl From<SearchModeArg> for SearchMode {
    fn from(value: SearchModeArg) -> Self {
        match value {
            SearchModeArg::Or => SearchMode::Or,
            SearchModeArg::And => SearchMode::And,
            SearchModeArg::Fuzzy => SearchMode::Fuzzy,
        }
    }
}

#[derive(Subcommand)]
enum ExecutionsCommands {
    List {
        #[arg(long)]
        workflow_id: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Get {
        id: String,

        /// Include full node run data (slower).
        #[arg(long)]
        data: bool,
    },
    Retry { id: String },
    Delete { id: String },
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => return render_error(&e),
    };
    let lifecycle = Lifecycle::install(config.cleanup_timeout_ms);

    let result = run_command(cli.command, &config, &lifecycle).await;

    // Ordered teardown: everything interesting (HTTP contexts, stores) is
    // owned by the handlers and already dropped; flushing logs is what
    // remains. The deadline still applies.
    let signal_code = lifecycle.signal_exit_code();
    lifecycle.shutdown(async { log::logger().flush() }).await;

    // A received signal dictates the exit code (SIGINT 130, SIGTERM 143)
    // even when the interrupted command surfaced the cancellation as an
    // error.
    if let Some(code) = signal_code {
        return ExitCode::from(code as u8);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => render_error(&e),
    }
}

fn render_error(error: &CliError) -> ExitCode {
    eprintln!("error: {error}");
    if let Some(hint) = error.hint() {
        eprintln!("hint: {hint}");
    }
    ExitCode::from(error.exit_code() as u8)
}

async fn run_command(
    command: Commands,
    config: &Config,
    lifecycle: &Lifecycle,
) -> Result<(), CliError> {
    match command {
        Commands::Validate {
            input,
            profile,
            mode,
        } => cmd_validate(config, input, profile, mode),
        Commands::Fix {
            input,
            apply,
            fix_types,
            confidence,
            max_fixes,
            upgrade_versions,
            output,
        } => cmd_fix(
            config,
            input,
            apply,
            fix_types,
            confidence,
            max_fixes,
            upgrade_versions,
            output,
        ),
        Commands::Apply {
            input,
            ops,
            dry_run,
            continue_on_error,
            output,
        } => cmd_apply(config, input, ops, dry_run, continue_on_error, output),
        Commands::Nodes { command } => cmd_nodes(config, command),
        Commands::History { workflow_id } => cmd_history(&workflow_id),
        Commands::List => cmd_list(config, lifecycle).await,
        Commands::Get { id } => cmd_get(config, lifecycle, &id).await,
        Commands::Push {
            input,
            id,
            strict_backup,
        } => cmd_push(config, lifecycle, input, id, strict_backup).await,
        Commands::Delete { id, strict_backup } => {
            cmd_delete(config, lifecycle, &id, strict_backup).await
        }
        Commands::Trigger { url, data, wait } => {
            cmd_trigger(config, lifecycle, &url, data, wait).await
        }
        Commands::Executions { command } => cmd_executions(config, lifecycle, command).await,
        Commands::Health => cmd_health(config, lifecycle).await,
    }
}

// ============================================================================
// 3. LOCAL COMMANDS
// ============================================================================

fn load_workflow_file(input: &WorkflowFileArgs) -> Result<Workflow, CliError> {
    let raw = std::fs::read_to_string(&input.file).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CliError::NotFound {
                what: input.file.display().to_string(),
            }
        } else {
            CliError::Io(e)
        }
    })?;
    parse::parse_workflow(
        &raw,
        &ParseOptions {
            relaxed: input.relaxed,
        },
    )
}

fn open_catalog(config: &Config) -> Result<CatalogStore, CliError> {
    CatalogStore::open(config.catalog_path())
}

fn cmd_validate(
    config: &Config,
    input: WorkflowFileArgs,
    profile: Profile,
    mode: Mode,
) -> Result<(), CliError> {
    let workflow = load_workflow_file(&input)?;
    let catalog = open_catalog(config)?;
    let report = Validator::new(&catalog).validate(&workflow, profile, mode);

    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    if report.has_errors() {
        return Err(CliError::ValidationFailed {
            diagnostics: report.issues,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_fix(
    config: &Config,
    input: WorkflowFileArgs,
    apply: bool,
    fix_types: Vec<String>,
    confidence: Confidence,
    max_fixes: usize,
    upgrade_versions: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let workflow = load_workflow_file(&input)?;
    let catalog = open_catalog(config)?;

    let fix_types = if fix_types.is_empty() {
        None
    } else {
        let parsed: Result<Vec<FixType>, CliError> = fix_types
            .iter()
            .map(|raw| {
                serde_json::from_value(json!(raw)).map_err(|_| CliError::ConfigInvalid {
                    message: format!("unknown fix type '{raw}'"),
                })
            })
            .collect();
        Some(parsed?)
    };

    let fix_config = FixConfig {
        apply_fixes: apply,
        fix_types,
        confidence_threshold: confidence,
        max_fixes,
        upgrade_versions,
        apply_info_only: false,
    };

    let report = FixEngine::new(&catalog).generate_fixes(&workflow, None, &fix_config);
    log::info!("{}", report.summary);

    if let Some(modified) = &report.modified_workflow {
        let text = parse::serialize_workflow(modified)?;
        match &output {
            Some(path) => std::fs::write(path, text)?,
            None => println!("{text}"),
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    }
    Ok(())
}

fn cmd_apply(
    config: &Config,
    input: WorkflowFileArgs,
    ops_path: PathBuf,
    dry_run: bool,
    continue_on_error: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let workflow = load_workflow_file(&input)?;
    let raw_ops = std::fs::read_to_string(&ops_path)?;
    let ops_value = parse::parse_value(
        &raw_ops,
        &ParseOptions {
            relaxed: input.relaxed,
        },
    )?;
    let ops: Vec<DiffOp> =
        serde_json::from_value(ops_value).map_err(|e| CliError::ParseFailed {
            line: 0,
            column: 0,
            message: format!("not a diff-operation list: {e}"),
        })?;

    let catalog = open_catalog(config)?;
    let outcome = DiffEngine::new(&catalog).apply(
        &workflow,
        &ops,
        &DiffOptions {
            dry_run,
            continue_on_error,
        },
    )?;

    log::info!(
        "applied {} of {} operation(s), {} error(s)",
        outcome.applied,
        ops.len(),
        outcome.errors.len()
    );
    for err in &outcome.errors {
        log::warn!("op {} ({}) failed: {}", err.index, err.op, err.message);
    }

    let text = parse::serialize_workflow(&outcome.workflow)?;
    match &output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

fn cmd_nodes(config: &Config, command: NodesCommands) -> Result<(), CliError> {
    let catalog = open_catalog(config)?;
    match command {
        NodesCommands::Search { query, mode, limit } => {
            let outcome = catalog
                .search(&query, mode.into(), limit)
                .map_err(|e| CliError::internal(format!("catalog search failed: {e}")))?;
            println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());
        }
        NodesCommands::Info { node_type } => {
            let record = catalog
                .lookup_by_type(&node_type)
                .map_err(|e| CliError::internal(format!("catalog lookup failed: {e}")))?
                .ok_or(CliError::NotFound {
                    what: format!("node type '{node_type}'"),
                })?;
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
        }
        NodesCommands::Versions { node_type } => {
            let full = catalog
                .normalize_type(&node_type)
                .map_err(|e| CliError::internal(format!("catalog lookup failed: {e}")))?
                .ok_or(CliError::NotFound {
                    what: format!("node type '{node_type}'"),
                })?;
            let versions = catalog
                .versions(&full)
                .map_err(|e| CliError::internal(format!("catalog lookup failed: {e}")))?;
            println!("{}", serde_json::to_string_pretty(&json!({
                "type": full,
                "versions": versions,
            })).unwrap_or_default());
        }
    }
    Ok(())
}

fn cmd_history(workflow_id: &str) -> Result<(), CliError> {
    let store = LocalStore::open(config::state_dir())?;
    let snapshots = store
        .list_snapshots(workflow_id)
        .map_err(|e| CliError::internal(format!("snapshot query failed: {e}")))?;
    println!("{}", serde_json::to_string_pretty(&snapshots).unwrap_or_default());
    store.close();
    Ok(())
}

// ============================================================================
// 4. REMOTE COMMANDS
// ============================================================================

async fn cmd_list(config: &Config, lifecycle: &Lifecycle) -> Result<(), CliError> {
    let client = ApiClient::new(config)?;
    let workflows = client.list_workflows(&lifecycle.token()).await?;
    println!("{}", serde_json::to_string_pretty(&workflows).unwrap_or_default());
    Ok(())
}

async fn cmd_get(config: &Config, lifecycle: &Lifecycle, id: &str) -> Result<(), CliError> {
    let client = ApiClient::new(config)?;
    let workflow = client.get_workflow(&lifecycle.token(), id).await?;
    println!("{}", parse::serialize_workflow(&workflow)?);
    Ok(())
}

/// Backup the current server-side document before mutating it. Best
/// effort unless strict: a failed backup logs a warning and the mutation
/// proceeds.
async fn backup_before_mutation(
    client: &ApiClient,
    lifecycle: &Lifecycle,
    operation: &str,
    id: &str,
    strict: bool,
) -> Result<(), CliError> {
    let result = async {
        let current = client.get_workflow(&lifecycle.token(), id).await?;
        let json = parse::serialize_workflow(&current)?;
        let store = LocalStore::open(config::state_dir())?;
        let path = store
            .backup_workflow(operation, id, &json)
            .map_err(|e| CliError::internal(format!("backup failed: {e}")))?;
        store.close();
        log::info!("backed up workflow {id} to {}", path.display());
        Ok::<(), CliError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if strict => Err(e),
        Err(e) => {
            log::warn!("pre-mutation backup failed (continuing): {e}");
            Ok(())
        }
    }
}

async fn cmd_push(
    config: &Config,
    lifecycle: &Lifecycle,
    input: WorkflowFileArgs,
    id: Option<String>,
    strict_backup: bool,
) -> Result<(), CliError> {
    let workflow = load_workflow_file(&input)?;
    let client = ApiClient::new(config)?;

    let saved = match id {
        Some(id) => {
            backup_before_mutation(&client, lifecycle, "update", &id, strict_backup).await?;
            client
                .update_workflow(&lifecycle.token(), &id, &workflow)
                .await?
        }
        None => client.create_workflow(&lifecycle.token(), &workflow).await?,
    };
    log::info!(
        "pushed workflow '{}' (id {})",
        saved.name,
        saved.id.as_deref().unwrap_or("?")
    );
    Ok(())
}

async fn cmd_delete(
    config: &Config,
    lifecycle: &Lifecycle,
    id: &str,
    strict_backup: bool,
) -> Result<(), CliError> {
    let client = ApiClient::new(config)?;
    backup_before_mutation(&client, lifecycle, "delete", id, strict_backup).await?;
    client.delete_workflow(&lifecycle.token(), id).await?;
    log::info!("deleted workflow {id}");
    Ok(())
}

async fn cmd_trigger(
    config: &Config,
    lifecycle: &Lifecycle,
    url: &str,
    data: Option<String>,
    wait: bool,
) -> Result<(), CliError> {
    let body = match data {
        Some(raw) => Some(parse::parse_value(&raw, &ParseOptions::default())?),
        None => None,
    };
    let client = ApiClient::new(config)?;
    let response = client
        .trigger_webhook(&lifecycle.token(), url, body, wait)
        .await?;
    println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
    Ok(())
}

async fn cmd_executions(
    config: &Config,
    lifecycle: &Lifecycle,
    command: ExecutionsCommands,
) -> Result<(), CliError> {
    let client = ApiClient::new(config)?;
    let token = lifecycle.token();
    let value = match command {
        ExecutionsCommands::List { workflow_id, limit } => {
            client
                .list_executions(&token, workflow_id.as_deref(), limit)
                .await?
        }
        ExecutionsCommands::Get { id, data } => client.get_execution(&token, &id, data).await?,
        ExecutionsCommands::Retry { id } => client.retry_execution(&token, &id).await?,
        ExecutionsCommands::Delete { id } => {
            client.delete_execution(&token, &id).await?;
            json!({ "deleted": id })
        }
    };
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    Ok(())
}

async fn cmd_health(config: &Config, lifecycle: &Lifecycle) -> Result<(), CliError> {
    let client = ApiClient::new(config)?;
    let health = client.health(&lifecycle.token()).await?;
    println!("{}", serde_json::to_string_pretty(&health).unwrap_or_default());
    Ok(())
}
