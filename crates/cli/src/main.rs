//! Command-line front end for dataset reconciliation.
//!
//! Compares local and remote dataset snapshots against their last
//! synchronized baseline, shows the differences grouped by dataset type,
//! applies resolution directives, and records them in the resolution
//! journal.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use reconcile_core::config::AppConfig;
use reconcile_core::db::Database;
use reconcile_core::diff::{Merger, ResolutionRequest, Resolver};
use reconcile_core::model::{Classification, DiffEntry};
use reconcile_core::session::ReconcileSession;
use reconcile_core::tree::{DiffTree, NodeId};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Three-way dataset reconciliation tool.
#[derive(Parser, Debug)]
#[command(
    name = "reconcile",
    version,
    about = "Compare, resolve, and journal differences between local and remote datasets"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "reconcile.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./reconcile.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Classify the snapshots and print the differences grouped by type.
    Diff,

    /// Show one dataset's classification and payload diff.
    Show {
        /// Dataset ID.
        id: String,
    },

    /// Apply a directive file and record the resolutions in the journal.
    Apply {
        /// JSON file holding a list of directives.
        #[arg(short, long)]
        directives: Option<PathBuf>,

        /// Resolve one-sided changes and cleanly mergeable conflicts first.
        #[arg(long)]
        auto: bool,
    },

    /// Show recently journaled resolutions.
    Journal {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

/// One line of a directive file:
/// `{"dataset_id": "p1", "directive": "merged", "payload": {...}, "override": false}`
#[derive(Debug, Deserialize)]
struct DirectiveLine {
    dataset_id: String,
    #[serde(flatten)]
    request: ResolutionRequest,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.config);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level, falling back to `warn`
/// when no config can be read yet.
fn init_logging(config_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = AppConfig::load_from_file(config_path)
            .map(|c| c.session.log_level)
            .unwrap_or_else(|_| "warn".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Diff => cmd_diff(&load_config(&cli.config)?),
        Commands::Show { id } => cmd_show(&load_config(&cli.config)?, &id),
        Commands::Apply { directives, auto } => {
            cmd_apply(&load_config(&cli.config)?, directives.as_deref(), auto)
        }
        Commands::Journal { limit } => cmd_journal(&load_config(&cli.config)?, limit),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

fn open_session(config: &AppConfig) -> Result<ReconcileSession> {
    ReconcileSession::from_config(config).context("failed to compare snapshots")
}

fn open_journal(config: &AppConfig) -> Result<Database> {
    let db = Database::new(config.journal_path()).context("failed to open journal")?;
    db.initialize().context("failed to initialize journal")?;
    Ok(db)
}

fn read_directives(path: &Path) -> Result<Vec<DirectiveLine>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read directive file {}", path.display()))?;
    parse_directives(&contents)
        .with_context(|| format!("invalid directive file {}", path.display()))
}

fn parse_directives(contents: &str) -> Result<Vec<DirectiveLine>> {
    let lines: Vec<DirectiveLine> = serde_json::from_str(contents)?;
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# Dataset reconciliation configuration.

[session]
log_level = "info"
data_dir = ".reconcile"

[snapshots]
local = "local.json"
remote = "remote.json"
# A missing baseline file is treated as "never synchronized".
baseline = "baseline.json"

[compare]
# Top-level payload fields that never count as a change.
ignored_fields = ["lastChange", "version"]
max_id_length = 255

[resolver]
# Side overwritten when a merged payload matches neither side:
# "overwrite_remote" or "overwrite_local".
merged_tie_break = "overwrite_remote"
auto_resolve_one_sided = true
auto_merge_conflicts = true

[display]
type_order = ["project", "product_system", "process", "flow", "flow_property",
              "unit_group", "impact_method", "impact_category", "social_indicator",
              "parameter", "actor", "source", "location", "currency", "dq_system",
              "category"]
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Export the local and remote snapshots as JSON dataset lists");
    println!("  2. Point the [snapshots] section at them");
    println!("  3. Inspect differences: reconcile diff --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All fields are valid"));

    for (label, path) in [
        ("local", &config.snapshots.local),
        ("remote", &config.snapshots.remote),
    ] {
        if !path.exists() {
            println!(
                "  {}",
                style::warn(&format!("{} snapshot not found: {}", label, path.display()))
            );
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Local snapshot   : {}", config.snapshots.local.display());
    println!("  Remote snapshot  : {}", config.snapshots.remote.display());
    println!("  Baseline         : {}", config.snapshots.baseline.display());
    println!("  Ignored fields   : {}", config.compare.ignored_fields.join(", "));
    println!("  Merged tie-break : {:?}", config.resolver.merged_tie_break);
    println!("  Journal          : {}", config.journal_path().display());
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}

fn cmd_diff(config: &AppConfig) -> Result<()> {
    let session = open_session(config)?;
    let tree = session.project(&config.display.type_order);

    if tree.children(tree.root()).is_empty() {
        println!();
        println!("{}", style::success("Local and remote are in sync"));
        println!();
        return Ok(());
    }

    println!();
    for &group in tree.children(tree.root()) {
        print_group(&tree, group, session.entries());
    }
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Classification", "Datasets"]);
    for c in Classification::ALL {
        let count = session
            .entries()
            .iter()
            .filter(|e| e.classification() == c)
            .count();
        if count > 0 {
            table.add_row(vec![Cell::new(c), Cell::new(count)]);
        }
    }
    println!("{}", table);
    println!();

    Ok(())
}

fn print_group(tree: &DiffTree, group: NodeId, entries: &[DiffEntry]) {
    let Some(label) = tree.label(group, entries) else {
        return;
    };
    let children = tree.children(group);
    println!(
        "{} {}",
        style::header(&label.text),
        style::dim(&format!("({})", children.len()))
    );
    for &child in children {
        let (Some(label), Some(entry)) = (tree.label(child, entries), tree.entry(child, entries))
        else {
            continue;
        };
        let marker = label.overlay.map(style::overlay).unwrap_or_default();
        println!(
            "  {:<40} {:<38} {}",
            label.text,
            style::dim(entry.dataset_id()),
            marker
        );
    }
}

fn cmd_show(config: &AppConfig, id: &str) -> Result<()> {
    let session = open_session(config)?;
    let entry = session
        .entry(id)
        .ok_or_else(|| anyhow::anyhow!("dataset '{}' not found in any snapshot", id))?;

    let title = format!("{} ({})", entry.display_name(), entry.dataset_id());
    println!("{}", style::header(&title));
    println!("{}", "=".repeat(title.chars().count()));
    println!();
    println!("  Type           : {}", entry.dataset_type());
    println!("  Classification : {}", entry.classification());
    println!(
        "  Local          : {}",
        presence(entry.local_payload().is_some())
    );
    println!(
        "  Remote         : {}",
        presence(entry.remote_payload().is_some())
    );
    println!(
        "  Baseline       : {}",
        presence(entry.baseline_payload().is_some())
    );

    if entry.classification() == Classification::Unchanged {
        return Ok(());
    }

    println!();
    println!("{}", style::dim("--- local / +++ remote"));
    print!(
        "{}",
        Merger::render_diff(entry.local_payload(), entry.remote_payload())
    );

    if entry.classification() == Classification::Conflict {
        let resolver = Resolver::new(&config.resolver, &config.compare);
        let result = resolver.merger().three_way_merge(
            entry.baseline_payload(),
            entry.local_payload(),
            entry.remote_payload(),
        );
        println!();
        if result.has_conflicts {
            println!(
                "{}",
                style::warn(&format!(
                    "Needs a manual decision, conflicting paths: {}",
                    result.conflicting_paths.join(", ")
                ))
            );
        } else {
            println!("{}", style::success("Both sides merge cleanly"));
        }
    }

    Ok(())
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}

fn cmd_apply(config: &AppConfig, directives: Option<&Path>, auto: bool) -> Result<()> {
    if directives.is_none() && !auto {
        anyhow::bail!("nothing to apply: pass --directives <file>, --auto, or both");
    }

    let mut session = open_session(config)?;
    info!(session_id = %session.id(), "applying directives");

    if auto {
        let summary = session.auto_resolve();
        println!(
            "{}",
            style::success(&format!(
                "Automatically resolved {} dataset(s)",
                summary.resolved
            ))
        );
    }

    if let Some(path) = directives {
        let lines = read_directives(path)?;
        debug!(count = lines.len(), "directive file loaded");
        for line in lines {
            session
                .resolve(&line.dataset_id, line.request)
                .with_context(|| format!("failed to resolve '{}'", line.dataset_id))?;
        }
    }

    let mut journal = open_journal(config)?;
    let session_id = session.id().to_string();
    let summary = match session.commit(&mut journal) {
        Ok(summary) => summary,
        Err(e) => {
            let details = format!("session {} failed to commit: {}", session_id, e);
            journal
                .insert_audit_log("session_committed", None, Some(&details), false)
                .context("failed to record audit entry")?;
            return Err(e).context("failed to record resolutions");
        }
    };
    let details = format!(
        "session {}: {} committed, {} unresolved",
        session_id, summary.committed, summary.unresolved
    );
    journal
        .insert_audit_log("session_committed", None, Some(&details), true)
        .context("failed to record audit entry")?;

    println!(
        "{}",
        style::success(&format!(
            "Recorded {} resolution(s) in {}",
            summary.committed,
            config.journal_path().display()
        ))
    );
    if summary.unresolved > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} dataset(s) still need a decision",
                summary.unresolved
            ))
        );
        for entry in session.unresolved() {
            println!(
                "    {} {}",
                entry.dataset_id(),
                style::dim(&format!("({})", entry.classification()))
            );
        }
    }

    Ok(())
}

fn cmd_journal(config: &AppConfig, limit: u32) -> Result<()> {
    let journal = open_journal(config)?;
    let entries = journal
        .list_resolutions(limit)
        .context("failed to list resolutions")?;

    if entries.is_empty() {
        println!("No resolutions recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Resolved", "Dataset", "Type", "Directive", "Overwrites"]);

    for e in &entries {
        let target = if e.overwrite_local { "local" } else { "remote" };
        table.add_row(vec![
            Cell::new(&e.resolved_at[..19.min(e.resolved_at.len())]),
            Cell::new(&e.dataset_id),
            Cell::new(&e.dataset_type),
            Cell::new(&e.directive),
            Cell::new(target),
        ]);
    }

    println!("{}", table);
    println!("{} entries shown", entries.len());

    Ok(())
}
