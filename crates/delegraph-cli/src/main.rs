//! delegraph command-line interface.
//!
//! Provides the `delegraph` binary: every subcommand opens the SQLite
//! database, runs one update or query through `ConnectivityService`, and
//! prints the result as JSON on stdout. Diagnostics go to stderr through
//! `tracing`, filtered by `RUST_LOG`.

use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use delegraph_core::{NodeId, NodeKind, TopicId};
use delegraph_engine::{ConnectivityService, EngineError, StrategyKind};
use delegraph_storage::SqliteStore;

/// Maintains per-topic delegation connectivity over a preference graph.
#[derive(Parser)]
#[command(name = "delegraph", about = "Delegation connectivity over preference graphs")]
struct Cli {
    /// Path to the graph database file.
    #[arg(long, global = true, env = "DELEGRAPH_DB", default_value = "delegraph.db")]
    db: String,

    /// Cache invalidation strategy: full or tracked.
    #[arg(long, global = true, env = "DELEGRAPH_STRATEGY", default_value_t = StrategyKind::Tracked)]
    strategy: StrategyKind,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Add a participant node, or a content node with --content.
    AddNode {
        #[arg(long)]
        content: bool,
    },
    /// Replace a participant's ranked candidates, best first.
    Rank { source: u32, targets: Vec<u32> },
    /// Set a MANUAL target, or clear it when TARGET is omitted.
    Target {
        topic: u64,
        source: u32,
        target: Option<u32>,
    },
    /// Anchor on content, or drop the anchor when CONTENT is omitted.
    Anchor {
        topic: u64,
        source: u32,
        content: Option<u32>,
    },
    /// Resolve a participant's anchor, caching the result.
    Resolve { topic: u64, node: u32 },
    /// Print the targeted cycle through a node, if any.
    Cycle { topic: u64, node: u32 },
    /// Count the nodes whose targeted chain passes through a node.
    Influence { topic: u64, node: u32 },
    /// Report a node's ranked and targeted neighbors.
    Neighbors { topic: u64, node: u32 },
    /// Print the blake3 digest of a topic's cached resolutions.
    Digest { topic: u64 },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Runs one subcommand.
///
/// Returns exit code: 0 = success, 1 = rejected request,
/// 2 = store invariant violated, 3 = storage or I/O error.
fn run(cli: Cli) -> i32 {
    let store = match SqliteStore::new(&cli.db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", cli.db, e);
            return 3;
        }
    };
    let mut svc = ConnectivityService::new(store, cli.strategy);

    match execute(&mut svc, cli.command) {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize result: {}\"}}", e)
            });
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                EngineError::Precondition { .. } => 1,
                EngineError::Integrity { .. } => 2,
                EngineError::Storage(_) => 3,
            }
        }
    }
}

fn execute(
    svc: &mut ConnectivityService<SqliteStore>,
    command: Commands,
) -> Result<serde_json::Value, EngineError> {
    match command {
        Commands::AddNode { content } => {
            let kind = if content {
                NodeKind::Content
            } else {
                NodeKind::Participant
            };
            let node = svc.add_node(kind)?;
            Ok(json!({ "node": node, "kind": kind }))
        }
        Commands::Rank { source, targets } => {
            let targets: Vec<NodeId> = targets.into_iter().map(NodeId).collect();
            to_value(svc.set_ranked(NodeId(source), &targets)?)
        }
        Commands::Target {
            topic,
            source,
            target,
        } => to_value(svc.set_target(TopicId(topic), NodeId(source), target.map(NodeId))?),
        Commands::Anchor {
            topic,
            source,
            content,
        } => to_value(svc.set_anchor_content(
            TopicId(topic),
            NodeId(source),
            content.map(NodeId),
        )?),
        Commands::Resolve { topic, node } => {
            let anchor = svc.resolve(TopicId(topic), NodeId(node))?;
            Ok(json!({ "node": node, "connected": anchor.is_some(), "anchor": anchor }))
        }
        Commands::Cycle { topic, node } => {
            let members = svc.cycle(TopicId(topic), NodeId(node))?;
            Ok(json!({ "node": node, "cycle": members }))
        }
        Commands::Influence { topic, node } => {
            let influence = svc.influence(TopicId(topic), NodeId(node))?;
            Ok(json!({ "node": node, "influence": influence }))
        }
        Commands::Neighbors { topic, node } => {
            to_value(svc.neighbors(TopicId(topic), NodeId(node))?)
        }
        Commands::Digest { topic } => {
            let digest = svc.digest(TopicId(topic))?;
            Ok(json!({ "topic": topic, "digest": digest.to_hex().as_str() }))
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Integrity {
        reason: format!("failed to serialize result: {e}"),
    })
}
