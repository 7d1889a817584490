// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - NODE CLI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use colored::*;
use dml_node::{simulated_validators, LedgerConfig, LedgerNode, NodeStatus, TrafficGenerator};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dml-node")]
#[command(about = "Dimensional Ledger - simulated sharded ledger node", long_about = None)]
#[command(version)]
struct Cli {
    /// Node configuration (TOML). Built-in defaults when omitted.
    #[arg(short, long, env = "DML_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node against simulated traffic
    Run {
        /// Production rounds
        #[arg(short, long, default_value_t = 5)]
        rounds: usize,

        /// Transactions submitted per round
        #[arg(short, long, default_value_t = 20)]
        transactions: usize,

        /// Validators generated when the config lists none
        #[arg(long, default_value_t = 4)]
        validators: usize,

        /// Simulated wallets sending traffic
        #[arg(long, default_value_t = 8)]
        wallets: usize,

        /// Pause between rounds
        #[arg(long, default_value_t = 100)]
        round_delay_ms: u64,

        /// Write the final node state as JSON
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Write the default configuration
    InitConfig {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Re-validate an exported node and print its status
    Inspect {
        /// Exported JSON file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    print_banner();

    let config = match &cli.config {
        Some(path) => {
            print_info(&format!("Loading config from {}", path.display()));
            LedgerConfig::load_from_file(path)?
        }
        None => LedgerConfig::default(),
    };

    match cli.command {
        Commands::Run {
            rounds,
            transactions,
            validators,
            wallets,
            round_delay_ms,
            export,
        } => {
            let opts = RunOptions {
                rounds,
                transactions,
                validators,
                wallets,
                round_delay: Duration::from_millis(round_delay_ms),
            };
            run(config, opts, export.as_deref()).await?
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            print_success(&format!("Configuration written to {}", output.display()));
        }
        Commands::Inspect { input } => {
            let json = std::fs::read_to_string(&input)?;
            let node = LedgerNode::restore(config, &json)?;
            print_success("Chain re-validated");
            print_status(&node.status());
        }
    }

    Ok(())
}

struct RunOptions {
    rounds: usize,
    transactions: usize,
    validators: usize,
    wallets: usize,
    round_delay: Duration,
}

async fn run(mut config: LedgerConfig, opts: RunOptions, export: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if config.node.validators.is_empty() {
        config.node.validators =
            simulated_validators(opts.validators, &config.consensus.min_stake, config.node.simulation_seed)?;
    }
    let seed = config.node.simulation_seed;
    let node = LedgerNode::new(config)?;
    let tasks = node.spawn_background_tasks();
    let mut traffic = TrafficGenerator::new(opts.wallets, seed)?;

    let shard_count = node.config().chain.shard_count;
    let cross_shard = node.config().network.cross_shard_enabled;
    let mut rejected = 0usize;

    for round in 1..=opts.rounds {
        for tx in traffic.batch(opts.transactions)? {
            let submitted = if cross_shard && tx.is_cross_shard(shard_count) {
                node.submit_cross_shard_transaction(tx).await.map(|_| ())
            } else {
                node.submit_transaction(tx).map(|_| ())
            };
            if let Err(e) = submitted {
                rejected += 1;
                print_error(&format!("Transaction rejected: {}", e));
            }
        }

        let produced = node.produce_pending(usize::MAX).await?;
        for p in &produced {
            println!(
                "{} #{} shard {} {} txs by {} ({} delivered, {} timed out, {} offline)",
                "▶".cyan().bold(),
                p.block.number.to_string().cyan(),
                p.block.shard_id,
                p.block.transactions.len(),
                p.proposer,
                p.propagation.delivered.len(),
                p.propagation.timed_out.len(),
                p.propagation.failed.len()
            );
        }
        print_info(&format!("Round {}/{}: {} blocks", round, opts.rounds, produced.len()));
        tokio::time::sleep(opts.round_delay).await;
    }

    if let Some(cp) = node.checkpoint_tick()? {
        print_info(&format!("Final checkpoint at #{}", cp.block_number));
    }
    node.fork_monitor_tick();
    tasks.shutdown().await;

    if rejected > 0 {
        print_error(&format!("{} transactions rejected", rejected));
    }
    print_status(&node.status());

    if let Some(path) = export {
        std::fs::write(path, node.export_json()?)?;
        print_success(&format!("Node state exported to {}", path.display()));
    }
    Ok(())
}

fn print_status(status: &NodeStatus) {
    println!();
    println!("{} {}", "Node:".bold(), status.node_id.cyan());
    println!("{} {}", "Height:".bold(), status.height.to_string().cyan());
    println!("{} {}", "Head:".bold(), status.head_hash.green());
    println!(
        "{} {} confirmed, {} pending",
        "Transactions:".bold(),
        status.chain.total_transactions,
        status.chain.pending_transactions
    );
    println!(
        "{} {}/{} active, total stake {}",
        "Validators:".bold(),
        status.consensus.active_validators,
        status.consensus.total_validators,
        status.consensus.total_stake
    );
    println!(
        "{} {} nodes over {} shards ({} healthy)",
        "Network:".bold(),
        status.network.total_nodes,
        status.network.total_shards,
        status.network.healthy_nodes
    );
    println!(
        "{} {} checkpoints, {} forks ({} active), {} partitions active",
        "Healing:".bold(),
        status.healing.checkpoints.total,
        status.healing.forks.total,
        status.health.active_forks,
        status.health.active_partitions
    );
    if status.health.healthy {
        print_success("System healthy");
    } else {
        print_error("System degraded");
    }
}

fn print_banner() {
    println!("{}", "╔═══════════════════════════════════════════════╗".cyan());
    println!("{}", "║      DIMENSIONAL LEDGER (DML) - NODE          ║".cyan().bold());
    println!("{}", "╚═══════════════════════════════════════════════╝".cyan());
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

// ─────────────────────────────────────────────────────────────────
// UNIT TESTS
// ─────────────────────────────────────────────────────────────────
