use std::net::SocketAddr;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use core_types::{Network, PlaybackMode, Slot};

mod bootstrap;
mod config_loader;
mod control_api;
mod offline;
mod state;

use config_loader::{BoundsSourceKind, ConfigOverrides};
use offline::{print_json, Simulation};

#[derive(Parser, Debug)]
#[command(name = "slot-player", about = "Beacon chain slot playback engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the player and its control API.
    Run(RunArgs),
    /// Print the slot containing a unix timestamp.
    SlotAt(SlotAtArgs),
    /// Print epoch position and start time of a slot.
    SlotInfo(SlotInfoArgs),
    /// Play an offline player against fixed bounds and print the final snapshot.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(long, env = "SLOT_PLAYER_NETWORK")]
    network: Option<Network>,
    #[arg(long, env = "SLOT_PLAYER_BIND")]
    bind: Option<SocketAddr>,
    #[arg(long, value_enum)]
    source: Option<BoundsSourceKind>,
    #[arg(long, env = "SLOT_PLAYER_BEACON_URL")]
    beacon_url: Option<String>,
    #[arg(long)]
    mode: Option<PlaybackMode>,
}

impl From<RunArgs> for ConfigOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            network: args.network,
            bind: args.bind,
            source: args.source,
            beacon_url: args.beacon_url,
            mode: args.mode,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SlotAtArgs {
    #[arg(long, default_value = "mainnet")]
    network: Network,
    /// Unix seconds.
    timestamp: i64,
}

#[derive(Args, Debug, Clone)]
struct SlotInfoArgs {
    #[arg(long, default_value = "mainnet")]
    network: Network,
    #[arg(allow_negative_numbers = true)]
    slot: Slot,
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[arg(long, default_value = "mainnet")]
    network: Network,
    #[arg(long, default_value_t = 100)]
    head: Slot,
    #[arg(long)]
    min: Option<Slot>,
    #[arg(long, default_value = "continuous")]
    mode: PlaybackMode,
    #[arg(long)]
    from: Option<Slot>,
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,
    #[arg(long, default_value_t = 50.0)]
    tick_ms: f64,
    #[arg(long, default_value_t = false)]
    follow_head: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => bootstrap::async_main(args.into()).await,
        Commands::SlotAt(args) => {
            print_json(&offline::slot_at(args.network.params(), args.timestamp))
        }
        Commands::SlotInfo(args) => {
            print_json(&offline::slot_info(args.network.params(), args.slot))
        }
        Commands::Simulate(args) => {
            let sim = Simulation {
                head_slot: args.head,
                backfill_min_slot: args.min,
                mode: args.mode,
                from_slot: args.from,
                speed: args.speed,
                duration_ms: args.seconds.max(0.0) * 1_000.0,
                tick_ms: args.tick_ms,
                follow_head: args.follow_head,
            };
            print_json(&offline::simulate(args.network.params(), &sim))
        }
    }
}
