//! Pursuit Viewer CLI
//!
//! Command-line consumer of the pursuit client pipeline: manage
//! simulations over REST and watch one live, printing agent positions
//! and hunter-target distances as updates arrive.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pursuit_core::live::{LiveConfig, LiveConnections, LiveError, LiveHandlers};
use pursuit_core::model::{NewSimulation, Simulation, StateUpdate};
use pursuit_core::store::{SimulationField, SimulationStore, StatusPatch};
use pursuit_core::ws::WsTransport;
use pursuit_core::{ServerEndpoint, SimulationGateway};
use pursuit_env::{CloseInfo, TokioContext};

/// Pursuit simulation viewer
#[derive(Parser, Debug)]
#[command(name = "pursuit-viewer")]
#[command(about = "Control and watch pursuit simulations", long_about = None)]
struct Args {
    /// Backend host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Backend port
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Use https/wss instead of http/ws
    #[arg(long)]
    secure: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all simulations
    List,

    /// Show one simulation's full record
    Show { id: u64 },

    /// Create a new simulation
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value = "500")]
        environment_size: u32,

        #[arg(long, default_value = "5")]
        hunters: u32,

        #[arg(long, default_value = "1")]
        targets: u32,

        /// Pursuit algorithm (APF, CONSENSUS)
        #[arg(long, default_value = "APF")]
        algorithm: String,

        #[arg(long, default_value = "1000")]
        max_steps: u64,
    },

    /// Start a simulation
    Start { id: u64 },

    /// Stop a simulation
    Stop { id: u64 },

    /// Reset a simulation to its initial state
    Reset { id: u64 },

    /// Delete a simulation
    Delete { id: u64 },

    /// Watch a simulation live
    Watch {
        id: u64,

        /// Stop watching after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
}

/// Events forwarded from the live-channel callbacks to the watch loop.
#[derive(Debug)]
enum ViewerEvent {
    Opened,
    Update(StateUpdate),
    Closed(CloseInfo),
    Error(LiveError),
    Reconnected(u32),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let endpoint = ServerEndpoint::new(args.host.clone())
        .with_port(args.port)
        .with_secure(args.secure);
    let ctx = TokioContext::shared();
    let gateway = SimulationGateway::new(Arc::clone(&ctx), endpoint.clone())?;

    match args.command {
        Command::List => {
            let simulations = gateway.list().await?;
            if simulations.is_empty() {
                println!("no simulations");
            }
            for sim in &simulations {
                println!("{}", summary_line(sim));
            }
        }
        Command::Show { id } => {
            let sim = gateway.get(id).await?;
            println!("{}", summary_line(&sim));
            println!(
                "  env {}x{}  algorithm {}  step {}/{}",
                sim.environment_size, sim.environment_size, sim.algorithm_type,
                sim.step_count, sim.max_steps
            );
            for hunter in &sim.hunters {
                println!("  hunter {}: ({:.1}, {:.1})", hunter.id, hunter.position[0], hunter.position[1]);
            }
            for target in &sim.targets {
                println!("  target {}: ({:.1}, {:.1})", target.id, target.position[0], target.position[1]);
            }
        }
        Command::Create {
            name,
            description,
            environment_size,
            hunters,
            targets,
            algorithm,
            max_steps,
        } => {
            let new = NewSimulation {
                name,
                description,
                environment_size,
                num_hunters: hunters,
                num_targets: targets,
                algorithm_type: algorithm,
                max_steps,
            };
            let sim = gateway.create(&new).await?;
            println!("created simulation {}", sim.id);
        }
        Command::Start { id } => {
            gateway.start(id).await?;
            println!("simulation {id} started");
        }
        Command::Stop { id } => {
            gateway.stop(id).await?;
            println!("simulation {id} stopped");
        }
        Command::Reset { id } => {
            gateway.reset(id).await?;
            println!("simulation {id} reset");
        }
        Command::Delete { id } => {
            gateway.delete(id).await?;
            println!("simulation {id} deleted");
        }
        Command::Watch { id, duration } => {
            watch(ctx, gateway, endpoint, id, duration).await?;
        }
    }

    Ok(())
}

/// Fetches the record, seeds the store, opens the live channel, and
/// applies every update until interrupted or the channel goes terminal.
async fn watch(
    ctx: Arc<TokioContext>,
    gateway: SimulationGateway<TokioContext>,
    endpoint: ServerEndpoint,
    id: u64,
    duration: Option<u64>,
) -> Result<()> {
    let mut store = SimulationStore::new();

    store.set_loading(true);
    let initial = match gateway.get(id).await {
        Ok(sim) => sim,
        Err(error) => {
            store.set_loading(false);
            store.set_error(Some(error.clone()));
            return Err(error.into());
        }
    };
    store.set_loading(false);
    store.set_current(initial);
    print_state(&store, id);

    let (tx, mut rx) = mpsc::unbounded_channel::<ViewerEvent>();
    let handlers = {
        let open_tx = tx.clone();
        let update_tx = tx.clone();
        let close_tx = tx.clone();
        let error_tx = tx.clone();
        LiveHandlers::new()
            .on_open(move || {
                let _ = open_tx.send(ViewerEvent::Opened);
            })
            .on_message(move |update, _raw| {
                let _ = update_tx.send(ViewerEvent::Update(update));
            })
            .on_close(move |info| {
                let _ = close_tx.send(ViewerEvent::Closed(info));
            })
            .on_error(move |error| {
                let _ = error_tx.send(ViewerEvent::Error(error));
            })
            .on_reconnect(move |attempt| {
                let _ = tx.send(ViewerEvent::Reconnected(attempt));
            })
    };

    let mut connections = LiveConnections::new(ctx, Arc::new(WsTransport::new()), endpoint);
    if !connections.open(id, LiveConfig::default(), handlers) {
        return Err(anyhow!("could not open live channel for simulation {id}"));
    }

    let timeout = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing live channel");
                break;
            }
            _ = &mut timeout => {
                info!("watch duration elapsed");
                break;
            }
            event = rx.recv() => match event {
                None => break,
                Some(ViewerEvent::Opened) => info!(simulation_id = id, "live channel open"),
                Some(ViewerEvent::Reconnected(attempt)) => {
                    info!(simulation_id = id, attempt, "live channel recovered");
                }
                Some(ViewerEvent::Update(update)) => {
                    apply_update(&mut store, id, &update);
                    print_state(&store, id);
                    if store.current().map(|sim| sim.is_captured).unwrap_or(false) {
                        if let Some(time) = store.capture_time() {
                            println!("target captured after {time:.1}s");
                        }
                    }
                }
                Some(ViewerEvent::Closed(info)) => {
                    if info.is_normal() {
                        info!(%info, "live channel closed");
                        break;
                    }
                    warn!(%info, "live channel lost, reconnecting");
                }
                Some(ViewerEvent::Error(LiveError::RetriesExhausted { attempts })) => {
                    warn!(attempts, "giving up on live channel");
                    break;
                }
                Some(ViewerEvent::Error(error)) => warn!(%error, "live channel error"),
            }
        }
    }

    connections.close_all();
    Ok(())
}

/// Merges one live frame into the store.
fn apply_update(store: &mut SimulationStore, id: u64, update: &StateUpdate) {
    if update.hunters.is_some() || update.targets.is_some() {
        let snapshot = store.snapshot(id).cloned().unwrap_or_default();
        let hunters = update.hunters.clone().unwrap_or(snapshot.hunters);
        let targets = update.targets.clone().unwrap_or(snapshot.targets);
        store.update_agents(id, &hunters, &targets);
    }

    store.update_status(
        id,
        StatusPatch {
            running: update.is_running,
            captured: update.is_captured,
            escaped: update.escaped,
        },
    );

    if let Some(step) = update.step_count {
        store.update_field(id, SimulationField::StepCount(step));
    }
    if let Some(capture_time) = update.capture_time {
        store.update_field(id, SimulationField::CaptureTime(Some(capture_time)));
    }
}

fn summary_line(sim: &Simulation) -> String {
    let state = if sim.is_captured {
        "captured"
    } else if sim.escaped {
        "escaped"
    } else if sim.is_running {
        "running"
    } else {
        "idle"
    };
    format!(
        "#{} {} [{}] hunters={} targets={} algorithm={}",
        sim.id, sim.name, state, sim.num_hunters, sim.num_targets, sim.algorithm_type
    )
}

fn print_state(store: &SimulationStore, id: u64) {
    let Some(sim) = store.current() else {
        return;
    };

    let mut distances: Vec<(u64, f64)> = store.agent_distances(id).into_iter().collect();
    distances.sort_by_key(|(hunter_id, _)| *hunter_id);
    let rendered: Vec<String> = distances
        .iter()
        .map(|(hunter_id, d)| format!("h{hunter_id}:{d:.2}"))
        .collect();

    println!(
        "step {:>6}  running={}  distances [{}]",
        sim.step_count,
        sim.is_running,
        rendered.join(" ")
    );
}
