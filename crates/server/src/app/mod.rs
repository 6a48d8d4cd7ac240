mod authority_port;
mod bootstrap;
mod loop_runner;
mod metrics;
mod scenario;

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use hexfront_engine::ability::AbilityCatalog;
use hexfront_engine::command::{AuthorityServer, LocalAuthority};
use hexfront_engine::grid::TerrainProvider;
use hexfront_engine::replay::{replay, CommandLog};
use hexfront_engine::sim::Simulation;
use tracing::{error, info};

use authority_port::TcpReplicaHub;
use bootstrap::{HostConfig, HostError, HostMode, HostOptions};
use loop_runner::{run_headless, run_realtime, LoopSummary, TickDriver};

pub(crate) fn run() -> ExitCode {
    bootstrap::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", bootstrap::usage_text());
        return ExitCode::SUCCESS;
    }
    let options = match bootstrap::parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("{}", bootstrap::usage_text());
            return ExitCode::from(2);
        }
    };

    match host(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "host_failed");
            ExitCode::FAILURE
        }
    }
}

fn host(options: HostOptions) -> Result<(), HostError> {
    let config = bootstrap::load_config()?;
    let terrain: Arc<dyn TerrainProvider> = Arc::new(scenario::build_terrain(&config.scenario));
    let catalog = Arc::new(AbilityCatalog::standard());
    info!(
        mode = ?options.mode,
        ticks = ?options.ticks,
        width = config.scenario.map_width,
        height = config.scenario.map_height,
        "host_starting"
    );

    match &options.mode {
        HostMode::Replay { path } => replay_file(&config, terrain, catalog, path, options.ticks),
        HostMode::Local => {
            let sim = Simulation::new(config.sim.clone(), terrain, catalog);
            let mut authority = if options.record.is_some() {
                LocalAuthority::recording(sim)
            } else {
                LocalAuthority::new(sim)
            };
            scenario::stage(&mut authority, &config.scenario)?;
            drive(&mut authority, &options)?;
            save_recording(&mut authority, options.record.as_deref())
        }
        HostMode::Authority { port } => {
            let hub = TcpReplicaHub::bind_localhost(*port).map_err(|source| HostError::Bind {
                port: *port,
                source,
            })?;
            info!(port = hub.bound_port(), "authority_ready");
            let sim = Simulation::new(config.sim.clone(), terrain, catalog);
            let authority = if options.record.is_some() {
                LocalAuthority::recording(sim)
            } else {
                LocalAuthority::new(sim)
            };
            let mut server = AuthorityServer::new(authority, hub);
            scenario::stage(&mut server, &config.scenario)?;
            drive(&mut server, &options)?;
            info!(replicas = server.hub_mut().replica_count(), "authority_stopping");
            save_recording(server.authority_mut(), options.record.as_deref())
        }
    }
}

fn drive<D: TickDriver>(driver: &mut D, options: &HostOptions) -> Result<LoopSummary, HostError> {
    match options.ticks {
        Some(ticks) if options.headless => run_headless(driver, ticks),
        ticks => run_realtime(driver, ticks),
    }
}

fn save_recording(authority: &mut LocalAuthority, path: Option<&Path>) -> Result<(), HostError> {
    let (Some(path), Some(log)) = (path, authority.take_command_log()) else {
        return Ok(());
    };
    log.save(path)?;
    Ok(())
}

fn replay_file(
    config: &HostConfig,
    terrain: Arc<dyn TerrainProvider>,
    catalog: Arc<AbilityCatalog>,
    path: &Path,
    ticks: Option<u64>,
) -> Result<(), HostError> {
    let log = CommandLog::load(path)?;
    let ticks = ticks.unwrap_or(log.final_tick());
    let report = replay(config.sim.clone(), terrain, catalog, &log, ticks)?;
    println!(
        "replay ticks:{} commands:{} skipped:{} notifications:{} entities:{} digest:{}",
        report.ticks,
        report.commands_applied,
        report.commands_skipped,
        report.notifications,
        report.final_entity_count,
        report.digest
    );
    Ok(())
}
