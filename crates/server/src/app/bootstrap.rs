use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hexfront_engine::replay::ReplayError;
use hexfront_engine::sim::{SimConfig, SimError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::authority_port::{AUTHORITY_PORT_ENV_VAR, DEFAULT_AUTHORITY_PORT};
use super::scenario::ScenarioConfig;

pub(crate) const CONFIG_ENV_VAR: &str = "HEXFRONT_CONFIG";

/// Optional JSON file named by `HEXFRONT_CONFIG`. Every field defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct HostConfig {
    pub(crate) sim: SimConfig,
    pub(crate) scenario: ScenarioConfig,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path} at `{field}`: {message}")]
    Parse {
        path: PathBuf,
        field: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error("failed to bind authority port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostMode {
    /// Runs the demo skirmish with an in-process authority.
    Local,
    /// Runs the demo skirmish and serves replicas on a localhost port.
    Authority { port: u16 },
    /// Replays a command log headlessly and prints its digest.
    Replay { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostOptions {
    pub(crate) mode: HostMode,
    pub(crate) ticks: Option<u64>,
    pub(crate) record: Option<PathBuf>,
    /// Runs ticks back to back instead of on the wall clock.
    pub(crate) headless: bool,
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn load_config() -> Result<HostConfig, ConfigError> {
    let Some(path) = env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) else {
        info!("host_config_defaults");
        return Ok(HostConfig::default());
    };
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = parse_config(&path, &text)?;
    info!(path = %path.display(), "host_config_loaded");
    Ok(config)
}

pub(crate) fn parse_config(path: &Path, text: &str) -> Result<HostConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        field: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

pub(crate) fn parse_args(args: &[String]) -> Result<HostOptions, String> {
    let mut ticks = None;
    let mut record = None;
    let mut replay = None;
    let mut authority = false;
    let mut headless = false;
    let mut port = None;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--ticks" => {
                let value = flag_value(args, index, "--ticks")?;
                ticks = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("invalid --ticks value '{value}' (expected u64)"))?,
                );
                index += 2;
            }
            "--record" => {
                record = Some(PathBuf::from(flag_value(args, index, "--record")?));
                index += 2;
            }
            "--replay" => {
                replay = Some(PathBuf::from(flag_value(args, index, "--replay")?));
                index += 2;
            }
            "--authority" => {
                authority = true;
                index += 1;
            }
            "--headless" => {
                headless = true;
                index += 1;
            }
            "--port" => {
                let value = flag_value(args, index, "--port")?;
                port = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| format!("invalid --port value '{value}' (expected u16)"))?,
                );
                index += 2;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    if record.is_some() && ticks.is_none() {
        return Err("--record requires --ticks".to_string());
    }
    if headless && (authority || ticks.is_none()) {
        return Err("--headless requires --ticks and cannot serve replicas".to_string());
    }

    let mode = match (replay, authority) {
        (Some(_), true) => return Err("--replay cannot be combined with --authority".to_string()),
        (Some(path), false) => {
            if record.is_some() {
                return Err("--record cannot be combined with --replay".to_string());
            }
            HostMode::Replay { path }
        }
        (None, true) => HostMode::Authority {
            port: port.unwrap_or_else(port_from_env),
        },
        (None, false) => HostMode::Local,
    };
    Ok(HostOptions {
        mode,
        ticks,
        record,
        headless,
    })
}

fn flag_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("missing value for {flag}"))
}

fn port_from_env() -> u16 {
    parse_port_or_default(env::var(AUTHORITY_PORT_ENV_VAR).ok().as_deref())
}

fn parse_port_or_default(raw: Option<&str>) -> u16 {
    match raw {
        Some(value) => value.parse::<u16>().unwrap_or_else(|_| {
            warn!(
                value,
                fallback_port = DEFAULT_AUTHORITY_PORT,
                "authority_invalid_port_using_default"
            );
            DEFAULT_AUTHORITY_PORT
        }),
        None => DEFAULT_AUTHORITY_PORT,
    }
}

pub(crate) fn usage_text() -> String {
    [
        "hexfront_server - headless skirmish host",
        "",
        "Usage:",
        "  hexfront_server [--ticks <u64> [--record <file>] [--headless]]",
        "  hexfront_server --authority [--port <u16>] [--ticks <u64>] [--record <file>]",
        "  hexfront_server --replay <file> [--ticks <u64>]",
        "",
        "Environment:",
        "  HEXFRONT_CONFIG          JSON config file (sim and scenario sections)",
        "  HEXFRONT_AUTHORITY_PORT  default port for --authority (47001)",
        "  RUST_LOG                 tracing filter (info)",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn default_mode_is_local_without_limits() {
        let options = parse_args(&[]).expect("parse");
        assert_eq!(options.mode, HostMode::Local);
        assert_eq!(options.ticks, None);
        assert_eq!(options.record, None);
        assert!(!options.headless);
    }

    #[test]
    fn authority_flags_and_limits_parse() {
        let options = parse_args(&args(&[
            "--authority",
            "--port",
            "47100",
            "--ticks",
            "30",
            "--record",
            "run.jsonl",
        ]))
        .expect("parse");
        assert_eq!(options.mode, HostMode::Authority { port: 47100 });
        assert_eq!(options.ticks, Some(30));
        assert_eq!(options.record, Some(PathBuf::from("run.jsonl")));
    }

    #[test]
    fn conflicting_or_malformed_flags_are_rejected() {
        assert!(parse_args(&args(&["--replay", "a.jsonl", "--authority"])).is_err());
        assert!(parse_args(&args(&["--replay", "a.jsonl", "--record", "b.jsonl"])).is_err());
        assert!(parse_args(&args(&["--ticks", "soon"])).is_err());
        assert!(parse_args(&args(&["--port"])).is_err());
        assert!(parse_args(&args(&["--fast"])).is_err());
        assert!(parse_args(&args(&["--record", "b.jsonl"])).is_err());
        assert!(parse_args(&args(&["--headless"])).is_err());
        assert!(parse_args(&args(&["--authority", "--headless", "--ticks", "5"])).is_err());
        assert!(parse_args(&args(&["--headless", "--ticks", "5"])).is_ok());
    }

    #[test]
    fn port_falls_back_to_default_when_invalid() {
        assert_eq!(parse_port_or_default(None), DEFAULT_AUTHORITY_PORT);
        assert_eq!(parse_port_or_default(Some("47002")), 47002);
        assert_eq!(parse_port_or_default(Some("port")), DEFAULT_AUTHORITY_PORT);
    }

    #[test]
    fn config_errors_name_the_offending_field() {
        let path = Path::new("host.json");
        let config = parse_config(path, r#"{"sim":{"starting_gold":250}}"#).expect("parse");
        assert_eq!(config.sim.starting_gold, 250);
        assert_eq!(config.sim.max_stack_height, SimConfig::default().max_stack_height);

        let err = parse_config(path, r#"{"sim":{"max_stack_height":"tall"}}"#)
            .expect_err("type error");
        match err {
            ConfigError::Parse { field, .. } => assert_eq!(field, "sim.max_stack_height"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
