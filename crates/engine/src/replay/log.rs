use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::atomic_io::write_text_atomic;
use crate::command::Intent;
use crate::sim::SimError;

pub const LOG_FORMAT: &str = "hexfront.commands";
pub const LOG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    pub format: String,
    pub version: u32,
    /// Last tick the recording simulation completed.
    pub final_tick: u64,
}

/// One intent as the authority applied it, stamped with the tick it was
/// applied after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedCommand {
    pub tick: u64,
    pub intent: Intent,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read command log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write command log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode command log entry: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("command log line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("command log is empty; expected a header line")]
    MissingHeader,
    #[error("unsupported command log format {format:?} version {version}")]
    UnsupportedFormat { format: String, version: u32 },
    #[error("command log line {line}: tick {tick} is earlier than the previous entry's tick {previous}")]
    OutOfOrder { line: usize, tick: u64, previous: u64 },
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// The intents a run applied, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLog {
    final_tick: u64,
    commands: Vec<LoggedCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: u64, intent: Intent) {
        self.final_tick = self.final_tick.max(tick);
        self.commands.push(LoggedCommand { tick, intent });
    }

    pub fn mark_tick(&mut self, tick: u64) {
        self.final_tick = self.final_tick.max(tick);
    }

    pub fn commands(&self) -> &[LoggedCommand] {
        &self.commands
    }

    pub fn final_tick(&self) -> u64 {
        self.final_tick
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn to_lines(&self) -> Result<String, ReplayError> {
        let header = LogHeader {
            format: LOG_FORMAT.to_string(),
            version: LOG_VERSION,
            final_tick: self.final_tick,
        };
        let mut text = serde_json::to_string(&header).map_err(ReplayError::Encode)?;
        text.push('\n');
        for command in &self.commands {
            text.push_str(&serde_json::to_string(command).map_err(ReplayError::Encode)?);
            text.push('\n');
        }
        Ok(text)
    }

    pub fn from_lines(text: &str) -> Result<Self, ReplayError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (header_line, header_text) = lines.next().ok_or(ReplayError::MissingHeader)?;
        let header: LogHeader =
            serde_json::from_str(header_text).map_err(|source| ReplayError::Parse {
                line: header_line,
                source,
            })?;
        if header.format != LOG_FORMAT || header.version != LOG_VERSION {
            return Err(ReplayError::UnsupportedFormat {
                format: header.format,
                version: header.version,
            });
        }

        let mut log = Self {
            final_tick: header.final_tick,
            commands: Vec::new(),
        };
        let mut previous = 0u64;
        for (line, entry) in lines {
            let command: LoggedCommand = serde_json::from_str(entry)
                .map_err(|source| ReplayError::Parse { line, source })?;
            if command.tick < previous {
                return Err(ReplayError::OutOfOrder {
                    line,
                    tick: command.tick,
                    previous,
                });
            }
            previous = command.tick;
            log.final_tick = log.final_tick.max(command.tick);
            log.commands.push(command);
        }
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        let text = self.to_lines()?;
        write_text_atomic(path, &text).map_err(|source| ReplayError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            commands = self.commands.len(),
            final_tick = self.final_tick,
            "command_log_saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let text = fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_lines(&text)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::ability::AbilityId;
    use crate::world::EntityId;

    fn sample() -> CommandLog {
        let mut log = CommandLog::new();
        log.record(
            0,
            Intent::UnregisterEntity {
                entity: EntityId(1),
                show_death_animation: false,
            },
        );
        log.record(
            3,
            Intent::CancelAbility {
                ability: AbilityId(4),
            },
        );
        log.mark_tick(9);
        log
    }

    #[test]
    fn saved_logs_load_back_identically() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("run.jsonl");
        let log = sample();
        log.save(&path).expect("save");

        let loaded = CommandLog::load(&path).expect("load");
        assert_eq!(loaded, log);
        assert_eq!(loaded.final_tick(), 9);
    }

    #[test]
    fn parse_errors_report_the_line_number() {
        let mut text = sample().to_lines().expect("encode");
        text.push_str("{\"tick\":5,\"intent\":\"Bogus\"}\n");
        match CommandLog::from_lines(&text) {
            Err(ReplayError::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_foreign_headers_and_unordered_entries() {
        let foreign = "{\"format\":\"other\",\"version\":1,\"final_tick\":0}\n";
        assert!(matches!(
            CommandLog::from_lines(foreign),
            Err(ReplayError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            CommandLog::from_lines(""),
            Err(ReplayError::MissingHeader)
        ));

        let unordered = format!(
            "{{\"format\":\"{LOG_FORMAT}\",\"version\":{LOG_VERSION},\"final_tick\":0}}\n\
             {{\"tick\":4,\"intent\":{{\"CancelAbility\":{{\"ability\":1}}}}}}\n\
             {{\"tick\":2,\"intent\":{{\"CancelAbility\":{{\"ability\":2}}}}}}\n"
        );
        assert!(matches!(
            CommandLog::from_lines(&unordered),
            Err(ReplayError::OutOfOrder {
                line: 3,
                tick: 2,
                previous: 4
            })
        ));
    }
}
