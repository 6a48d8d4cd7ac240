use std::env;
use std::io;
use std::process::ExitCode;
use std::str::FromStr;

use hexfront_relay::{run, CommandKind, CommonOptions};

const USAGE: &str = "\
hexfront_relay - line client for a hexfront authority

Usage:
  hexfront_relay wait-ready
  hexfront_relay send <intent-json...>
  hexfront_relay script <file> [--barrier]
  hexfront_relay watch [ticks]

Connection flags (accepted anywhere on the line):
  --port <u16>          authority port (default 47001)
  --timeout-ms <u64>    how long to wait for the authority (default 5000)
  --retry-ms <u64>      first connect retry delay (default 100)
  --include-ticks       also print TickCompleted lines";

#[derive(Debug, PartialEq)]
enum Invocation {
    Help,
    Run {
        command: CommandKind,
        options: CommonOptions,
    },
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let outcome = parse_invocation(&args).and_then(|invocation| match invocation {
        Invocation::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Invocation::Run { command, options } => run(command, options, &mut io::stdout()),
    });
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

/// Splits connection flags from the subcommand and its own arguments, then
/// hands the latter to the parser for that subcommand.
fn parse_invocation(args: &[String]) -> Result<Invocation, String> {
    if args.is_empty() {
        return Err(USAGE.to_string());
    }
    let mut options = CommonOptions::default();
    let mut positional = Vec::new();
    let mut flags = Vec::new();
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "--port" => options.port = flag_value("--port", rest.next())?,
            "--timeout-ms" => options.timeout_ms = flag_value("--timeout-ms", rest.next())?,
            "--retry-ms" => options.retry_ms = flag_value("--retry-ms", rest.next())?,
            "--include-ticks" => options.include_ticks = true,
            other if other.starts_with("--") => flags.push(other),
            other => positional.push(other),
        }
    }

    let Some((subcommand, operands)) = positional.split_first() else {
        return Err("missing subcommand".to_string());
    };
    let command = match *subcommand {
        "wait-ready" => wait_ready(operands, &flags)?,
        "send" => send(operands, &flags)?,
        "script" => script(operands, &flags)?,
        "watch" => watch(operands, &flags)?,
        other => return Err(format!("unknown subcommand '{other}'")),
    };
    Ok(Invocation::Run { command, options })
}

fn flag_value<T: FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("missing value for {flag}"))?;
    value.parse::<T>().map_err(|_| {
        format!(
            "invalid {flag} value '{value}' (expected {})",
            std::any::type_name::<T>()
        )
    })
}

fn reject_flags(subcommand: &str, flags: &[&str]) -> Result<(), String> {
    match flags.first() {
        Some(flag) => Err(format!("{subcommand} does not take {flag}")),
        None => Ok(()),
    }
}

fn wait_ready(operands: &[&str], flags: &[&str]) -> Result<CommandKind, String> {
    reject_flags("wait-ready", flags)?;
    if !operands.is_empty() {
        return Err("wait-ready takes no arguments".to_string());
    }
    Ok(CommandKind::WaitReady)
}

/// The intent may arrive split across several shell words.
fn send(operands: &[&str], flags: &[&str]) -> Result<CommandKind, String> {
    reject_flags("send", flags)?;
    if operands.is_empty() {
        return Err("send requires an intent JSON payload".to_string());
    }
    Ok(CommandKind::Send {
        intent: operands.join(" "),
    })
}

fn script(operands: &[&str], flags: &[&str]) -> Result<CommandKind, String> {
    let mut barrier = false;
    for flag in flags {
        match *flag {
            "--barrier" => barrier = true,
            other => return Err(format!("unknown script flag '{other}' (expected --barrier)")),
        }
    }
    match operands {
        [path] => Ok(CommandKind::Script {
            path: (*path).to_string(),
            barrier,
        }),
        [] => Err("script requires a file path".to_string()),
        _ => Err("script takes exactly one file path".to_string()),
    }
}

fn watch(operands: &[&str], flags: &[&str]) -> Result<CommandKind, String> {
    reject_flags("watch", flags)?;
    let ticks = match operands {
        [] => 1,
        [count] => count
            .parse::<u64>()
            .map_err(|_| format!("invalid watch tick count '{count}' (expected u64)"))?,
        _ => return Err("watch takes at most one tick count".to_string()),
    };
    Ok(CommandKind::Watch { ticks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Invocation, String> {
        let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        parse_invocation(&args)
    }

    #[test]
    fn connection_flags_may_follow_the_subcommand() {
        let Ok(Invocation::Run { command, options }) =
            parse("watch 3 --port 47100 --include-ticks")
        else {
            panic!("expected a run");
        };
        assert_eq!(command, CommandKind::Watch { ticks: 3 });
        assert_eq!(options.port, 47100);
        assert!(options.include_ticks);
        assert_eq!(options.timeout_ms, CommonOptions::default().timeout_ms);
    }

    #[test]
    fn send_joins_the_split_payload() {
        let Ok(Invocation::Run { command, .. }) =
            parse(r#"--timeout-ms 50 send {"CancelAbility": {"ability": 4}}"#)
        else {
            panic!("expected a run");
        };
        assert_eq!(
            command,
            CommandKind::Send {
                intent: r#"{"CancelAbility": {"ability": 4}}"#.to_string()
            }
        );
    }

    #[test]
    fn barrier_belongs_to_script_only() {
        assert!(matches!(
            parse("script orders.txt --barrier"),
            Ok(Invocation::Run {
                command: CommandKind::Script { barrier: true, .. },
                ..
            })
        ));
        assert_eq!(
            parse("watch --barrier"),
            Err("watch does not take --barrier".to_string())
        );
    }

    #[test]
    fn bad_values_and_missing_subcommands_are_reported() {
        assert_eq!(
            parse("--port 99999 wait-ready"),
            Err("invalid --port value '99999' (expected u16)".to_string())
        );
        assert_eq!(parse("--include-ticks"), Err("missing subcommand".to_string()));
        assert_eq!(
            parse("watch soon").map(|_| ()),
            Err("invalid watch tick count 'soon' (expected u64)".to_string())
        );
        assert_eq!(parse("wait-ready --help"), Ok(Invocation::Help));
    }
}
