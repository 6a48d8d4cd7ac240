use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use hexfront_engine::command::wire::{
    decode_line, encode_line, AuthorityMessage, ReplicaId, ReplicaMessage, PROTOCOL_VERSION,
};
use hexfront_engine::command::Intent;

pub const DEFAULT_PORT: u16 = 47001;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_MS: u64 = 100;
pub const DEFAULT_QUIET_MS: u64 = 250;
const MAX_RETRY_BACKOFF_MS: u64 = 1_000;
const READY_PREFIX: &str = "hexfront.authority v";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Ready,
    Authority(AuthorityMessage),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub kind: LineKind,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonOptions {
    pub port: u16,
    pub timeout_ms: u64,
    pub retry_ms: u64,
    pub include_ticks: bool,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_ms: DEFAULT_RETRY_MS,
            include_ticks: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    WaitReady,
    /// Submits one intent and waits for the authority to echo it.
    Send { intent: String },
    /// Submits one intent per line. With `barrier`, waits for every echo.
    Script { path: String, barrier: bool },
    /// Prints echoes until `ticks` more ticks have completed.
    Watch { ticks: u64 },
}

struct Session {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    replica: ReplicaId,
    next_sequence: u64,
}

pub fn parse_wire_line(raw: &str) -> ParsedLine {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    let kind = if is_ready_payload(trimmed) {
        LineKind::Ready
    } else {
        match decode_line::<AuthorityMessage>(trimmed) {
            Ok(message) => LineKind::Authority(message),
            Err(_) => LineKind::Unknown,
        }
    };
    ParsedLine {
        kind,
        payload: trimmed.to_string(),
    }
}

pub fn should_print_line(line: &ParsedLine, include_ticks: bool) -> bool {
    match &line.kind {
        LineKind::Ready => true,
        LineKind::Authority(AuthorityMessage::TickCompleted { .. }) => include_ticks,
        LineKind::Authority(_) => true,
        LineKind::Unknown => false,
    }
}

pub fn is_ready_payload(payload: &str) -> bool {
    payload
        .strip_prefix(READY_PREFIX)
        .is_some_and(|rest| rest.contains(" port:"))
}

/// The sequence number this line acknowledges for `replica`, if any.
pub fn acknowledged_sequence(line: &ParsedLine, replica: ReplicaId) -> Option<u64> {
    match &line.kind {
        LineKind::Authority(AuthorityMessage::Applied {
            origin: Some(origin),
            ..
        }) if origin.replica == replica => Some(origin.sequence),
        _ => None,
    }
}

/// One intent per non-blank line; `#` starts a comment line.
pub fn parse_script_intents(content: &str) -> Result<Vec<Intent>, String> {
    let mut intents = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let intent = parse_intent(trimmed)
            .map_err(|error| format!("script line {}: {error}", index + 1))?;
        intents.push(intent);
    }
    Ok(intents)
}

pub fn parse_intent(text: &str) -> Result<Intent, String> {
    serde_json::from_str(text).map_err(|error| format!("invalid intent JSON: {error}"))
}

pub fn retry_backoff(attempt: u32, retry_base: Duration) -> Duration {
    let shift = attempt.min(8);
    let backoff_ms = (retry_base.as_millis() as u64)
        .saturating_mul(1u64 << shift)
        .min(MAX_RETRY_BACKOFF_MS);
    Duration::from_millis(backoff_ms.max(1))
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let timeout = Duration::from_millis(opts.timeout_ms);
    let retry_base = Duration::from_millis(opts.retry_ms.max(1));
    let quiet = Duration::from_millis(DEFAULT_QUIET_MS);
    let mut session = connect_and_wait_ready(opts.port, timeout, retry_base, |line| {
        emit_line(stdout, line, opts.include_ticks)
    })?;

    match kind {
        CommandKind::WaitReady => Ok(()),
        CommandKind::Send { intent } => {
            let sequence = submit(&mut session, parse_intent(&intent)?)?;
            wait_for_acks(&mut session, BTreeSet::from([sequence]), timeout, |line| {
                emit_line(stdout, line, opts.include_ticks)
            })
        }
        CommandKind::Script { path, barrier } => {
            let content = fs::read_to_string(&path)
                .map_err(|error| format!("failed to read script file '{path}': {error}"))?;
            let replica = session.replica;
            let mut pending = BTreeSet::new();
            for intent in parse_script_intents(&content)? {
                pending.insert(submit(&mut session, intent)?);
                read_until_quiet(&mut session.reader, timeout, quiet, |line| {
                    if let Some(sequence) = acknowledged_sequence(line, replica) {
                        pending.remove(&sequence);
                    }
                    emit_line(stdout, line, opts.include_ticks)
                })?;
            }
            if barrier {
                wait_for_acks(&mut session, pending, timeout, |line| {
                    emit_line(stdout, line, opts.include_ticks)
                })?;
            }
            Ok(())
        }
        CommandKind::Watch { ticks } => watch_ticks(&mut session, ticks, timeout, |line| {
            emit_line(stdout, line, opts.include_ticks)
        }),
    }
}

fn submit(session: &mut Session, intent: Intent) -> Result<u64, String> {
    let sequence = session.next_sequence;
    session.next_sequence += 1;
    let line = encode_line(&ReplicaMessage::Submit { sequence, intent })
        .map_err(|error| format!("failed to encode submission: {error}"))?;
    send_line(&mut session.writer, &line)?;
    Ok(sequence)
}

fn connect_and_wait_ready<F>(
    port: u16,
    timeout: Duration,
    retry_base: Duration,
    mut on_line: F,
) -> Result<Session, String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    while Instant::now() < deadline {
        if let Ok(writer) = TcpStream::connect(("127.0.0.1", port)) {
            writer
                .set_read_timeout(Some(Duration::from_millis(100)))
                .map_err(|error| format!("failed to set socket read timeout: {error}"))?;
            let reader_stream = writer
                .try_clone()
                .map_err(|error| format!("failed to clone socket stream: {error}"))?;
            let mut reader = BufReader::new(reader_stream);

            match wait_for_welcome(&mut reader, deadline, &mut on_line) {
                WaitReadyOutcome::Welcomed(replica) => {
                    return Ok(Session {
                        writer,
                        reader,
                        replica,
                        next_sequence: 1,
                    })
                }
                WaitReadyOutcome::Timeout => break,
                WaitReadyOutcome::Disconnected => {}
                WaitReadyOutcome::ProtocolMismatch(found) => {
                    return Err(format!(
                        "authority speaks protocol {found}, this client speaks {PROTOCOL_VERSION}"
                    ));
                }
                WaitReadyOutcome::IoError(error) => {
                    return Err(format!(
                        "socket read error while waiting for welcome: {error}"
                    ));
                }
            }
        }

        let sleep_for = retry_backoff(attempt, retry_base);
        if Instant::now() + sleep_for >= deadline {
            break;
        }
        thread::sleep(sleep_for);
        attempt = attempt.saturating_add(1);
    }

    Err(format!(
        "timed out waiting for authority welcome on 127.0.0.1:{port}"
    ))
}

enum WaitReadyOutcome {
    Welcomed(ReplicaId),
    Timeout,
    Disconnected,
    ProtocolMismatch(u32),
    IoError(io::Error),
}

fn wait_for_welcome<F>(
    reader: &mut BufReader<TcpStream>,
    deadline: Instant,
    on_line: &mut F,
) -> WaitReadyOutcome
where
    F: FnMut(&ParsedLine),
{
    loop {
        match read_one_line(reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if let LineKind::Authority(AuthorityMessage::Welcome {
                    protocol, replica, ..
                }) = parsed.kind
                {
                    if protocol != PROTOCOL_VERSION {
                        return WaitReadyOutcome::ProtocolMismatch(protocol);
                    }
                    return WaitReadyOutcome::Welcomed(replica);
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => return WaitReadyOutcome::Disconnected,
            ReadOutcome::DeadlineExceeded => return WaitReadyOutcome::Timeout,
            ReadOutcome::IoError(error) => return WaitReadyOutcome::IoError(error),
        }
    }
}

fn wait_for_acks<F>(
    session: &mut Session,
    mut pending: BTreeSet<u64>,
    timeout: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    while !pending.is_empty() {
        match read_one_line(&mut session.reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if let Some(sequence) = acknowledged_sequence(&parsed, session.replica) {
                    pending.remove(&sequence);
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => {
                return Err("socket disconnected while waiting for echoes".to_string())
            }
            ReadOutcome::DeadlineExceeded => {
                return Err(format!(
                    "timed out waiting for {} echo(es) from the authority",
                    pending.len()
                ))
            }
            ReadOutcome::IoError(error) => {
                return Err(format!("socket read error while waiting for echoes: {error}"))
            }
        }
    }
    Ok(())
}

fn watch_ticks<F>(
    session: &mut Session,
    ticks: u64,
    timeout: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    let mut seen = 0u64;
    let mut deadline = Instant::now() + timeout;
    while seen < ticks {
        match read_one_line(&mut session.reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if matches!(
                    parsed.kind,
                    LineKind::Authority(AuthorityMessage::TickCompleted { .. })
                ) {
                    seen += 1;
                    deadline = Instant::now() + timeout;
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => return Ok(()),
            ReadOutcome::DeadlineExceeded => {
                return Err(format!("timed out after {seen} of {ticks} tick(s)"))
            }
            ReadOutcome::IoError(error) => {
                return Err(format!("socket read error while watching: {error}"))
            }
        }
    }
    Ok(())
}

fn read_until_quiet<F>(
    reader: &mut BufReader<TcpStream>,
    timeout: Duration,
    quiet_window: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    let mut last_line_at = Instant::now();
    let mut saw_any_line = false;

    loop {
        match read_one_line(reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                saw_any_line = true;
                last_line_at = Instant::now();
            }
            ReadOutcome::NoData => {
                let now = Instant::now();
                if (saw_any_line && now.saturating_duration_since(last_line_at) >= quiet_window)
                    || (!saw_any_line && now + quiet_window >= deadline)
                {
                    return Ok(());
                }
            }
            ReadOutcome::Disconnected => {
                return Err("socket disconnected while waiting for echoes".to_string())
            }
            ReadOutcome::DeadlineExceeded => return Ok(()),
            ReadOutcome::IoError(error) => {
                return Err(format!("socket read error while waiting for echoes: {error}"))
            }
        }
    }
}

fn emit_line<W: Write>(stdout: &mut W, line: &ParsedLine, include_ticks: bool) {
    if should_print_line(line, include_ticks) {
        let _ = writeln!(stdout, "{}", line.payload);
    }
}

fn send_line(writer: &mut TcpStream, line: &str) -> Result<(), String> {
    writer
        .write_all(line.as_bytes())
        .map_err(|error| format!("failed to send submission: {error}"))?;
    writer
        .flush()
        .map_err(|error| format!("failed to flush submission: {error}"))
}

enum ReadOutcome {
    Line(String),
    NoData,
    Disconnected,
    DeadlineExceeded,
    IoError(io::Error),
}

fn read_one_line(reader: &mut BufReader<TcpStream>, deadline: Instant) -> ReadOutcome {
    if Instant::now() >= deadline {
        return ReadOutcome::DeadlineExceeded;
    }

    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => ReadOutcome::Disconnected,
        Ok(_) => ReadOutcome::Line(line),
        Err(error)
            if error.kind() == io::ErrorKind::WouldBlock
                || error.kind() == io::ErrorKind::TimedOut =>
        {
            ReadOutcome::NoData
        }
        Err(error) => ReadOutcome::IoError(error),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use hexfront_engine::ability::AbilityId;
    use hexfront_engine::command::wire::Origin;
    use hexfront_engine::command::IntentOutcome;

    use super::*;

    fn applied(replica: u32, sequence: u64) -> String {
        encode_line(&AuthorityMessage::Applied {
            origin: Some(Origin {
                replica: ReplicaId(replica),
                sequence,
            }),
            tick: 3,
            intent: Intent::CancelAbility {
                ability: AbilityId(4),
            },
            outcome: IntentOutcome::UnknownAbility {
                ability: AbilityId(4),
            },
        })
        .expect("encode")
    }

    #[test]
    fn parse_wire_line_classifies_ready_messages_and_noise() {
        let ready = parse_wire_line("hexfront.authority v1 port:47001\r\n");
        assert_eq!(ready.kind, LineKind::Ready);
        assert_eq!(ready.payload, "hexfront.authority v1 port:47001");

        let tick = parse_wire_line("{\"TickCompleted\":{\"tick\":7}}\n");
        assert_eq!(
            tick.kind,
            LineKind::Authority(AuthorityMessage::TickCompleted { tick: 7 })
        );

        assert_eq!(parse_wire_line("garbage").kind, LineKind::Unknown);
    }

    #[test]
    fn output_filter_hides_ticks_and_noise_by_default() {
        let tick = parse_wire_line("{\"TickCompleted\":{\"tick\":1}}");
        let echo = parse_wire_line(&applied(1, 1));
        let noise = parse_wire_line("raw");

        assert!(should_print_line(&echo, false));
        assert!(!should_print_line(&tick, false));
        assert!(should_print_line(&tick, true));
        assert!(!should_print_line(&noise, true));
    }

    #[test]
    fn acknowledgements_only_match_our_replica() {
        let ours = parse_wire_line(&applied(2, 5));
        let theirs = parse_wire_line(&applied(3, 5));
        assert_eq!(acknowledged_sequence(&ours, ReplicaId(2)), Some(5));
        assert_eq!(acknowledged_sequence(&theirs, ReplicaId(2)), None);
    }

    #[test]
    fn script_intents_skip_comments_and_report_bad_lines() {
        let content = r#"
            # cancel a couple of abilities
            {"CancelAbility":{"ability":1}}

            {"CancelAbility":{"ability":2}}
        "#;
        assert_eq!(
            parse_script_intents(content).expect("parse"),
            vec![
                Intent::CancelAbility {
                    ability: AbilityId(1)
                },
                Intent::CancelAbility {
                    ability: AbilityId(2)
                },
            ]
        );

        let err = parse_script_intents("# ok\n{\"Nope\":{}}\n").expect_err("bad line");
        assert!(err.starts_with("script line 2:"), "{err}");
    }

    #[test]
    fn retry_backoff_doubles_up_to_the_cap() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_backoff(0, base), Duration::from_millis(100));
        assert_eq!(retry_backoff(2, base), Duration::from_millis(400));
        assert_eq!(retry_backoff(20, base), Duration::from_millis(1_000));
    }

    #[test]
    fn send_waits_for_its_own_echo() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let authority = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .write_all(format!("hexfront.authority v1 port:{port}\n").as_bytes())
                .expect("ready");
            let welcome = encode_line(&AuthorityMessage::Welcome {
                protocol: PROTOCOL_VERSION,
                replica: ReplicaId(4),
                tick: 0,
            })
            .expect("encode");
            stream.write_all(welcome.as_bytes()).expect("welcome");

            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("submission");
            let ReplicaMessage::Submit { sequence, .. } = decode_line(&line).expect("decode");
            stream
                .write_all(b"{\"TickCompleted\":{\"tick\":1}}\n")
                .expect("tick");
            stream
                .write_all(applied(4, sequence).as_bytes())
                .expect("echo");
            sequence
        });

        let options = CommonOptions {
            port,
            timeout_ms: 2_000,
            ..CommonOptions::default()
        };
        let mut out = Vec::new();
        run(
            CommandKind::Send {
                intent: "{\"CancelAbility\":{\"ability\":4}}".to_string(),
            },
            options,
            &mut out,
        )
        .expect("send");

        assert_eq!(authority.join().expect("authority thread"), 1);
        let printed = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3, "{printed}");
        assert!(lines[0].starts_with("hexfront.authority v1"));
        assert!(lines[1].contains("Welcome"));
        assert!(lines[2].contains("Applied"));
    }
}
