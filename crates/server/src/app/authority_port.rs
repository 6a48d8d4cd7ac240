use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use hexfront_engine::command::wire::{
    decode_line, encode_line, AuthorityMessage, ReplicaId, ReplicaMessage, PROTOCOL_VERSION,
};
use hexfront_engine::command::{LinkError, ReplicaHub};
use tracing::{info, warn};

pub(crate) const AUTHORITY_PORT_ENV_VAR: &str = "HEXFRONT_AUTHORITY_PORT";
pub(crate) const DEFAULT_AUTHORITY_PORT: u16 = 47001;
const MAX_PENDING_BYTES_PER_REPLICA: usize = 256 * 1024;
const MAX_INBOUND_BYTES_PER_REPLICA: usize = 256 * 1024;

/// Localhost listener that speaks the JSON line protocol to every replica.
#[derive(Debug)]
pub(crate) struct TcpReplicaHub {
    listener: TcpListener,
    bound_port: u16,
    replicas: Vec<ReplicaConn>,
    next_replica: u32,
}

#[derive(Debug)]
struct PendingChunk {
    bytes: Vec<u8>,
    written: usize,
}

#[derive(Debug)]
struct ReplicaConn {
    replica: ReplicaId,
    stream: TcpStream,
    read_buf: Vec<u8>,
    welcomed: bool,
    active_chunk: Option<PendingChunk>,
    queued_chunks: VecDeque<Vec<u8>>,
    queued_bytes: usize,
}

impl TcpReplicaHub {
    pub(crate) fn bind_localhost(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(localhost_bind_addr(port))?;
        listener.set_nonblocking(true)?;
        let bound_port = listener.local_addr()?.port();
        info!(port = bound_port, "authority_port_listening");
        Ok(Self {
            listener,
            bound_port,
            replicas: Vec::new(),
            next_replica: 1,
        })
    }

    pub(crate) fn bound_port(&self) -> u16 {
        self.bound_port
    }

    pub(crate) fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    fn accept_pending_replicas(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!(error = %err, "authority_replica_nonblocking_failed");
                        continue;
                    }
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(error = %err, "authority_replica_nodelay_failed");
                    }
                    let replica = ReplicaId(self.next_replica);
                    self.next_replica += 1;
                    let mut conn = ReplicaConn {
                        replica,
                        stream,
                        read_buf: Vec::new(),
                        welcomed: false,
                        active_chunk: None,
                        queued_chunks: VecDeque::new(),
                        queued_bytes: 0,
                    };
                    let mut ready = ready_line_text(self.bound_port);
                    ready.push('\n');
                    conn.enqueue(ready.into_bytes());
                    info!(%replica, %addr, "authority_replica_connected");
                    self.replicas.push(conn);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(error = %err, "authority_accept_failed");
                    break;
                }
            }
        }
    }

    fn flush_all(&mut self) {
        self.replicas.retain_mut(|conn| {
            let ReplicaConn {
                stream,
                active_chunk,
                queued_chunks,
                queued_bytes,
                replica,
                ..
            } = conn;
            match flush_pending_chunks(active_chunk, queued_chunks, queued_bytes, |payload| {
                stream.write(payload)
            }) {
                Ok(()) => true,
                Err(err) => {
                    warn!(replica = %replica, error = %err, "authority_replica_write_failed");
                    false
                }
            }
        });
    }
}

impl ReplicaConn {
    /// Queues one encoded line. Returns false when the replica is too far behind.
    fn enqueue(&mut self, bytes: Vec<u8>) -> bool {
        if self.queued_bytes.saturating_add(bytes.len()) > MAX_PENDING_BYTES_PER_REPLICA {
            return false;
        }
        self.queued_bytes += bytes.len();
        self.queued_chunks.push_back(bytes);
        true
    }

    /// Reads everything available. Returns false once the peer has gone away.
    fn read_available(&mut self, out: &mut Vec<String>) -> bool {
        let mut chunk = [0u8; 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return false,
                Ok(bytes_read) => {
                    if !buffer_inbound(&mut self.read_buf, &chunk[..bytes_read], out) {
                        warn!(
                            replica = %self.replica,
                            buffered_bytes = self.read_buf.len(),
                            "authority_replica_inbound_overflow"
                        );
                        return false;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return true,
                Err(err) => {
                    warn!(replica = %self.replica, error = %err, "authority_replica_read_failed");
                    return false;
                }
            }
        }
    }
}

impl ReplicaHub for TcpReplicaHub {
    fn admit(&mut self, tick: u64) -> Result<Vec<ReplicaId>, LinkError> {
        self.accept_pending_replicas();
        let mut admitted = Vec::new();
        for conn in self.replicas.iter_mut().filter(|conn| !conn.welcomed) {
            let line = encode_line(&AuthorityMessage::Welcome {
                protocol: PROTOCOL_VERSION,
                replica: conn.replica,
                tick,
            })?;
            conn.welcomed = conn.enqueue(line.into_bytes());
            if conn.welcomed {
                admitted.push(conn.replica);
            }
        }
        self.flush_all();
        Ok(admitted)
    }

    fn poll_submissions(&mut self) -> Result<Vec<(ReplicaId, ReplicaMessage)>, LinkError> {
        let mut submissions = Vec::new();
        self.replicas.retain_mut(|conn| {
            let mut lines = Vec::new();
            let connected = conn.read_available(&mut lines);
            if conn.welcomed {
                for line in lines.iter().filter(|line| !line.trim().is_empty()) {
                    match decode_line::<ReplicaMessage>(line) {
                        Ok(message) => submissions.push((conn.replica, message)),
                        Err(err) => {
                            warn!(replica = %conn.replica, error = %err, "authority_invalid_line_dropped")
                        }
                    }
                }
            } else if !lines.is_empty() {
                warn!(replica = %conn.replica, count = lines.len(), "authority_lines_before_welcome_dropped");
            }
            if !connected {
                info!(replica = %conn.replica, "authority_replica_disconnected");
            }
            connected
        });
        self.flush_all();
        Ok(submissions)
    }

    fn broadcast(&mut self, message: &AuthorityMessage) -> Result<(), LinkError> {
        let line = encode_line(message)?;
        self.replicas.retain_mut(|conn| {
            if !conn.welcomed {
                return true;
            }
            let queued = conn.enqueue(line.clone().into_bytes());
            if !queued {
                warn!(
                    replica = %conn.replica,
                    queued_bytes = conn.queued_bytes,
                    "authority_replica_backlog_exceeded"
                );
            }
            queued
        });
        self.flush_all();
        Ok(())
    }
}

fn localhost_bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub(crate) fn ready_line_text(port: u16) -> String {
    format!("hexfront.authority v{PROTOCOL_VERSION} port:{port}")
}

/// Returns false once an unterminated line outgrows the inbound cap.
fn buffer_inbound(buffer: &mut Vec<u8>, bytes: &[u8], out: &mut Vec<String>) -> bool {
    buffer.extend_from_slice(bytes);
    drain_complete_lines(buffer, out);
    buffer.len() <= MAX_INBOUND_BYTES_PER_REPLICA
}

fn drain_complete_lines(buffer: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line_bytes = buffer.drain(..=newline_index).collect::<Vec<u8>>();
        line_bytes.pop(); // newline
        if line_bytes.last().copied() == Some(b'\r') {
            line_bytes.pop();
        }

        match String::from_utf8(line_bytes) {
            Ok(line) => out.push(line),
            Err(err) => warn!(error = %err, "authority_invalid_utf8_line_dropped"),
        }
    }
}

fn flush_pending_chunks<F>(
    active_chunk: &mut Option<PendingChunk>,
    queued_chunks: &mut VecDeque<Vec<u8>>,
    queued_bytes: &mut usize,
    mut write_payload: F,
) -> io::Result<()>
where
    F: FnMut(&[u8]) -> io::Result<usize>,
{
    loop {
        if active_chunk.is_none() {
            let Some(bytes) = queued_chunks.pop_front() else {
                return Ok(());
            };
            *queued_bytes = queued_bytes.saturating_sub(bytes.len());
            *active_chunk = Some(PendingChunk { bytes, written: 0 });
        }
        let Some(state) = active_chunk.as_mut() else {
            return Ok(());
        };

        match write_payload(&state.bytes[state.written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "authority_write_zero",
                ));
            }
            Ok(bytes_written) => {
                state.written = state.written.saturating_add(bytes_written);
                if state.written >= state.bytes.len() {
                    *active_chunk = None;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::thread;
    use std::time::Duration;

    use hexfront_engine::ability::AbilityId;
    use hexfront_engine::command::Intent;

    use super::*;

    fn connect(hub: &TcpReplicaHub) -> TcpStream {
        let stream =
            TcpStream::connect(localhost_bind_addr(hub.bound_port())).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set_read_timeout");
        stream
    }

    fn admit_one(hub: &mut TcpReplicaHub, tick: u64) -> Vec<ReplicaId> {
        for _ in 0..40 {
            let admitted = hub.admit(tick).expect("admit");
            if !admitted.is_empty() {
                return admitted;
            }
            thread::sleep(Duration::from_millis(5));
        }
        Vec::new()
    }

    #[test]
    fn bind_address_is_localhost_only() {
        let addr = localhost_bind_addr(DEFAULT_AUTHORITY_PORT);
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), DEFAULT_AUTHORITY_PORT);
    }

    #[test]
    fn ready_line_then_welcome_are_sent_on_admit() {
        let mut hub = TcpReplicaHub::bind_localhost(0).expect("bind");
        let client = connect(&hub);
        assert_eq!(admit_one(&mut hub, 12), vec![ReplicaId(1)]);

        let mut reader = BufReader::new(client);
        let mut ready = String::new();
        reader.read_line(&mut ready).expect("ready line");
        assert_eq!(ready.trim_end(), ready_line_text(hub.bound_port()));

        let mut welcome = String::new();
        reader.read_line(&mut welcome).expect("welcome line");
        let message: AuthorityMessage = decode_line(&welcome).expect("decode");
        assert_eq!(
            message,
            AuthorityMessage::Welcome {
                protocol: PROTOCOL_VERSION,
                replica: ReplicaId(1),
                tick: 12,
            }
        );
    }

    #[test]
    fn submissions_arrive_as_newline_delimited_lines() {
        let mut hub = TcpReplicaHub::bind_localhost(0).expect("bind");
        let mut client = connect(&hub);
        admit_one(&mut hub, 0);

        let submit = ReplicaMessage::Submit {
            sequence: 3,
            intent: Intent::CancelAbility {
                ability: AbilityId(9),
            },
        };
        let line = encode_line(&submit).expect("encode");
        client.write_all(b"not json\r\n").expect("write garbage");
        client.write_all(line.as_bytes()).expect("write");
        client.flush().expect("flush");

        let mut received = Vec::new();
        for _ in 0..40 {
            received.extend(hub.poll_submissions().expect("poll"));
            if !received.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received, vec![(ReplicaId(1), submit)]);
        assert_eq!(hub.replica_count(), 1);
    }

    #[test]
    fn disconnected_replicas_are_forgotten() {
        let mut hub = TcpReplicaHub::bind_localhost(0).expect("bind");
        let client = connect(&hub);
        admit_one(&mut hub, 0);
        drop(client);

        for _ in 0..40 {
            hub.poll_submissions().expect("poll");
            if hub.replica_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hub.replica_count(), 0);
    }

    #[test]
    fn partial_lines_wait_for_their_newline() {
        let mut buffer = b"{\"a\":1}\n{\"b\"".to_vec();
        let mut out = Vec::new();
        drain_complete_lines(&mut buffer, &mut out);
        assert_eq!(out, vec!["{\"a\":1}".to_string()]);
        assert_eq!(buffer, b"{\"b\"".to_vec());
    }

    #[test]
    fn inbound_cap_applies_to_the_unterminated_tail() {
        let mut buffer = Vec::new();
        let mut out = Vec::new();
        let filler = vec![b'z'; MAX_INBOUND_BYTES_PER_REPLICA];
        assert!(buffer_inbound(&mut buffer, &filler, &mut out));
        assert!(buffer_inbound(&mut buffer, b"\n", &mut out));
        assert_eq!(out.len(), 1);
        assert!(buffer.is_empty());

        assert!(buffer_inbound(&mut buffer, &filler, &mut out));
        assert!(!buffer_inbound(&mut buffer, b"z", &mut out));
    }

    #[test]
    fn replica_that_never_ends_a_line_is_disconnected() {
        let mut hub = TcpReplicaHub::bind_localhost(0).expect("bind");
        let mut client = connect(&hub);
        admit_one(&mut hub, 0);

        let writer = thread::spawn(move || {
            let flood = vec![b'z'; MAX_INBOUND_BYTES_PER_REPLICA + 1024];
            // The hub hangs up mid-write; the error is expected.
            let _ = client.write_all(&flood);
            let _ = client.flush();
        });
        for _ in 0..400 {
            hub.poll_submissions().expect("poll");
            if hub.replica_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hub.replica_count(), 0);
        writer.join().expect("writer thread");
    }

    #[test]
    fn wouldblock_retains_active_chunk_and_queue_order() {
        let mut active = None;
        let mut queued = VecDeque::from(vec![b"first\n".to_vec(), b"second\n".to_vec()]);
        let mut queued_bytes = 13usize;
        let mut written = Vec::new();
        let mut calls = 0usize;

        flush_pending_chunks(&mut active, &mut queued, &mut queued_bytes, |payload| {
            calls += 1;
            if calls == 1 {
                written.extend_from_slice(&payload[..2]);
                Ok(2)
            } else {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "full"))
            }
        })
        .expect("flush");

        let state = active.as_ref().expect("active chunk kept");
        assert_eq!(state.written, 2);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued_bytes, 7);

        flush_pending_chunks(&mut active, &mut queued, &mut queued_bytes, |payload| {
            written.extend_from_slice(payload);
            Ok(payload.len())
        })
        .expect("flush");
        assert!(active.is_none());
        assert!(queued.is_empty());
        assert_eq!(written, b"first\nsecond\n".to_vec());
    }

    #[test]
    fn flush_handles_many_small_partial_writes() {
        let payload = vec![b'x'; 4096];
        let mut active = None;
        let mut queued = VecDeque::from(vec![payload.clone()]);
        let mut queued_bytes = payload.len();
        let mut written = Vec::new();
        for _ in 0..1024 {
            flush_pending_chunks(&mut active, &mut queued, &mut queued_bytes, |bytes| {
                let take = bytes.len().min(7);
                written.extend_from_slice(&bytes[..take]);
                Ok(take)
            })
            .expect("flush");
            if active.is_none() && queued.is_empty() {
                break;
            }
        }
        assert_eq!(written, payload);
        assert_eq!(queued_bytes, 0);
    }

    #[test]
    fn write_zero_is_an_error() {
        let mut active = None;
        let mut queued = VecDeque::from(vec![b"line\n".to_vec()]);
        let mut queued_bytes = 5usize;
        let err = flush_pending_chunks(&mut active, &mut queued, &mut queued_bytes, |_| Ok(0))
            .expect_err("write zero");
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn backlog_cap_refuses_lines_past_the_limit() {
        let mut hub = TcpReplicaHub::bind_localhost(0).expect("bind");
        let client = connect(&hub);
        for _ in 0..40 {
            hub.accept_pending_replicas();
            if hub.replica_count() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let conn = &mut hub.replicas[0];
        let big = vec![b'y'; MAX_PENDING_BYTES_PER_REPLICA];
        assert!(!conn.enqueue(big), "ready line already counts toward the cap");
        assert!(conn.enqueue(b"small\n".to_vec()));
        drop(client);
    }
}
