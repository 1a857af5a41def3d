use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{AccessStatus, ActivationOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub started_at: OffsetDateTime,
    pub uptime_seconds: u64,
    pub access: AccessStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GraceGuardRequest {
    Ping,
    Status,
    Unblock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GraceGuardResponse {
    Pong,
    Status(StatusPayload),
    Activation(ActivationOutcome),
    Error(ErrorPayload),
}

pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("graceguard").join("graceguard.sock");
    }
    PathBuf::from("/tmp").join("graceguard.sock")
}

pub fn default_pid_path() -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("graceguard").join("graceguard.pid");
    }
    PathBuf::from("/tmp").join("graceguard.pid")
}

pub fn resolve_socket_path() -> PathBuf {
    if let Ok(value) = std::env::var("GRACEGUARD_SOCKET") {
        return PathBuf::from(value);
    }
    default_socket_path()
}

pub fn resolve_pid_path() -> PathBuf {
    if let Ok(value) = std::env::var("GRACEGUARD_PID") {
        return PathBuf::from(value);
    }
    default_pid_path()
}

/// Largest response line the client accepts.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// Sends one request and waits for its single-line reply.
pub fn send_request(socket_path: &Path, request: &GraceGuardRequest) -> Result<GraceGuardResponse> {
    let stream = UnixStream::connect(socket_path).with_context(|| {
        format!(
            "graceguard daemon is not reachable at {} (is it running? try `graceguard daemon start`)",
            socket_path.display()
        )
    })?;
    let mut writer = BufWriter::new(stream.try_clone()?);
    let payload = serde_json::to_string(request).context("serialize request")?;
    writer.write_all(payload.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    let mut reader = BufReader::new(stream.take(MAX_RESPONSE_BYTES));
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).context("read daemon response")?;
    if bytes == 0 {
        anyhow::bail!("daemon closed the connection without replying");
    }
    if !line.ends_with('\n') {
        anyhow::bail!("daemon response exceeds {MAX_RESPONSE_BYTES} bytes or is truncated");
    }
    let response = serde_json::from_str(&line).context("parse response")?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use tempfile::TempDir;

    #[test]
    fn test_request_wire_format() {
        let encoded = serde_json::to_string(&GraceGuardRequest::Unblock).unwrap();
        assert_eq!(encoded, r#"{"type":"Unblock"}"#);

        let decoded: GraceGuardRequest = serde_json::from_str(r#"{"type":"Status"}"#).unwrap();
        assert!(matches!(decoded, GraceGuardRequest::Status));
    }

    #[test]
    fn test_activation_response_carries_payload() {
        let response = GraceGuardResponse::Activation(ActivationOutcome::limit_reached(
            "limit reached",
        ));
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(encoded.starts_with(r#"{"type":"Activation","payload":"#));

        match serde_json::from_str(&encoded).unwrap() {
            GraceGuardResponse::Activation(outcome) => {
                assert!(!outcome.granted);
                assert_eq!(outcome.message, "limit reached");
                assert!(outcome.reblock_at.is_none());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    fn reply_once(listener: UnixListener, reply: Vec<u8>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut request = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut request)
                .unwrap();
            let mut stream = stream;
            let _ = stream.write_all(&reply);
        })
    }

    #[test]
    fn test_missing_daemon_has_clear_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = send_request(&temp_dir.path().join("absent.sock"), &GraceGuardRequest::Ping)
            .unwrap_err();
        assert!(err.to_string().contains("graceguard daemon start"));
    }

    #[test]
    fn test_round_trip_over_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket = temp_dir.path().join("gg.sock");
        let server = reply_once(UnixListener::bind(&socket).unwrap(), b"{\"type\":\"Pong\"}\n".to_vec());

        let response = send_request(&socket, &GraceGuardRequest::Ping).unwrap();
        assert!(matches!(response, GraceGuardResponse::Pong));
        server.join().unwrap();
    }

    #[test]
    fn test_silent_daemon_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let socket = temp_dir.path().join("gg.sock");
        let server = reply_once(UnixListener::bind(&socket).unwrap(), Vec::new());

        let err = send_request(&socket, &GraceGuardRequest::Status).unwrap_err();
        assert!(err.to_string().contains("without replying"));
        server.join().unwrap();
    }

    #[test]
    fn test_oversized_response_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let socket = temp_dir.path().join("gg.sock");
        let reply = vec![b'x'; MAX_RESPONSE_BYTES as usize + 16];
        let server = reply_once(UnixListener::bind(&socket).unwrap(), reply);

        let err = send_request(&socket, &GraceGuardRequest::Status).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        server.join().unwrap();
    }
}
