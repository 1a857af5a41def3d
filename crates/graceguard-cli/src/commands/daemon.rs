use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

use graceguard_core::ipc::{
    resolve_pid_path, resolve_socket_path, send_request, GraceGuardRequest, GraceGuardResponse,
};

#[derive(Debug)]
pub enum DaemonAction {
    Start {
        socket: Option<PathBuf>,
        pid: Option<PathBuf>,
    },
    Stop {
        pid: Option<PathBuf>,
    },
    Ping {
        socket: Option<PathBuf>,
    },
    SocketPath,
    PidPath,
}

pub fn execute(action: DaemonAction, config: Option<PathBuf>) -> Result<()> {
    match action {
        DaemonAction::Start { socket, pid } => start_daemon(socket, pid, config),
        DaemonAction::Stop { pid } => stop_daemon(pid),
        DaemonAction::Ping { socket } => ping(socket),
        DaemonAction::SocketPath => {
            println!("{}", resolve_socket_path().display());
            Ok(())
        }
        DaemonAction::PidPath => {
            println!("{}", resolve_pid_path().display());
            Ok(())
        }
    }
}

fn start_daemon(
    socket: Option<PathBuf>,
    pid: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let mut cmd = Command::new("graceguard-daemon");
    if let Some(socket) = socket {
        cmd.env("GRACEGUARD_SOCKET", socket);
    }
    if let Some(pid) = pid {
        cmd.env("GRACEGUARD_PID", pid);
    }
    if let Some(config) = config {
        cmd.env("GRACEGUARD_CONFIG", config);
    }
    cmd.spawn().context("start graceguard-daemon")?;
    println!("GraceGuard daemon started.");
    Ok(())
}

/// SIGTERM makes the daemon restore the original hosts file before exiting.
fn stop_daemon(pid_override: Option<PathBuf>) -> Result<()> {
    let pid_path = pid_override.unwrap_or_else(resolve_pid_path);
    let pid_text = std::fs::read_to_string(&pid_path)
        .with_context(|| format!("read pid file {}", pid_path.display()))?;
    let pid: i32 = pid_text.trim().parse().context("parse pid")?;
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(anyhow::anyhow!("failed to stop daemon with pid {pid}"));
    }
    println!("GraceGuard daemon stopping, hosts file will be restored.");
    Ok(())
}

fn ping(socket_override: Option<PathBuf>) -> Result<()> {
    let socket = socket_override.unwrap_or_else(resolve_socket_path);
    let response = send_request(&socket, &GraceGuardRequest::Ping)?;
    match response {
        GraceGuardResponse::Pong => {
            println!("GraceGuard daemon is healthy.");
            Ok(())
        }
        GraceGuardResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}
