use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use access_control::AccessController;
use graceguard_core::ipc::{ErrorPayload, GraceGuardRequest, GraceGuardResponse, StatusPayload};

pub struct DaemonState {
    pub started_at: OffsetDateTime,
    pub controller: Arc<AccessController>,
}

/// Which local users may talk to the daemon.
#[derive(Debug, Clone)]
pub struct PeerPolicy {
    daemon_uid: u32,
    allowed_uids: Vec<u32>,
}

impl PeerPolicy {
    pub fn new(daemon_uid: u32, allowed_uids: Vec<u32>) -> Self {
        Self {
            daemon_uid,
            allowed_uids,
        }
    }

    pub fn permits(&self, uid: u32) -> bool {
        uid == self.daemon_uid || self.allowed_uids.contains(&uid)
    }

    /// Owner-only unless other users are explicitly allowed.
    fn socket_mode(&self) -> u32 {
        if self.allowed_uids.is_empty() {
            0o600
        } else {
            0o666
        }
    }
}

pub async fn serve(socket_path: &Path, state: Arc<DaemonState>, peers: PeerPolicy) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .with_context(|| format!("remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("bind socket {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(peers.socket_mode()))
        .with_context(|| format!("set socket permissions {}", socket_path.display()))?;
    info!(socket = %socket_path.display(), "accepting requests");

    loop {
        let (stream, _addr) = listener.accept().await.context("accept connection")?;
        let state = state.clone();
        let peers = peers.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &state, &peers).await {
                warn!(error = %err, "connection failed");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, state: &DaemonState, peers: &PeerPolicy) -> Result<()> {
    let uid = stream.peer_cred().context("read peer credentials")?.uid();
    let (read_half, mut writer) = stream.into_split();

    if !peers.permits(uid) {
        let response = GraceGuardResponse::Error(ErrorPayload {
            message: format!("unauthorized peer uid {uid}"),
        });
        write_response(&mut writer, &response).await?;
        return Err(anyhow::anyhow!("unauthorized peer uid {uid}"));
    }

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(());
    }

    let response = match serde_json::from_str::<GraceGuardRequest>(&line) {
        Ok(request) => {
            debug!(?request, uid, "request received");
            handle_request(request, state)
        }
        Err(err) => GraceGuardResponse::Error(ErrorPayload {
            message: format!("malformed request: {err}"),
        }),
    };
    write_response(&mut writer, &response).await
}

async fn write_response<W>(writer: &mut W, response: &GraceGuardResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_string(response).context("serialize response")?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Maps a request onto the controller. This is the only place the daemon
/// touches blocking state, and only through `request_grace_activation`.
pub fn handle_request(request: GraceGuardRequest, state: &DaemonState) -> GraceGuardResponse {
    match request {
        GraceGuardRequest::Ping => GraceGuardResponse::Pong,
        GraceGuardRequest::Status => GraceGuardResponse::Status(build_status(state)),
        GraceGuardRequest::Unblock => {
            let outcome = state
                .controller
                .request_grace_activation(OffsetDateTime::now_utc());
            GraceGuardResponse::Activation(outcome)
        }
    }
}

fn build_status(state: &DaemonState) -> StatusPayload {
    let uptime = OffsetDateTime::now_utc() - state.started_at;
    StatusPayload {
        started_at: state.started_at,
        uptime_seconds: uptime.whole_seconds().max(0) as u64,
        access: state.controller.status(),
    }
}
