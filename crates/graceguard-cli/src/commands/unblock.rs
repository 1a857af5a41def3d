use std::path::PathBuf;

use anyhow::Result;

use graceguard_core::ipc::{resolve_socket_path, send_request, GraceGuardRequest, GraceGuardResponse};

use crate::commands::status::format_time;

pub fn execute(socket_override: Option<PathBuf>) -> Result<()> {
    let socket = socket_override.unwrap_or_else(resolve_socket_path);
    let response = send_request(&socket, &GraceGuardRequest::Unblock)?;
    match response {
        GraceGuardResponse::Activation(outcome) => {
            println!("{}", outcome.message);
            if let Some(reblock_at) = outcome.reblock_at {
                println!("Re-block scheduled for {}.", format_time(reblock_at));
            }
            Ok(())
        }
        GraceGuardResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}
