use std::path::PathBuf;

use anyhow::Result;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use graceguard_core::ipc::{
    resolve_socket_path, send_request, GraceGuardRequest, GraceGuardResponse, StatusPayload,
};
use graceguard_core::types::AccessStatus;

pub fn execute(socket_override: Option<PathBuf>) -> Result<()> {
    let socket = socket_override.unwrap_or_else(resolve_socket_path);
    let response = send_request(&socket, &GraceGuardRequest::Status)?;
    match response {
        GraceGuardResponse::Status(payload) => {
            println!("{}", render_status(&payload));
            Ok(())
        }
        GraceGuardResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
        other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
    }
}

pub fn render_status(payload: &StatusPayload) -> String {
    let mut lines = vec![format!("GraceGuard daemon up for {}s.", payload.uptime_seconds)];
    lines.extend(render_access(&payload.access));
    lines.join("\n")
}

fn render_access(access: &AccessStatus) -> Vec<String> {
    let mut lines = Vec::new();
    let state = if access.guarded_blocked { "blocked" } else { "unblocked" };
    lines.push(format!("Guarded sites are {state}."));

    let mut usage = format!("Unblocks used: {} / {}", access.used, access.max);
    if let Some(start) = access.window_start {
        usage.push_str(&format!(" (window started {})", format_time(start)));
    }
    lines.push(usage);
    if access.remaining() == 0 {
        lines.push("Unblock limit reached for this window.".to_string());
    }

    for ticket in &access.pending_reblocks {
        lines.push(format!(
            "Re-block at {}: {}",
            format_time(ticket.fire_at),
            ticket.selectors.join(", ")
        ));
    }
    lines
}

pub fn format_time(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use graceguard_core::ids::ReblockId;
    use graceguard_core::types::ReblockTicket;
    use time::macros::datetime;

    #[test]
    fn test_render_fresh_status() {
        let access = AccessStatus {
            used: 0,
            max: 2,
            window_start: None,
            guarded_blocked: true,
            pending_reblocks: Vec::new(),
        };
        assert_eq!(
            render_access(&access),
            vec!["Guarded sites are blocked.", "Unblocks used: 0 / 2"]
        );
    }

    #[test]
    fn test_render_exhausted_window_with_pending_reblock() {
        let access = AccessStatus {
            used: 2,
            max: 2,
            window_start: Some(datetime!(2024-05-01 09:00 UTC)),
            guarded_blocked: false,
            pending_reblocks: vec![ReblockTicket {
                id: ReblockId::new(),
                selectors: vec!["youtube.com".to_string(), "www.youtube.com".to_string()],
                fire_at: datetime!(2024-05-01 09:31 UTC),
            }],
        };
        let lines = render_access(&access);
        assert_eq!(lines[0], "Guarded sites are unblocked.");
        assert_eq!(lines[1], "Unblocks used: 2 / 2 (window started 2024-05-01T09:00:00Z)");
        assert_eq!(lines[2], "Unblock limit reached for this window.");
        assert_eq!(lines[3], "Re-block at 2024-05-01T09:31:00Z: youtube.com, www.youtube.com");
    }
}
