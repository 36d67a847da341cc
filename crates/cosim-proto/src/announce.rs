//! Port discovery.
//!
//! The bridge binds an ephemeral port before any peer exists, then prints a
//! single line naming it. Whoever launches the peer scans the bridge's
//! standard output for that line.

use crate::error::ProtoError;

/// Tag that starts the announcement line.
pub const PORT_ANNOUNCE_TAG: &str = "COSIM SOCKET";

/// Format the announcement line for `port` (no trailing newline).
pub fn announce_line(port: u16) -> String {
    format!("{PORT_ANNOUNCE_TAG}:{port}")
}

/// Extract the port from an announcement line.
///
/// Returns `Ok(None)` for lines that are not announcements at all, so callers
/// can feed every line of output through this.
///
/// # Errors
///
/// Returns [`ProtoError::MalformedAnnouncement`] if the line carries the tag
/// but no valid port.
pub fn parse_announce(line: &str) -> Result<Option<u16>, ProtoError> {
    let Some(rest) = line.trim().strip_prefix(PORT_ANNOUNCE_TAG) else {
        return Ok(None);
    };
    rest.strip_prefix(':')
        .and_then(|port| port.parse().ok())
        .map(Some)
        .ok_or_else(|| ProtoError::MalformedAnnouncement(line.to_owned()))
}
