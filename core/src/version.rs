//! Version information for Ringchat
//!
//! This module provides version constants and wire compatibility checking.

/// Ringchat version (semver format)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Major version (breaking changes)
pub const VERSION_MAJOR: u32 = 0;

/// Protocol version (incremented on wire format changes)
pub const PROTOCOL_VERSION: u32 = 1;

/// Git commit hash (if available)
pub const GIT_HASH: Option<&str> = option_env!("GIT_HASH");

/// Build profile (debug/release)
pub const BUILD_PROFILE: &str = if cfg!(debug_assertions) {
    "debug"
} else {
    "release"
};

/// Full version string with metadata
pub fn version_string() -> String {
    let mut version = format!("Ringchat v{}", VERSION);

    if let Some(hash) = GIT_HASH {
        version.push_str(&format!(" ({})", &hash[..hash.len().min(8)]));
    }

    if BUILD_PROFILE == "debug" {
        version.push_str(" [debug]");
    }

    version
}

/// Check if a peer's protocol version is compatible
pub fn is_protocol_compatible(peer_protocol_version: u32) -> bool {
    // For 0.x versions, require exact match
    if VERSION_MAJOR == 0 {
        peer_protocol_version == PROTOCOL_VERSION
    } else {
        peer_protocol_version / 100 == PROTOCOL_VERSION / 100
    }
}
