//! `pulse-link version` report
//!
//! Combines the build stamp baked in by `build.rs` with a summary of the
//! session protocol this binary speaks, so a bug report names both.

use std::fmt;

use crate::protocol::{
    topics, MessageKind, ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT, NORMAL_CLOSURE, NO_STATUS_RECEIVED,
};

/// Stamp recorded when the binary was compiled
#[derive(Debug, Clone, Copy)]
pub struct BuildStamp {
    pub name: &'static str,
    pub version: &'static str,
    /// Short commit hash, "unknown" outside a git checkout
    pub commit: &'static str,
    dirty: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc: &'static str,
}

impl BuildStamp {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("PULSE_GIT_HASH"),
            dirty: env!("PULSE_GIT_DIRTY"),
            built_at: env!("PULSE_BUILD_TIMESTAMP"),
            target: env!("PULSE_TARGET"),
            profile: env!("PULSE_PROFILE"),
            rustc: env!("PULSE_RUSTC_VERSION"),
        }
    }

    pub fn dirty(&self) -> bool {
        self.dirty == "true"
    }

    /// Version tag used in logs, e.g. "0.1.0+abc1234" or "0.1.0+abc1234.dirty"
    pub fn tag(&self) -> String {
        let mut tag = format!("{}+{}", self.version, self.commit);
        if self.dirty() {
            tag.push_str(".dirty");
        }
        tag
    }
}

/// Wire vocabulary compiled into the session layer
#[derive(Debug, Clone, Copy)]
pub struct ProtocolSummary {
    pub kinds: &'static [MessageKind],
    pub close_codes: [(u16, &'static str); 4],
    pub topics: [&'static str; 4],
}

impl ProtocolSummary {
    pub fn current() -> Self {
        Self {
            kinds: &MessageKind::ALL,
            close_codes: [
                (NORMAL_CLOSURE, "final"),
                (NO_STATUS_RECEIVED, "reconnect"),
                (ABNORMAL_CLOSURE, "reconnect"),
                (HEARTBEAT_TIMEOUT, "heartbeat timeout, reconnect"),
            ],
            topics: [topics::EXECUTOR_STATUS, topics::TASK_STATUS, topics::ALERT, topics::STATS],
        }
    }
}

/// Everything `pulse-link version` prints
#[derive(Debug, Clone, Copy)]
pub struct VersionReport {
    pub build: BuildStamp,
    pub protocol: ProtocolSummary,
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let build = &self.build;
        writeln!(f, "{} {}", build.name, build.tag())?;
        writeln!(f, "  built {} ({}, {})", build.built_at, build.profile, build.target)?;
        writeln!(f, "  {}", build.rustc)?;
        writeln!(f)?;

        let protocol = &self.protocol;
        writeln!(f, "Protocol")?;
        writeln!(f, "  {} message kinds", protocol.kinds.len())?;
        for (code, meaning) in protocol.close_codes {
            writeln!(f, "  close {}: {}", code, meaning)?;
        }
        writeln!(f, "  topics: {}, job.log.<instance>", protocol.topics.join(", "))
    }
}

/// Report for the running binary
pub fn report() -> VersionReport {
    VersionReport {
        build: BuildStamp::current(),
        protocol: ProtocolSummary::current(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_names_this_crate() {
        let build = BuildStamp::current();
        assert_eq!(build.name, "pulse-link");
        assert!(build.tag().starts_with(build.version));
        assert!(build.tag().contains(build.commit));
    }

    #[test]
    fn test_report_lists_close_codes() {
        let text = report().to_string();
        assert!(text.contains("Protocol"));
        assert!(text.contains("close 1000: final"));
        assert!(text.contains("close 4000: heartbeat timeout"));
        assert!(text.contains(&format!("{} message kinds", MessageKind::ALL.len())));
        assert!(text.contains("task.status"));
    }
}
