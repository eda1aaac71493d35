//! Build script for pulse-link
//!
//! Embeds build-time information into the binary:
//! - Git commit hash and dirty flag
//! - Build timestamp
//! - Target triple and build profile
//! - Rust version

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = is_git_dirty();
    let rustc_version = command_output("rustc", &["--version"]);

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("PULSE_GIT_HASH", git_hash.as_str()),
        ("PULSE_GIT_DIRTY", git_dirty),
        ("PULSE_BUILD_TIMESTAMP", build_timestamp.as_str()),
        ("PULSE_TARGET", target.as_str()),
        ("PULSE_PROFILE", profile.as_str()),
        ("PULSE_RUSTC_VERSION", rustc_version.as_str()),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Trimmed stdout of a successful command, or "unknown"
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check if the git working directory is dirty
fn is_git_dirty() -> &'static str {
    Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .map(|output| {
            if output.status.success() && !output.stdout.is_empty() {
                "true"
            } else {
                "false"
            }
        })
        .unwrap_or("unknown")
}
