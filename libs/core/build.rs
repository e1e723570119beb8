//! Build script stamping build metadata.
//!
//! Sets environment variables read by `graphload_core::build_info`:
//! - `GRAPHLOAD_GIT_HASH` - Short git commit hash (suffixed `-dirty` for a dirty tree)
//! - `GRAPHLOAD_BUILD_TIMESTAMP` - Build timestamp (RFC 3339)
//! - `GRAPHLOAD_PROFILE` - Cargo profile the crate was built with

use std::env;
use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let git_dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| !o.stdout.is_empty())
        .unwrap_or(false);

    let git_hash_full = if git_dirty && git_hash != "unknown" {
        format!("{}-dirty", git_hash)
    } else {
        git_hash
    };

    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GRAPHLOAD_GIT_HASH={}", git_hash_full);
    println!("cargo:rustc-env=GRAPHLOAD_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=GRAPHLOAD_PROFILE={}", profile);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
