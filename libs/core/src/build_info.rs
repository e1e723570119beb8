//! Build metadata stamped by `build.rs`.

/// Short git hash of the source tree, `-dirty` suffixed when uncommitted
/// changes were present, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("GRAPHLOAD_GIT_HASH");

/// RFC 3339 build timestamp.
pub const BUILD_TIMESTAMP: &str = env!("GRAPHLOAD_BUILD_TIMESTAMP");

/// Cargo profile (`debug` or `release`).
pub const PROFILE: &str = env!("GRAPHLOAD_PROFILE");

/// One-line description used for `--version` long output.
pub fn long_version() -> String {
    format!(
        "{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        GIT_HASH,
        BUILD_TIMESTAMP,
        PROFILE
    )
}
