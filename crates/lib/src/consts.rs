pub const APP_NAME: &str = "envflake";

/// Length of the truncated hash used for store directory names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default flake file looked up in the working directory.
pub const DEFAULT_FLAKE_FILE: &str = "envflake.lua";

/// Upstream distribution server for Rust channel manifests.
pub const DEFAULT_DIST_SERVER: &str = "https://static.rust-lang.org";

/// Marker written last into a store directory once it is fully populated.
pub const COMPLETE_MARKER: &str = ".envflake-complete";

/// How many days a floating toolchain query walks back by default.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch)
pub const SOURCE_DATE_EPOCH: &str = "315532800";
