//! Crate-wide constants.

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "kiln.toml";

/// Environment variable selecting the build mode (`production` or anything else).
pub const MODE_ENV: &str = "KILN_ENV";

/// Environment variable read by the CLI for the tracing filter.
pub const LOG_ENV: &str = "KILN_LOG";

/// Capacity of each router lane's input channel.
pub const LANE_CAPACITY: usize = 32;

/// Quiet window used to coalesce bursts of filesystem events.
pub const WATCH_DEBOUNCE_MS: u64 = 100;

/// Server-sent events endpoint the dev server uses for live reload.
pub const RELOAD_ENDPOINT: &str = "/__kiln/reload";

/// Cache file written next to the config file unless overridden.
pub const CACHE_FILENAME: &str = ".kiln-cache.json";

pub const DEFAULT_DEV_PORT: u16 = 3000;
