//! Log output shared by the `broker`, `server` and `client` commands.

use std::str::FromStr;

use tracing::Level;

/// Installs the fmt subscriber at `level` (`--log-level` on the command
/// line). The game REPLs print to stdout too, so targets are left out to
/// keep lines short. A second call is a no-op.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .try_init();
}

/// Maps a level name to a `Level`. Unknown names mean `info`.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => Level::from_str(other).unwrap_or(Level::INFO),
    }
}
