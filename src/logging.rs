use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Maps the number of `-v` flags to a log level.
pub fn verbosity_to_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Installs the global subscriber. `RUST_LOG` directives refine the level
/// chosen on the command line.
pub fn init_tracing(verbosity: u8) {
    let level = LevelFilter::from_level(verbosity_to_level(verbosity));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(verbosity_to_level(0), Level::ERROR);
        assert_eq!(verbosity_to_level(1), Level::WARN);
        assert_eq!(verbosity_to_level(2), Level::INFO);
        assert_eq!(verbosity_to_level(3), Level::DEBUG);
        assert_eq!(verbosity_to_level(9), Level::DEBUG);
    }
}
