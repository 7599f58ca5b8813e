use anyhow::Result;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn level_from_cli(cli: &crate::cli::args::Cli) -> tracing::Level {
    if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    }
}

/// Compact logs on stderr so they never interleave with report output.
/// `RUST_LOG` directives are honoured on top of `level`.
pub fn init(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive(format!("autoscope={}", level).parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::Cli;
    use clap::Parser;

    #[test]
    fn test_level_from_flags() {
        let quiet = Cli::parse_from(["autoscope", "-t", "example.com"]);
        assert_eq!(level_from_cli(&quiet), tracing::Level::WARN);

        let verbose = Cli::parse_from(["autoscope", "-t", "example.com", "-v"]);
        assert_eq!(level_from_cli(&verbose), tracing::Level::INFO);

        let debug = Cli::parse_from(["autoscope", "-t", "example.com", "-v", "-d"]);
        assert_eq!(level_from_cli(&debug), tracing::Level::DEBUG);
    }
}
