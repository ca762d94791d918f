//! Command-line interface.

use clap::{Parser, Subcommand};

use mochi_domain::config::Config;

/// mochi — a headless gateway between chat clients and a local
/// Ollama-compatible inference daemon.
#[derive(Debug, Parser)]
#[command(name = "mochi-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Bind host override.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bind port override.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Upstream daemon base URL override.
    #[arg(long, global = true)]
    pub upstream_url: Option<String>,

    /// Data root override.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Log level override (trace|debug|info|warn|error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Print version information.
    Version,
}

impl Cli {
    /// Resolve the effective configuration: defaults, then `MOCHI_*`
    /// environment variables, then CLI flags.
    pub fn resolve_config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref url) = self.upstream_url {
            config.upstream_url = url.clone();
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "mochi-server",
            "--port",
            "9999",
            "--data-dir",
            "/srv/mochi",
            "serve",
        ]);
        let config = cli.resolve_config();
        assert_eq!(config.port, 9999);
        assert_eq!(config.data_dir, "/srv/mochi");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::parse_from(["mochi-server"]);
        assert!(cli.command.is_none());
    }
}
