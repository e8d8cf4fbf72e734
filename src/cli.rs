use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Debug, Parser)]
#[command(name = "spx")]
#[command(author, about = "Forward HTTP/HTTPS proxy with parent proxy rotation")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Proxy server port (overrides common.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show version number and quit
    #[arg(short = 'v', long)]
    pub version: bool,
}

impl Cli {
    /// Text printed for `--version`
    pub fn version_line() -> String {
        format!("spx {}", env!("CARGO_PKG_VERSION"))
    }

    /// Config file to read, and whether it was asked for explicitly
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_port_flag() {
        let cli = Cli::try_parse_from(["spx", "-p", "3128"]).unwrap();
        assert_eq!(cli.port, Some(3128));

        let cli = Cli::try_parse_from(["spx", "--port", "9000"]).unwrap();
        assert_eq!(cli.port, Some(9000));

        let cli = Cli::try_parse_from(["spx"]).unwrap();
        assert_eq!(cli.port, None);
        assert_eq!(cli.config_path(), (PathBuf::from("config.toml"), false));
    }

    #[test]
    fn test_cli_version_flag() {
        let cli = Cli::try_parse_from(["spx", "-v"]).unwrap();
        assert!(cli.version);

        let cli = Cli::try_parse_from(["spx", "--version", "-c", "/etc/spx.toml"]).unwrap();
        assert!(cli.version);
        assert_eq!(cli.config_path(), (PathBuf::from("/etc/spx.toml"), true));
        assert!(Cli::version_line().starts_with("spx "));
    }
}
