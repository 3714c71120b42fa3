use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 8050;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

/// Browser dashboard for plant trend data from Excel, CSV and Parquet files.
#[derive(Debug, Clone, Parser)]
#[command(name = "trend-viewer", version, about)]
pub struct Cli {
    /// Workbook, CSV or Parquet file to load at startup
    pub file: Option<PathBuf>,

    /// Sheet to select after loading FILE (defaults to the first sheet)
    #[arg(long, requires = "file")]
    pub sheet: Option<String>,

    /// Address to listen on
    #[arg(long, env = "TREND_VIEWER_BIND", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "TREND_VIEWER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "TREND_VIEWER_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    pub max_upload_mb: usize,

    /// JSON file that keeps saved setups across restarts
    #[arg(long, env = "TREND_VIEWER_SETUPS")]
    pub setups_file: Option<PathBuf>,
}

impl Cli {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["trend-viewer"]).unwrap();
        assert!(cli.file.is_none());
        assert_eq!(cli.addr().to_string(), "127.0.0.1:8050");
        assert_eq!(cli.max_upload_bytes(), 200 * 1024 * 1024);
    }

    #[test]
    fn file_and_overrides() {
        let cli = Cli::try_parse_from([
            "trend-viewer",
            "day.xlsx",
            "--sheet",
            "Data",
            "--bind",
            "0.0.0.0",
            "-p",
            "9000",
            "--setups-file",
            "setups.json",
        ])
        .unwrap();
        assert_eq!(cli.file.as_deref(), Some(std::path::Path::new("day.xlsx")));
        assert_eq!(cli.sheet.as_deref(), Some("Data"));
        assert_eq!(cli.addr().to_string(), "0.0.0.0:9000");
        assert!(cli.setups_file.is_some());
    }

    #[test]
    fn sheet_needs_a_file() {
        assert!(Cli::try_parse_from(["trend-viewer", "--sheet", "Data"]).is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Cli::try_parse_from(["trend-viewer", "--port", "99999"]).is_err());
    }
}
