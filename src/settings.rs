// Runtime settings: optional TOML file, then `EDU_DASHBOARD_*` environment
// variables, then command-line overrides.
use crate::cleaner::{CleanRules, DEFAULT_CATEGORICAL, DEFAULT_YEAR_COLUMN, DEFAULT_YEAR_FIELD};
use crate::loader::{DEFAULT_ENDPOINT, DEFAULT_LIMIT};
use crate::reports::{DEFAULT_BINS, DEFAULT_GROUP_BY, DEFAULT_TOP_N};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "edu_dashboard", about = "Interactive report over the MEN education indicators")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(short, long, default_value = "edu_dashboard.toml")]
    pub config: PathBuf,

    /// Dataset endpoint (JSON array of records).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Maximum number of records to request.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Directory for exported files.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: String,
    pub limit: usize,
    pub out_dir: PathBuf,
    pub year_field: String,
    pub year_column: String,
    pub division_column: String,
    pub municipality_column: String,
    pub latitude_column: String,
    pub longitude_column: String,
    pub top_n: usize,
    pub histogram_bins: usize,
    pub preview_rows: usize,
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            limit: DEFAULT_LIMIT,
            out_dir: PathBuf::from("."),
            year_field: DEFAULT_YEAR_FIELD.to_string(),
            year_column: DEFAULT_YEAR_COLUMN.to_string(),
            division_column: DEFAULT_GROUP_BY.to_string(),
            municipality_column: DEFAULT_CATEGORICAL[1].to_string(),
            latitude_column: "lat".to_string(),
            longitude_column: "lon".to_string(),
            top_n: DEFAULT_TOP_N,
            histogram_bins: DEFAULT_BINS,
            preview_rows: 5,
            timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::from(cli.config.clone()).required(false))
            .add_source(config::Environment::with_prefix("EDU_DASHBOARD"))
            .build()
            .context("failed to read settings")?;
        let mut settings: Settings = raw
            .try_deserialize()
            .context("failed to deserialise settings")?;
        settings.apply_cli(cli);
        Ok(settings)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(endpoint) = &cli.endpoint {
            self.endpoint = endpoint.clone();
        }
        if let Some(limit) = cli.limit {
            self.limit = limit;
        }
        if let Some(dir) = &cli.out_dir {
            self.out_dir = dir.clone();
        }
    }

    pub fn clean_rules(&self) -> CleanRules {
        CleanRules {
            year_field: self.year_field.clone(),
            year_column: self.year_column.clone(),
            categorical: vec![self.division_column.clone(), self.municipality_column.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("edu_dashboard").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let settings = Settings::load(&cli(&["--config", missing.to_str().unwrap()])).unwrap();
        assert_eq!(settings.limit, 50_000);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.top_n, 10);
        assert_eq!(settings.histogram_bins, 30);
        assert_eq!(
            settings.clean_rules().categorical,
            vec!["departamento".to_string(), "municipio".to_string()]
        );
    }

    #[test]
    fn file_then_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "limit = 100\ntop_n = 3\nlatitude_column = \"latitud\"").unwrap();

        let settings = Settings::load(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--limit",
            "7",
        ]))
        .unwrap();
        assert_eq!(settings.limit, 7);
        assert_eq!(settings.top_n, 3);
        assert_eq!(settings.latitude_column, "latitud");
        assert_eq!(settings.year_field, "a_o");
    }
}
