use std::path::PathBuf;

use clap::Parser;

use license_autoid::config::Config;
use license_autoid::strategy::StrategyKind;

#[derive(Parser, Debug)]
#[command(
    name = "license-autoid",
    about = "Identify pending code matches on a code-inspection server",
    version
)]
pub struct Cli {
    /// Config file [default: ./.license-autoid/config.toml, fallback ~/.config/license-autoid/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server base URL
    #[arg(long)]
    pub server: Option<String>,

    /// Server user name
    #[arg(long = "user")]
    pub username: Option<String>,

    /// Server password
    #[arg(long, env = "LICENSE_AUTOID_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Project to identify
    #[arg(long)]
    pub project: Option<String>,

    /// Identification strategy
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<StrategyKind>,

    /// Do not refresh the bill of materials at the end
    #[arg(long)]
    pub no_refresh: bool,

    /// Give up if a multi-pass strategy has not settled after this many passes
    #[arg(long, value_name = "N")]
    pub max_passes: Option<u32>,

    /// Files per discovery query
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Only walk the code tree below this path
    #[arg(long = "path", value_name = "PATH")]
    pub start_path: Option<String>,

    /// Minimum match score for the code-match strategy
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub min_score: Option<u8>,

    /// Run against a JSON fixture instead of a server
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Show every identification made and log progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

impl Cli {
    /// Command-line flags take precedence over the config file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(url) = &self.server {
            config.server.url = Some(url.clone());
        }
        if let Some(user) = &self.username {
            config.server.username = Some(user.clone());
        }
        if let Some(password) = &self.password {
            config.server.password = Some(password.clone());
        }
        if let Some(project) = &self.project {
            config.run.project = Some(project.clone());
        }
        if let Some(strategy) = self.strategy {
            config.run.strategy = strategy;
        }
        if self.no_refresh {
            config.run.refresh = false;
        }
        if let Some(n) = self.max_passes {
            config.run.max_passes = n;
        }
        if let Some(n) = self.batch_size {
            config.run.batch_size = n;
        }
        if let Some(path) = &self.start_path {
            config.run.start_path = path.clone();
        }
        if let Some(score) = self.min_score {
            config.run.min_score = score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "license-autoid",
            "--project",
            "firmware",
            "--strategy",
            "code-match",
            "--no-refresh",
            "--max-passes",
            "3",
            "--path",
            "/src",
        ]);
        let mut config = Config::default();
        config.run.project = Some("from-file".into());
        cli.apply_to(&mut config);

        assert_eq!(config.run.project.as_deref(), Some("firmware"));
        assert_eq!(config.run.strategy, StrategyKind::CodeMatch);
        assert!(!config.run.refresh);
        assert_eq!(config.run.max_passes, 3);
        assert_eq!(config.run.start_path, "/src");
        assert_eq!(config.run.batch_size, 100);
    }

    #[test]
    fn test_min_score_range_enforced() {
        assert!(Cli::try_parse_from(["license-autoid", "--min-score", "101"]).is_err());
    }
}
