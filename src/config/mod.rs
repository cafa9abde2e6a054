#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_args::{CliConfig, Command};

#[cfg(feature = "cli")]
mod cli_args {
    use super::toml_config::{EtlConfig, Secret};
    use crate::domain::model::ResourceKind;
    use crate::utils::error::Result;
    use crate::utils::validation::Validate;
    use clap::{Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "bluebutton-etl", version)]
    #[command(about = "Flattens Blue Button FHIR claims and patients into analysis-ready tables")]
    pub struct CliConfig {
        /// TOML configuration file; built-in defaults when omitted
        #[arg(long, global = true)]
        pub config: Option<PathBuf>,

        /// Directory holding every intermediate and final file
        #[arg(long, global = true)]
        pub output_dir: Option<String>,

        /// Bearer token for the FHIR API
        #[arg(long, env = "BLUE_BUTTON_TOKEN", hide_env_values = true, global = true)]
        pub token: Option<Secret>,

        #[arg(short, long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, help = "Emit logs as JSON lines")]
        pub log_json: bool,

        #[arg(long, global = true, help = "Log CPU and memory usage around each stage")]
        pub monitor: bool,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Page through a resource type and store the raw resources
        Fetch {
            #[arg(value_enum)]
            resource: ResourceKind,
            #[arg(long)]
            page_size: Option<usize>,
            #[arg(long)]
            max_pages: Option<usize>,
        },
        /// Raw EOB resources to the Part D claims table
        FlattenClaims,
        /// Raw Patient resources to the patient table
        FlattenPatients,
        /// Claims table to one row per drug line
        ExtractItems,
        /// Drop all-null and constant claim columns
        FilterColumns,
        /// Splice item lines into the filtered claims
        Merge,
        /// Every occurrence of KEY in a JSON file, as a path,value CSV
        ExtractPath {
            input: String,
            key: String,
            #[arg(long)]
            output: Option<String>,
        },
        /// Whole chain, in dependency order
        Run {
            #[arg(long)]
            skip_fetch: bool,
        },
    }

    impl CliConfig {
        /// Config file (or defaults) with the command line applied on top.
        pub fn resolve(&self) -> Result<EtlConfig> {
            let mut config = match &self.config {
                Some(path) => EtlConfig::from_file(path)?,
                None => EtlConfig::default(),
            };

            if let Some(dir) = &self.output_dir {
                config.files.output_dir = dir.clone();
            }
            if let Some(token) = &self.token {
                config.source.token = Some(token.clone());
            }
            if let Command::Fetch {
                page_size,
                max_pages,
                ..
            } = &self.command
            {
                if let Some(page_size) = page_size {
                    config.source.page_size = *page_size;
                }
                if let Some(max_pages) = max_pages {
                    config.source.max_pages = *max_pages;
                }
            }
            if self.monitor {
                config.monitoring.enabled = true;
            }

            config.validate()?;
            Ok(config)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_run_with_globals() {
            let cli = CliConfig::try_parse_from([
                "bluebutton-etl",
                "run",
                "--skip-fetch",
                "--output-dir",
                "/tmp/bb",
                "--token",
                "abc",
            ])
            .unwrap();

            assert!(matches!(cli.command, Command::Run { skip_fetch: true }));
            assert!(!format!("{:?}", cli).contains("abc"));

            let config = cli.resolve().unwrap();
            assert_eq!(config.files.output_dir, "/tmp/bb");
            assert_eq!(config.token().unwrap().expose(), "abc");
        }

        #[test]
        fn test_fetch_overrides() {
            let cli = CliConfig::try_parse_from(["bluebutton-etl", "fetch", "eob", "--page-size", "10", "--max-pages", "2"])
                .unwrap();
            match &cli.command {
                Command::Fetch { resource, .. } => assert_eq!(*resource, ResourceKind::ExplanationOfBenefit),
                other => panic!("unexpected command: {:?}", other),
            }

            let config = cli.resolve().unwrap();
            assert_eq!(config.source.page_size, 10);
            assert_eq!(config.source.max_pages, 2);
        }

        #[test]
        fn test_invalid_override_fails_validation() {
            let cli = CliConfig::try_parse_from(["bluebutton-etl", "fetch", "patient", "--page-size", "0"]).unwrap();
            assert!(cli.resolve().is_err());
        }

        #[test]
        fn test_extract_path_args() {
            let cli = CliConfig::try_parse_from(["bluebutton-etl", "extract-path", "eob.json", "supportingInfo"]).unwrap();
            match cli.command {
                Command::ExtractPath { input, key, output } => {
                    assert_eq!(input, "eob.json");
                    assert_eq!(key, "supportingInfo");
                    assert!(output.is_none());
                }
                other => panic!("unexpected command: {:?}", other),
            }
        }
    }
}
