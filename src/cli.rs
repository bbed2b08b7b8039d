use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{HarnessError, Result};
use crate::options::TerraformOptions;

/// tfharness - run terraform templates through init/apply/destroy
#[derive(Parser, Debug)]
#[command(name = "tfharness")]
#[command(about = "Apply and tear down terraform templates the way the test suite does")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Template directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Options file in JSON
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colorized terraform output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Input variable, repeatable (KEY=VALUE)
    #[arg(long = "var", value_name = "KEY=VALUE", global = true)]
    pub vars: Vec<String>,

    /// terraform executable
    #[arg(long, global = true)]
    pub binary: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Check that terraform and the template directory are available
    Check,
    /// init + plan
    Plan,
    /// init + apply
    Apply,
    /// destroy
    Destroy,
    /// init + apply, then destroy regardless of the apply result
    Cycle,
    /// Print outputs as JSON (all, or a single named output)
    Output {
        /// Output name
        name: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl TargetArgs {
    /// Merge the config file (if any) with command-line overrides
    pub fn resolve(&self) -> Result<TerraformOptions> {
        let mut options = match self.config {
            Some(ref path) => TerraformOptions::load_from_file(path)?,
            None => TerraformOptions::default(),
        };
        if let Some(ref dir) = self.dir {
            options.terraform_dir = dir.clone();
        }
        if self.no_color {
            options.no_color = true;
        }
        if let Some(ref binary) = self.binary {
            options.terraform_binary = binary.clone();
        }
        for raw in &self.vars {
            let (key, value) = parse_var(raw)?;
            options.vars.insert(key, value);
        }
        if options.terraform_dir.as_os_str().is_empty() {
            options.terraform_dir = PathBuf::from(".");
        }
        Ok(options)
    }
}

/// Split `KEY=VALUE`; the value may itself contain `=`
pub fn parse_var(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(HarnessError::config(format!(
            "invalid --var {:?}, expected KEY=VALUE",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("name=web").unwrap(),
            ("name".to_string(), "web".to_string())
        );
        assert_eq!(
            parse_var("tags=a=b").unwrap(),
            ("tags".to_string(), "a=b".to_string())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=web").is_err());
    }

    #[test]
    fn test_cli_parses_cycle() {
        let cli = Cli::try_parse_from([
            "tfharness",
            "cycle",
            "--dir",
            "demos/basic",
            "--no-color",
            "--var",
            "name=web",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Cycle);

        let options = cli.target.resolve().unwrap();
        assert_eq!(options.terraform_dir, PathBuf::from("demos/basic"));
        assert!(options.no_color);
        assert_eq!(options.vars.get("name").map(String::as_str), Some("web"));
    }

    #[test]
    fn test_resolve_defaults_to_current_dir() {
        let options = TargetArgs::default().resolve().unwrap();
        assert_eq!(options.terraform_dir, PathBuf::from("."));
    }

    #[test]
    fn test_resolve_overrides_config_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("opts.json");
        TerraformOptions::new("from-file")
            .with_var("name", "file")
            .save_to_file(&path)
            .unwrap();

        let target = TargetArgs {
            config: Some(path),
            vars: vec!["name=flag".to_string()],
            ..TargetArgs::default()
        };
        let options = target.resolve().unwrap();
        assert_eq!(options.terraform_dir, PathBuf::from("from-file"));
        assert_eq!(options.vars["name"], "flag");
    }

    #[test]
    fn test_output_command_name() {
        let cli = Cli::try_parse_from(["tfharness", "output", "url"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Output {
                name: Some("url".to_string())
            }
        );
    }
}
