use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agrovision")]
#[command(author, version, about = "Leaf disease classification from the command line")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true, env = "AGROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extra model directory, searched before the configured ones
    #[arg(short = 'm', long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Per-image classification deadline in milliseconds
    #[arg(short, long, global = true, default_value = "30000")]
    pub timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which model and label file would be used
    Resolve,

    /// Classify one or more leaf images
    Classify {
        /// Image files (png, jpg, jpeg, gif, bmp, tif, tiff)
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_args() {
        let cli = Cli::parse_from([
            "agrovision",
            "--model-dir",
            "/srv/models",
            "classify",
            "a.jpg",
            "b.png",
            "--json",
        ]);

        assert_eq!(cli.model_dir, Some(PathBuf::from("/srv/models")));
        assert_eq!(cli.timeout_ms, 30000);
        match cli.command {
            Commands::Classify { images, json } => {
                assert_eq!(images.len(), 2);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_classify_requires_images() {
        assert!(Cli::try_parse_from(["agrovision", "classify"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["agrovision", "resolve", "-v", "--timeout-ms", "500"]);
        assert!(cli.verbose);
        assert_eq!(cli.timeout_ms, 500);
        assert!(matches!(cli.command, Commands::Resolve));
    }
}
