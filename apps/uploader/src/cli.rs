//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Upload files to a resource through presigned sessions.
#[derive(Debug, Parser)]
#[command(name = "mocup-uploader", version, about)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session API base URL, overriding the config file
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Bearer token, overriding the config file
    #[arg(long = "token", env = "MOCUP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Upload one file at a time
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Run failed and expired files once more after the batch settles
    #[arg(long = "retry-failed")]
    pub retry_failed: bool,

    /// Only validate, do not upload
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Resource the files are attached to
    pub resource_id: String,

    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "mocup-uploader",
            "--sequential",
            "--base-url",
            "https://api.example.com",
            "moc-1",
            "a.pdf",
            "b.pdf",
        ])
        .unwrap();
        assert!(cli.sequential);
        assert!(!cli.dry_run);
        assert_eq!(cli.resource_id, "moc-1");
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn files_are_required() {
        assert!(Cli::try_parse_from(["mocup-uploader", "moc-1"]).is_err());
    }
}
