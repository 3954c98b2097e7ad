use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lockbox",
    about = "Inspect and edit lockbox key-value stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Connector config (TOML). Without one, stores are persistent under --data-dir.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Journal directory when no config is given.
    #[arg(long, global = true, default_value = ".lockbox")]
    pub data_dir: PathBuf,

    /// Store to operate on; the default partition when omitted.
    #[arg(short, long, global = true)]
    pub store: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a value under a key
    Store(StoreArgs),
    /// Print the value stored under a key
    Retrieve(RetrieveArgs),
    /// Delete a key and print its value
    Remove(KeyArgs),
    /// Check whether a key holds a value
    Contains(KeyArgs),
    /// Delete every entry in the store
    Clear,
    /// List every key in the store
    Keys,
    /// Print every entry in the store
    All,
    /// Run the store's eviction policy now
    Sweep,
}

#[derive(Args)]
pub struct StoreArgs {
    pub key: String,
    pub value: String,
    /// Fail instead of overwriting an existing value
    #[arg(long)]
    pub fail_if_present: bool,
    #[arg(long, default_value = "text/plain")]
    pub media_type: String,
}

#[derive(Args)]
pub struct RetrieveArgs {
    pub key: String,
    /// Printed when the key is absent; not written to the store
    #[arg(long)]
    pub default: Option<String>,
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_store() {
        let cli = Cli::try_parse_from(["lockbox", "store", "k", "v"]).unwrap();
        if let Command::Store(args) = cli.command {
            assert_eq!(args.key, "k");
            assert_eq!(args.value, "v");
            assert!(!args.fail_if_present);
            assert_eq!(args.media_type, "text/plain");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_store_strict() {
        let cli = Cli::try_parse_from([
            "lockbox", "store", "k", "{}", "--fail-if-present", "--media-type", "application/json",
        ])
        .unwrap();
        if let Command::Store(args) = cli.command {
            assert!(args.fail_if_present);
            assert_eq!(args.media_type, "application/json");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_retrieve_with_default() {
        let cli = Cli::try_parse_from(["lockbox", "retrieve", "k", "--default", "none"]).unwrap();
        if let Command::Retrieve(args) = cli.command {
            assert_eq!(args.default.as_deref(), Some("none"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_store_after_subcommand() {
        let cli = Cli::try_parse_from(["lockbox", "keys", "--store", "sessions"]).unwrap();
        assert!(matches!(cli.command, Command::Keys));
        assert_eq!(cli.store.as_deref(), Some("sessions"));
    }

    #[test]
    fn parse_config_and_format() {
        let cli = Cli::try_parse_from(["lockbox", "-c", "lockbox.toml", "--format", "json", "all"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lockbox.toml")));
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["lockbox", "sweep"]).unwrap();
        assert!(cli.store.is_none());
        assert!(!cli.verbose);
        assert_eq!(cli.data_dir, PathBuf::from(".lockbox"));
    }
}
