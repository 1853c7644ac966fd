use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUTH_DIR: &str = "baileys_auth_info";
pub const DEFAULT_STORE_FILE: &str = "baileys_store_multi.json";
pub const DEFAULT_LOG_FILE: &str = "wa-logs.txt";

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub auth_dir: PathBuf,
    /// `None` disables the message cache.
    pub store_file: Option<PathBuf>,
    pub log_file: PathBuf,
    pub auto_reply: bool,
    pub use_pairing_code: bool,
    pub simulate_typing: bool,
    /// `None` keeps retry counters for the whole run.
    pub retry_ttl: Option<Duration>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            auth_dir: DEFAULT_AUTH_DIR.into(),
            store_file: Some(DEFAULT_STORE_FILE.into()),
            log_file: DEFAULT_LOG_FILE.into(),
            auto_reply: false,
            use_pairing_code: false,
            simulate_typing: true,
            retry_ttl: None,
        }
    }
}

/// Demo client: echoes events, optionally greets senders and turns
/// `#sticker` images into stickers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Do not keep (or persist) the message cache.
    #[arg(long)]
    pub no_store: bool,

    /// Greet every incoming message.
    #[arg(long)]
    pub do_reply: bool,

    /// Link with a phone-number code instead of a QR code.
    #[arg(long)]
    pub use_pairing_code: bool,

    /// Send greetings without the typing indicator.
    #[arg(long)]
    pub no_typing: bool,

    /// Forget message retry counters after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub retry_ttl_secs: Option<u64>,

    #[arg(long, default_value = DEFAULT_AUTH_DIR)]
    pub auth_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_STORE_FILE)]
    pub store_file: PathBuf,

    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl From<Cli> for BotConfig {
    fn from(cli: Cli) -> Self {
        Self {
            auth_dir: cli.auth_dir,
            store_file: (!cli.no_store).then_some(cli.store_file),
            log_file: cli.log_file,
            auto_reply: cli.do_reply,
            use_pairing_code: cli.use_pairing_code,
            simulate_typing: !cli.no_typing,
            retry_ttl: cli.retry_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_paths() {
        let config = BotConfig::from(Cli::parse_from(["wabot"]));
        assert_eq!(config.auth_dir, PathBuf::from("baileys_auth_info"));
        assert_eq!(
            config.store_file,
            Some(PathBuf::from("baileys_store_multi.json"))
        );
        assert_eq!(config.log_file, PathBuf::from("wa-logs.txt"));
        assert!(!config.auto_reply);
        assert!(config.simulate_typing);
        assert_eq!(config.retry_ttl, None);
    }

    #[test]
    fn flags_toggle_behaviour() {
        let config = BotConfig::from(Cli::parse_from([
            "wabot",
            "--no-store",
            "--do-reply",
            "--use-pairing-code",
            "--retry-ttl-secs",
            "600",
        ]));
        assert_eq!(config.store_file, None);
        assert!(config.auto_reply);
        assert!(config.use_pairing_code);
        assert_eq!(config.retry_ttl, Some(Duration::from_secs(600)));
    }
}
