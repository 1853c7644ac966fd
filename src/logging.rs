//! Trace log written to a file, one JSON object per line.

use chrono::{SecondsFormat, Utc};
use log::Record;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

pub const DEFAULT_FILTER: &str = "trace";

pub fn format_record(record: &Record<'_>) -> String {
    serde_json::json!({
        "level": record.level().as_str().to_lowercase(),
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
    .to_string()
}

/// Appends to `path`. `RUST_LOG` overrides the default `trace` filter.
pub fn init(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .format(|buf, record| writeln!(buf, "{}", format_record(record)))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_single_line_json() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("multi\nline"))
                .level(log::Level::Warn)
                .target("Media")
                .build(),
        );
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "warn");
        assert_eq!(value["target"], "Media");
        assert_eq!(value["msg"], "multi\nline");
    }
}
