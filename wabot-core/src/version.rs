use serde::{Deserialize, Serialize};

/// Web client version announced to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

/// Bundled fallback used when the latest version cannot be resolved.
pub const DEFAULT_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 1023223821]);

impl Default for ProtocolVersion {
    fn default() -> Self {
        DEFAULT_VERSION
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|e| format!("invalid version {s:?}: {e}")))
            .collect::<Result<_, _>>()?;
        match parts.as_slice() {
            [a, b, c] => Ok(ProtocolVersion([*a, *b, *c])),
            _ => Err(format!("invalid version {s:?}: expected three components")),
        }
    }
}

/// Result of asking for the newest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: ProtocolVersion,
    pub is_latest: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v: ProtocolVersion = "2.3000.1027868167".parse().unwrap();
        assert_eq!(v.to_string(), "2.3000.1027868167");
        assert!("2.3000".parse::<ProtocolVersion>().is_err());
        assert!("2.x.1".parse::<ProtocolVersion>().is_err());
    }
}
