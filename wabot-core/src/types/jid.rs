use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const NEWSLETTER_SERVER: &str = "newsletter";
pub const STATUS_BROADCAST_USER: &str = "status";

pub type MessageId = String;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JidError {
    #[error("Invalid JID format: {0}")]
    InvalidFormat(String),
    #[error("Failed to parse component: {0}")]
    Parse(#[from] std::num::ParseIntError),
}

/// Address of a user, group, broadcast list or newsletter.
///
/// Serialized as its string form (`user.agent:device@server`), which is also
/// the form the messaging library uses in JSON payloads.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            ..Default::default()
        }
    }

    pub fn user(user: &str) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    pub fn to_non_ad(&self) -> Self {
        Self {
            user: self.user.clone(),
            server: self.server.clone(),
            ..Default::default()
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_newsletter(&self) -> bool {
        self.server == NEWSLETTER_SERVER
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user == STATUS_BROADCAST_USER
    }

    pub fn is_broadcast_list(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user != STATUS_BROADCAST_USER
    }

    /// Newsletters, the status pseudo-chat and broadcast lists: one-to-many
    /// channels where a reply would not reach a person.
    pub fn is_broadcast_channel(&self) -> bool {
        self.is_newsletter() || self.server == BROADCAST_SERVER
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = match s.split_once('@') {
            Some((u, s)) => (u, s.to_string()),
            None => ("", s.to_string()),
        };

        if server.is_empty() || server.contains('@') {
            return Err(JidError::InvalidFormat(s.to_string()));
        }

        if user_part.is_empty() {
            return Ok(Jid::new("", &server));
        }

        let (user_base, device_str) = match user_part.rsplit_once(':') {
            Some((u, d)) => (u, Some(d)),
            None => (user_part, None),
        };

        // Only user servers carry an agent suffix; group ids may contain dots.
        let (user, agent_str) = match user_base.rsplit_once('.') {
            Some((u, a)) if server == DEFAULT_USER_SERVER || server == HIDDEN_USER_SERVER => {
                (u, Some(a))
            }
            _ => (user_base, None),
        };

        let agent = if let Some(a_str) = agent_str {
            a_str.parse()?
        } else {
            0
        };
        let device = if let Some(d_str) = device_str {
            d_str.parse()?
        } else {
            0
        };

        Ok(Jid {
            user: user.to_string(),
            server,
            agent,
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            write!(f, "{}", self.server)
        } else {
            write!(f, "{}", self.user)?;
            if self.agent > 0 {
                write!(f, ".{}", self.agent)?;
            }
            if self.device > 0 {
                write!(f, ":{}", self.device)?;
            }
            write!(f, "@{}", self.server)
        }
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Jid::from_str(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_with_device() {
        let jid: Jid = "15551234567:12@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "15551234567");
        assert_eq!(jid.device, 12);
        assert_eq!(jid.to_string(), "15551234567:12@s.whatsapp.net");
        assert_eq!(jid.to_non_ad().to_string(), "15551234567@s.whatsapp.net");
    }

    #[test]
    fn group_ids_keep_their_dots() {
        let jid: Jid = "120363021033254949@g.us".parse().unwrap();
        assert!(jid.is_group());
        assert_eq!(jid.agent, 0);
    }

    #[test]
    fn classifies_broadcast_channels() {
        let newsletter: Jid = "120363144038483540@newsletter".parse().unwrap();
        let status: Jid = "status@broadcast".parse().unwrap();
        let list: Jid = "1234567890@broadcast".parse().unwrap();
        let user = Jid::user("15551234567");

        assert!(newsletter.is_newsletter() && newsletter.is_broadcast_channel());
        assert!(status.is_status_broadcast() && status.is_broadcast_channel());
        assert!(list.is_broadcast_list() && list.is_broadcast_channel());
        assert!(!user.is_broadcast_channel());
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Jid>().is_err());
        assert!("a@b@c".parse::<Jid>().is_err());
        assert!("abc:x@s.whatsapp.net".parse::<Jid>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let jid = Jid::user("15551234567");
        let json = serde_json::to_string(&jid).unwrap();
        assert_eq!(json, "\"15551234567@s.whatsapp.net\"");
        let back: Jid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jid);
    }
}
