use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Key used when the caller does not distinguish between users.
    pub const DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    /// The single shared session used when no multi-user key is supplied.
    pub fn default_session() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::default_session()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged entry in a conversation or message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn text(&self) -> &str {
        &self.content
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Capability domains the supervisor can route a request to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Weather,
    Horoscope,
    General,
    Encyclopedia,
    Arithmetic,
    Translation,
    Calendar,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Weather,
        Domain::Horoscope,
        Domain::General,
        Domain::Encyclopedia,
        Domain::Arithmetic,
        Domain::Translation,
        Domain::Calendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Weather => "weather",
            Domain::Horoscope => "horoscope",
            Domain::General => "general",
            Domain::Encyclopedia => "encyclopedia",
            Domain::Arithmetic => "arithmetic",
            Domain::Translation => "translation",
            Domain::Calendar => "calendar",
        }
    }

    /// Name shown to the user when the agent is activated.
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Weather => "METEO",
            Domain::Horoscope => "OROSCOPO",
            Domain::General => "CONVERSAZIONALE",
            Domain::Encyclopedia => "WIKIPEDIA",
            Domain::Arithmetic => "CALCOLATRICE",
            Domain::Translation => "TRADUTTORE",
            Domain::Calendar => "CALENDARIO",
        }
    }

    /// Parse the agent names used in routing prompts and their aliases.
    ///
    /// Returns `None` for `NONE` and anything unrecognised; callers decide
    /// the fallback.
    pub fn parse_agent(name: &str) -> Option<Domain> {
        match name.trim().to_ascii_uppercase().as_str() {
            "WEATHER" | "METEO" => Some(Domain::Weather),
            "HOROSCOPE" | "OROSCOPO" => Some(Domain::Horoscope),
            "GENERAL" | "CONVERSAZIONALE" => Some(Domain::General),
            "WIKIPEDIA" | "ENCYCLOPEDIA" => Some(Domain::Encyclopedia),
            "CALCULATOR" | "ARITHMETIC" | "CALCOLATRICE" => Some(Domain::Arithmetic),
            "TRANSLATOR" | "TRANSLATION" | "TRADUTTORE" => Some(Domain::Translation),
            "CALENDAR" | "CALENDARIO" => Some(Domain::Calendar),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .or_else(|| Domain::parse_agent(s))
            .ok_or_else(|| format!("unknown domain '{}'", s))
    }
}

/// The single required field an agent is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MissingSlot {
    Location,
    ZodiacSign,
    Other(String),
}

impl MissingSlot {
    pub fn as_str(&self) -> &str {
        match self {
            MissingSlot::Location => "location",
            MissingSlot::ZodiacSign => "zodiac_sign",
            MissingSlot::Other(name) => name,
        }
    }
}

impl From<String> for MissingSlot {
    fn from(s: String) -> Self {
        match s.as_str() {
            "location" => MissingSlot::Location,
            "zodiac_sign" | "zodiacSign" => MissingSlot::ZodiacSign,
            _ => MissingSlot::Other(s),
        }
    }
}

impl From<MissingSlot> for String {
    fn from(slot: MissingSlot) -> Self {
        slot.as_str().to_string()
    }
}

impl fmt::Display for MissingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse_agent_aliases() {
        assert_eq!(Domain::parse_agent("weather"), Some(Domain::Weather));
        assert_eq!(Domain::parse_agent(" OROSCOPO "), Some(Domain::Horoscope));
        assert_eq!(Domain::parse_agent("WIKIPEDIA"), Some(Domain::Encyclopedia));
        assert_eq!(Domain::parse_agent("NONE"), None);
        assert_eq!(Domain::parse_agent(""), None);
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!("arithmetic".parse::<Domain>(), Ok(Domain::Arithmetic));
        assert_eq!("TRANSLATOR".parse::<Domain>(), Ok(Domain::Translation));
        assert!("banana".parse::<Domain>().is_err());
    }

    #[test]
    fn test_missing_slot_serde() {
        let json = serde_json::to_string(&MissingSlot::ZodiacSign).unwrap();
        assert_eq!(json, "\"zodiac_sign\"");
        let slot: MissingSlot = serde_json::from_str("\"zodiacSign\"").unwrap();
        assert_eq!(slot, MissingSlot::ZodiacSign);
        let slot: MissingSlot = serde_json::from_str("\"target_language\"").unwrap();
        assert_eq!(slot, MissingSlot::Other("target_language".into()));
    }

    #[test]
    fn test_default_session_is_stable() {
        assert_eq!(SessionId::default(), SessionId::default_session());
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
