use serde::Serialize;
use serenity::model::id::{GuildId, UserId};
use std::fmt;

/// Kinds of outward domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    PlayStart,
    PlayEnd,
    PlayStuck,
    PlayException,
    /// Published by the command layer when a sound was triggered in quick succession.
    FastTrigger,
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::PlayStart => "playstart",
            EventKind::PlayEnd => "playend",
            EventKind::PlayStuck => "playstuck",
            EventKind::PlayException => "playexception",
            EventKind::FastTrigger => "fasttrigger",
            EventKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// Immutable event fanned out to every subscriber of the session bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub ident: String,
    pub guild_id: GuildId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, ident: impl Into<String>, guild_id: GuildId) -> Self {
        Self {
            kind,
            ident: ident.into(),
            guild_id,
            user_id: None,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_for_dashboard_consumers() {
        let event = DomainEvent::new(EventKind::PlayStart, "bark", GuildId::new(5));

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "playstart", "ident": "bark", "guild_id": "5"})
        );
    }

    #[test]
    fn optional_fields_are_included_when_set() {
        let event = DomainEvent::new(EventKind::PlayException, "bark", GuildId::new(5))
            .with_user(UserId::new(9))
            .with_error("decoder failed");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["user_id"], json!("9"));
        assert_eq!(value["error"], json!("decoder failed"));
        assert_eq!(EventKind::PlayException.to_string(), value["type"]);
    }
}
