//! Conversation history normalization.
//!
//! The platform keeps no memory between runs; callers pass prior turns on
//! every call. [`normalize`] turns loosely written turns into the wire form
//! and rejects sequences the backend would refuse, before any request is sent.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Canonical participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Case-insensitive, with common aliases (`human`, `ai`, `bot`, `model`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" | "human" => Some(Self::User),
            "assistant" | "ai" | "bot" | "model" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One prior turn as `{role, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User.as_str(), content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant.as_str(), content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System.as_str(), content)
    }
}

/// How strictly user/assistant turns must alternate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlternationPolicy {
    /// First non-system turn is `user`, then turns strictly alternate.
    #[default]
    Strict,
    /// Consecutive turns of the same role are merged into one.
    Relaxed,
}

/// [`normalize_with`] under [`AlternationPolicy::Strict`].
pub fn normalize(history: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
    normalize_with(history, AlternationPolicy::Strict)
}

/// Canonicalizes roles and checks turn order.
///
/// System turns are only accepted before the first user or assistant turn.
/// Content is passed through unchanged. Normalizing an already normalized
/// history returns it as is.
pub fn normalize_with(
    history: &[ChatMessage],
    policy: AlternationPolicy,
) -> Result<Vec<ChatMessage>> {
    let mut turns: Vec<(Role, String)> = Vec::with_capacity(history.len());

    for (index, turn) in history.iter().enumerate() {
        if turn.role.trim().is_empty() {
            return Err(Error::validation(format!(
                "history turn {}: role must not be empty",
                index
            )));
        }
        let role = Role::parse(&turn.role).ok_or_else(|| {
            Error::validation(format!(
                "history turn {}: unknown role '{}'",
                index,
                turn.role.trim()
            ))
        })?;

        let previous = turns.last().map(|(r, _)| *r);
        if role == Role::System {
            if previous.is_some_and(|r| r != Role::System) {
                return Err(Error::validation(format!(
                    "history turn {}: system turns must precede the conversation",
                    index
                )));
            }
            turns.push((role, turn.content.clone()));
            continue;
        }

        match policy {
            AlternationPolicy::Strict => {
                let expected = match previous {
                    None | Some(Role::System) => Role::User,
                    Some(Role::User) => Role::Assistant,
                    Some(Role::Assistant) => Role::User,
                };
                if role != expected {
                    return Err(Error::validation(format!(
                        "history turn {}: expected a {} turn, got {}",
                        index,
                        expected.as_str(),
                        role.as_str()
                    )));
                }
                turns.push((role, turn.content.clone()));
            }
            AlternationPolicy::Relaxed => match turns.last_mut() {
                Some((last, content)) if *last == role => {
                    content.push_str("\n\n");
                    content.push_str(&turn.content);
                }
                _ => turns.push((role, turn.content.clone())),
            },
        }
    }

    Ok(turns
        .into_iter()
        .map(|(role, content)| ChatMessage::new(role.as_str(), content))
        .collect())
}

/// Parses `[{"role": ..., "content": ...}, ...]`, as given on the command line.
pub fn parse_json(raw: &str) -> Result<Vec<ChatMessage>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::validation(format!("chat history is not a list of {{role, content}}: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(pairs: &[(&str, &str)]) -> Vec<ChatMessage> {
        pairs.iter().map(|(r, c)| ChatMessage::new(*r, *c)).collect()
    }

    #[test]
    fn test_canonicalizes_roles() {
        let normalized = normalize(&turns(&[
            (" System ", "Be brief."),
            ("Human", "2+2?"),
            ("AI", "4"),
            ("user", "and 3+3?"),
        ]))
        .unwrap();
        let roles: Vec<&str> = normalized.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(normalized[1].content, "2+2?");
    }

    #[test]
    fn test_idempotent() {
        let history = turns(&[("HUMAN", "hi"), ("bot", "hello"), ("user", "bye")]);
        let once = normalize(&history).unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);

        let relaxed = normalize_with(&history, AlternationPolicy::Relaxed).unwrap();
        assert_eq!(
            normalize_with(&relaxed, AlternationPolicy::Relaxed).unwrap(),
            relaxed
        );
    }

    #[test]
    fn test_empty_history() {
        assert!(normalize(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_empty_role() {
        let err = normalize(&turns(&[("user", "hi"), ("  ", "hello")])).unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("turn 1")));
    }

    #[test]
    fn test_rejects_unknown_role() {
        assert!(matches!(
            normalize(&turns(&[("narrator", "once upon a time")])),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_strict_alternation() {
        assert!(normalize(&turns(&[("assistant", "hi")])).is_err());
        assert!(normalize(&turns(&[("user", "a"), ("user", "b")])).is_err());
        assert!(normalize(&turns(&[("user", "a"), ("assistant", "b")])).is_ok());
    }

    #[test]
    fn test_system_only_leading() {
        assert!(normalize(&turns(&[("system", "s1"), ("system", "s2"), ("user", "u")])).is_ok());
        assert!(normalize(&turns(&[("user", "u"), ("system", "s")])).is_err());
    }

    #[test]
    fn test_relaxed_merges_consecutive() {
        let merged = normalize_with(
            &turns(&[("assistant", "greeting"), ("user", "a"), ("human", "b")]),
            AlternationPolicy::Relaxed,
        )
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1], ChatMessage::user("a\n\nb"));
    }

    #[test]
    fn test_parse_json() {
        let parsed = parse_json(r#"[{"role":"user","content":"hi"}]"#).unwrap();
        assert_eq!(parsed, vec![ChatMessage::user("hi")]);
        assert!(matches!(parse_json("{}"), Err(Error::Validation(_))));
    }
}
