//! Email address types (RFC 5322 §3.4).
//!
//! Parsing lives in [`crate::parser::address`]; these are the values it
//! produces.

use std::fmt;

/// A single mailbox.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `name = Some("Juan García")`,
///   `local_part = "juan"`, `domain = "ejemplo.com"`
/// - `"user@example.com"` → `name = None`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    /// Decoded display name, if one was given.
    pub name: Option<String>,
    /// The part before `@`.
    pub local_part: String,
    /// The part after `@`; domain literals keep their brackets.
    pub domain: String,
}

impl Mailbox {
    /// Create a mailbox without a display name.
    pub fn new(local_part: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: None,
            local_part: local_part.into(),
            domain: domain.into(),
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The bare `local@domain` address.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => {
                write!(f, "{} <{}@{}>", name, self.local_part, self.domain)
            }
            _ => write!(f, "{}@{}", self.local_part, self.domain),
        }
    }
}

/// A named group of mailboxes (`Team: a@x.com, b@x.com;`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<Mailbox>,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name)?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {member}")?;
        }
        write!(f, ";")
    }
}

/// One entry of an address list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Address {
    Mailbox(Mailbox),
    Group(Group),
}

impl Address {
    /// Display name of the mailbox or group.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Mailbox(m) => m.name.as_deref(),
            Self::Group(g) => Some(g.name.as_str()),
        }
    }

    /// All mailboxes this entry stands for, in order.
    pub fn mailboxes(&self) -> Vec<&Mailbox> {
        match self {
            Self::Mailbox(m) => vec![m],
            Self::Group(g) => g.members.iter().collect(),
        }
    }

    /// The mailbox, if this entry is not a group.
    pub fn as_mailbox(&self) -> Option<&Mailbox> {
        match self {
            Self::Mailbox(m) => Some(m),
            Self::Group(_) => None,
        }
    }
}

impl From<Mailbox> for Address {
    fn from(mailbox: Mailbox) -> Self {
        Self::Mailbox(mailbox)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mailbox(m) => m.fmt(f),
            Self::Group(g) => g.fmt(f),
        }
    }
}

/// Format an address list for display, comma separated.
pub fn display_list(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_name() {
        let m = Mailbox::new("alice", "example.com").with_name("Alice");
        assert_eq!(m.to_string(), "Alice <alice@example.com>");
    }

    #[test]
    fn test_display_without_name() {
        let m = Mailbox::new("alice", "example.com");
        assert_eq!(m.to_string(), "alice@example.com");
        assert_eq!(m.address(), "alice@example.com");
    }

    #[test]
    fn test_group_display_and_mailboxes() {
        let group = Address::Group(Group {
            name: "Team".into(),
            members: vec![
                Mailbox::new("a", "x.com"),
                Mailbox::new("b", "x.com").with_name("Bee"),
            ],
        });
        assert_eq!(group.to_string(), "Team: a@x.com, Bee <b@x.com>;");
        assert_eq!(group.mailboxes().len(), 2);
        assert!(group.as_mailbox().is_none());
        assert_eq!(group.name(), Some("Team"));
    }

    #[test]
    fn test_display_list() {
        let list = vec![
            Address::from(Mailbox::new("a", "x.com")),
            Address::from(Mailbox::new("b", "x.com")),
        ];
        assert_eq!(display_list(&list), "a@x.com, b@x.com");
    }

    #[test]
    fn test_serialize_tagged() {
        let addr = Address::from(Mailbox::new("a", "x.com"));
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json["kind"], "mailbox");
        assert_eq!(json["domain"], "x.com");
    }
}
