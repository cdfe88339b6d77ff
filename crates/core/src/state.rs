// SPDX-License-Identifier: MIT

//! Program state namespace.
//!
//! User-defined states share a namespace with the built-ins, so state is
//! represented as a tagged variant rather than a bare string: equality and
//! hashing still fall back to name comparison, but a [`BuiltinState`] can
//! never collide with a user name by construction once config validation
//! has rejected reserved-name reuse.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The five built-in lifecycle points every program passes through (not
/// every program visits every terminal classification, but each one that
/// terminates passes through exactly one, followed by `final`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinState {
    Initialized,
    Started,
    ActionSuccess,
    ActionFailure,
    ServiceFailure,
    Stopped,
    Final,
}

impl BuiltinState {
    pub const ALL: [BuiltinState; 7] = [
        BuiltinState::Initialized,
        BuiltinState::Started,
        BuiltinState::ActionSuccess,
        BuiltinState::ActionFailure,
        BuiltinState::ServiceFailure,
        BuiltinState::Stopped,
        BuiltinState::Final,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinState::Initialized => "initialized",
            BuiltinState::Started => "started",
            BuiltinState::ActionSuccess => "action_success",
            BuiltinState::ActionFailure => "action_failure",
            BuiltinState::ServiceFailure => "service_failure",
            BuiltinState::Stopped => "stopped",
            BuiltinState::Final => "final",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == s)
    }

    /// Terminal classifications are always immediately followed by `final`.
    pub fn is_terminal_classification(self) -> bool {
        matches!(
            self,
            BuiltinState::ActionSuccess
                | BuiltinState::ActionFailure
                | BuiltinState::ServiceFailure
                | BuiltinState::Stopped
        )
    }
}

impl fmt::Display for BuiltinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state name: either one of the reserved built-ins, or a name declared
/// by a program's `log_states`/`file_states` configuration.
#[derive(Debug, Clone)]
pub enum StateName {
    Builtin(BuiltinState),
    User(String),
}

impl PartialEq for StateName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for StateName {}

impl Hash for StateName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Borrow<str> for StateName {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl StateName {
    pub fn as_str(&self) -> &str {
        match self {
            StateName::Builtin(b) => b.as_str(),
            StateName::User(s) => s.as_str(),
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        StateName::User(name.into())
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, StateName::Builtin(_))
    }

    pub fn is_terminal_classification(&self) -> bool {
        matches!(self, StateName::Builtin(b) if b.is_terminal_classification())
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StateName::Builtin(BuiltinState::Final))
    }
}

/// Parses a raw string into a [`StateName`], mapping reserved names to
/// their [`BuiltinState`] and everything else to a user state. Used when
/// interpreting dependency targets and success-criteria references, where
/// the same string may name either kind of state.
impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        match BuiltinState::from_str(s) {
            Some(b) => StateName::Builtin(b),
            None => StateName::User(s.to_string()),
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StateName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StateName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(StateName::from(s.as_str()))
    }
}

/// Names reserved for built-in states; a program's `log_states`/`file_states`
/// keys must not collide with any of these.
pub fn is_reserved_name(name: &str) -> bool {
    BuiltinState::from_str(name).is_some()
}
