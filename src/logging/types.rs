//! Value objects handed to the engine by the rest of the server

use crate::logging::value::LogValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a thing (device). The nil id means "no thing".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub Uuid);

impl ThingId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ThingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ThingId)
    }
}

impl From<Uuid> for ThingId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier of a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub Uuid);

impl RuleId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub param_type_id: Uuid,
    pub value: LogValue,
}

impl Param {
    pub fn new(param_type_id: Uuid, value: impl Into<LogValue>) -> Self {
        Self {
            param_type_id,
            value: value.into(),
        }
    }
}

/// An event emitted by a thing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type_id: Uuid,
    pub thing_id: ThingId,
    pub params: Vec<Param>,
    /// Emitted because a state value changed
    pub is_state_change: bool,
}

/// An action executed on a thing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type_id: Uuid,
    pub thing_id: ThingId,
    pub params: Vec<Param>,
}

/// An action executed on a browser item of a thing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserAction {
    pub thing_id: ThingId,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserItemAction {
    pub thing_id: ThingId,
    pub item_id: String,
    pub action_type_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub active: bool,
}
