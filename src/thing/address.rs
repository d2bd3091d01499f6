//! Bus addressing for thing interactions
//!
//! Every destination on the bus is derived from a thing name, an interaction
//! name and an [`Operation`]. The thing name is always the first segment and
//! each segment is percent-encoded, so two different triples never produce
//! the same address.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::description::Verb;

/// What a message sent to an address asks the thing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ReadDescription,
    WriteDescription,
    GetInteraction,
    PostInteraction,
    PutInteraction,
    GetExtraData,
    PutExtraData,
    DeleteExtraData,
    AuthorizationQuery,
}

impl Operation {
    /// Operation used to invoke an interaction with the given verb
    #[must_use]
    pub const fn for_verb(verb: Verb) -> Self {
        match verb {
            Verb::Get => Self::GetInteraction,
            Verb::Post => Self::PostInteraction,
            Verb::Put => Self::PutInteraction,
        }
    }

    /// Whether the operation targets the thing as a whole rather than one interaction
    #[must_use]
    pub const fn is_thing_scoped(self) -> bool {
        matches!(
            self,
            Self::ReadDescription | Self::WriteDescription | Self::AuthorizationQuery
        )
    }

    /// Stable textual form, used as the last address segment
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadDescription => "read-description",
            Self::WriteDescription => "write-description",
            Self::GetInteraction => "get-interaction",
            Self::PostInteraction => "post-interaction",
            Self::PutInteraction => "put-interaction",
            Self::GetExtraData => "get-extra-data",
            Self::PutExtraData => "put-extra-data",
            Self::DeleteExtraData => "delete-extra-data",
            Self::AuthorizationQuery => "authorization-query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination on the message bus
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    thing: String,
    interaction: String,
    operation: Operation,
}

impl Address {
    /// Address of a thing-level operation (description, authorization)
    #[must_use]
    pub fn thing(thing: &str, operation: Operation) -> Self {
        address(thing, "", operation)
    }

    /// Address of an interaction-level operation
    #[must_use]
    pub fn interaction(thing: &str, interaction: &str, operation: Operation) -> Self {
        address(thing, interaction, operation)
    }

    /// Interaction name, empty for thing-level operations
    #[must_use]
    pub fn interaction_name(&self) -> &str {
        &self.interaction
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let thing = urlencoding::encode(&self.thing);
        if self.interaction.is_empty() {
            write!(f, "{thing}/{}", self.operation)
        } else {
            let interaction = urlencoding::encode(&self.interaction);
            write!(f, "{thing}/interactions/{interaction}/{}", self.operation)
        }
    }
}

/// Map a (thing, interaction, operation) triple to its bus destination
///
/// Thing-scoped operations ignore the interaction name, so every thing has
/// exactly one description and one authorization address.
#[must_use]
pub fn address(thing: &str, interaction: &str, operation: Operation) -> Address {
    let interaction = if operation.is_thing_scoped() {
        String::new()
    } else {
        interaction.to_string()
    };
    Address {
        thing: thing.to_string(),
        interaction,
        operation,
    }
}
