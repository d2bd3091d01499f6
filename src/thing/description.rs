//! Thing description: the manifest of a thing's interactions
//!
//! Only the parts the gateway routes on are modelled. Anything else in the
//! document is carried through untouched so that a description read back
//! from a thing matches what it declared.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// HTTP verb an interaction accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
            Self::Put => f.write_str("PUT"),
        }
    }
}

/// Semantic kind of an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Property,
    Action,
    Event,
}

/// How callers of an interaction are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Open to anyone
    #[default]
    None,

    /// The interaction checks `Basic` credentials itself
    Basic,

    /// A bearer token is resolved by the gatekeeper before dispatch
    Bearer,
}

/// A single declared interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub name: String,
    pub kind: InteractionKind,
    pub verbs: Vec<Verb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default)]
    pub security: Security,
}

impl Interaction {
    /// Whether the interaction accepts the verb
    #[must_use]
    pub fn accepts(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    /// Whether dispatch must resolve a bearer token first
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.security == Security::Bearer
    }
}

/// Parsed thing description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingDescription {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub interactions: Vec<Interaction>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThingDescription {
    /// Parse a description from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `DescriptionLoad` if the document is malformed
    pub fn from_json(source: &str) -> Result<Self> {
        let description: Self =
            serde_json::from_str(source).map_err(|e| Error::DescriptionLoad(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Parse a description from an already decoded JSON value
    ///
    /// # Errors
    ///
    /// Returns `DescriptionLoad` if the value is not a valid description
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let description: Self =
            serde_json::from_value(value).map_err(|e| Error::DescriptionLoad(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Load a description from a file
    ///
    /// # Errors
    ///
    /// Returns `DescriptionLoad` if the file is missing or malformed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::DescriptionLoad(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Find an interaction by name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Interaction> {
        self.interactions.iter().find(|i| i.name == name)
    }

    /// Serialize back to JSON
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Check that `replacement` may take this description's place
    ///
    /// A rewrite can change free text and extra fields. It must keep the
    /// same interactions, each with the same verbs and security, because
    /// bus bindings and token resolution are derived from them.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first interaction that differs
    pub fn check_replacement(&self, replacement: &Self) -> Result<()> {
        if let Some(added) = replacement
            .interactions
            .iter()
            .find(|i| self.lookup(&i.name).is_none())
        {
            return Err(Error::Validation(format!(
                "interaction '{}' cannot be added by a description write",
                added.name
            )));
        }

        for current in &self.interactions {
            let Some(next) = replacement.lookup(&current.name) else {
                return Err(Error::Validation(format!(
                    "interaction '{}' cannot be removed by a description write",
                    current.name
                )));
            };
            let verbs: HashSet<Verb> = current.verbs.iter().copied().collect();
            let next_verbs: HashSet<Verb> = next.verbs.iter().copied().collect();
            if verbs != next_verbs || current.security != next.security {
                return Err(Error::Validation(format!(
                    "verbs and security of interaction '{}' are fixed",
                    current.name
                )));
            }
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::DescriptionLoad("description has no name".to_string()));
        }

        let mut seen = HashSet::new();
        for interaction in &self.interactions {
            if interaction.name.is_empty() {
                return Err(Error::DescriptionLoad(format!(
                    "thing '{}' declares an unnamed interaction",
                    self.name
                )));
            }
            if interaction.verbs.is_empty() {
                return Err(Error::DescriptionLoad(format!(
                    "interaction '{}' declares no verbs",
                    interaction.name
                )));
            }
            if !seen.insert(interaction.name.as_str()) {
                return Err(Error::DescriptionLoad(format!(
                    "interaction '{}' declared twice",
                    interaction.name
                )));
            }
        }

        Ok(())
    }
}
