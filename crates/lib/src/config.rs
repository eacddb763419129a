//! Registry configuration.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Whether a write's broadcast is also delivered to the connection that made it.
///
/// The writer always receives the post-write snapshot as its response, so excluding it
/// from the broadcast only saves the echo. Every update carries the originating
/// connection either way, letting subscribers recognise their own writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Broadcast to every subscriber, including the writer.
    #[default]
    IncludeOrigin,
    /// Broadcast to every subscriber except the writer.
    ExcludeOrigin,
}

impl EchoPolicy {
    /// Whether an update originating from `origin` should be delivered to `subscriber`.
    pub fn delivers_to<T: PartialEq + ?Sized>(&self, subscriber: &T, origin: Option<&T>) -> bool {
        match self {
            EchoPolicy::IncludeOrigin => true,
            EchoPolicy::ExcludeOrigin => origin != Some(subscriber),
        }
    }
}

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Echo policy applied to every shared state the registry creates.
    pub echo: EchoPolicy,
}

impl RegistryConfig {
    /// Set the echo policy.
    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
