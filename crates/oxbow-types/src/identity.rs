use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The identity of an actor performing database operations.
///
/// An identity is an opaque non-empty string (typically a bech32 account
/// address). Policy-bound collections require one on every mutation; the
/// access control module binds registered documents to the creating identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorIdentity(String);

impl ActorIdentity {
    /// Create an identity, rejecting the empty string.
    pub fn new(identity: impl Into<String>) -> Result<Self, TypeError> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(TypeError::EmptyIdentity);
        }
        Ok(Self(identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_identity() {
        assert_eq!(ActorIdentity::new(""), Err(TypeError::EmptyIdentity));
    }

    #[test]
    fn accepts_and_displays() {
        let id = ActorIdentity::new("cosmos1zzg43wdrhmmk89z3pmejwete2kkd4a3vn7w969").unwrap();
        assert_eq!(id.as_str(), "cosmos1zzg43wdrhmmk89z3pmejwete2kkd4a3vn7w969");
        assert_eq!(id.to_string(), id.as_str());
    }
}
