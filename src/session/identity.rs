use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-defined user record. Stored and forwarded verbatim; the client never
/// reads individual fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Value);

impl Profile {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// The current user as seen by the client.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Identity {
    #[default]
    Unauthenticated,
    Authenticated(Profile),
}

impl Identity {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub const fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Authenticated(profile) => Some(profile),
            Self::Unauthenticated => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_identity_is_unauthenticated() {
        let identity = Identity::default();
        assert!(!identity.is_authenticated());
        assert_eq!(identity.profile(), None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn profile_is_forwarded_verbatim() {
        let raw = json!({"id": 1, "name": "ana", "nested": {"roles": ["a", "b"]}});
        let profile: Profile = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(profile.as_value(), &raw);
        assert_eq!(serde_json::to_value(&profile).unwrap(), raw);
    }
}
