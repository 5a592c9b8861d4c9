//! Authenticated identity handed to downstream handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which Basic authentication reports the user name.
pub const USER_NAME_KEY: &str = "user-name";

/// User information attached to an authenticated request.
///
/// For OpenID Connect this is the provider's userinfo response, untouched.
/// Basic authentication produces `{"user-name": <name>}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub Map<String, Value>);

impl UserInfo {
    pub fn from_user_name(name: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(USER_NAME_KEY.to_string(), Value::String(name.into()));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The OIDC `sub` claim, if present.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Best display name: Basic user name, then `preferred_username`,
    /// `name`, `email`, `sub`.
    pub fn display_name(&self) -> Option<&str> {
        [USER_NAME_KEY, "preferred_username", "name", "email", "sub"]
            .iter()
            .find_map(|key| self.get_str(key))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for UserInfo {
    type Error = Value;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_identity_shape() {
        let info = UserInfo::from_user_name("alice");
        assert_eq!(info.into_value(), json!({"user-name": "alice"}));
    }

    #[test]
    fn test_display_name_precedence() {
        let info = UserInfo::try_from(json!({"sub": "42", "email": "a@example.com"})).unwrap();
        assert_eq!(info.display_name(), Some("a@example.com"));
        assert_eq!(info.subject(), Some("42"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(UserInfo::try_from(json!(["a"])).is_err());
    }
}
