//! Identity claims of an authenticated user.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shown when the identity provider did not supply a `name` claim.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown display name";

/// Claims describing the ID token itself rather than the user. These are
/// dropped before the claims are treated as the user's identity.
pub const PROTOCOL_CLAIMS: [&str; 11] = [
    "aud",
    "iss",
    "iat",
    "exp",
    "nbf",
    "nonce",
    "azp",
    "auth_time",
    "s_hash",
    "at_hash",
    "c_hash",
];

/// The claims of a verified ID token, keyed by claim name.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct IdentityClaims(Map<String, Value>);

impl IdentityClaims {
    /// Build the identity claims from a verified ID token payload, removing
    /// the protocol claims.
    ///
    /// # Examples
    ///
    /// ```
    /// # use oidc_sample::claims::IdentityClaims;
    /// # use serde_json::json;
    /// let payload = json!({ "sub": "abc123", "iss": "https://idp", "name": "Alice" });
    /// let claims = IdentityClaims::from_id_token(payload.as_object().unwrap().clone());
    ///
    /// assert_eq!(claims.get("iss"), None);
    /// assert_eq!(claims.display_name(), "Alice");
    /// ```
    pub fn from_id_token(payload: Map<String, Value>) -> Self {
        // filtering rather than removing keeps the provider's claim order
        Self(
            payload
                .into_iter()
                .filter(|(claim, _)| !PROTOCOL_CLAIMS.contains(&claim.as_str()))
                .collect(),
        )
    }

    /// Get the JSON value of a claim.
    ///
    /// Returns [`None`] if the claim is not set.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    fn get_str(&self, claim: &str) -> Option<&str> {
        self.get(claim).and_then(Value::as_str)
    }

    /// Get the subject identifier.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Get the user's display name, or [`UNKNOWN_DISPLAY_NAME`] if the `name`
    /// claim is missing or empty.
    pub fn display_name(&self) -> &str {
        self.get_str("name")
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_DISPLAY_NAME)
    }

    /// Get the user's preferred username, falling back to the subject.
    ///
    /// Returns [`None`] if neither is set.
    pub fn preferred_username(&self) -> Option<&str> {
        self.get_str("preferred_username")
            .filter(|username| !username.is_empty())
            .or_else(|| self.subject())
    }

    /// The full claim set as indented JSON.
    pub fn to_pretty_json(&self) -> String {
        // serializing a map of JSON values can't fail
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for IdentityClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}
