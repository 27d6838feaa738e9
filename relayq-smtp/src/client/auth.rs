use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// SASL mechanisms the client can use against the relay host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    #[default]
    Plain,
    Login,
}

impl AuthMechanism {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial response for `AUTH PLAIN`: `base64("\0user\0pass")`.
pub(super) fn plain_initial_response(username: &str, password: &str) -> String {
    let mut raw = Vec::with_capacity(username.len() + password.len() + 2);
    raw.push(0);
    raw.extend_from_slice(username.as_bytes());
    raw.push(0);
    raw.extend_from_slice(password.as_bytes());
    STANDARD.encode(raw)
}

pub(super) fn encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_matches_rfc4616() {
        // RFC 4616 example with an empty authorization identity.
        assert_eq!(
            plain_initial_response("tim", "tanstaaftanstaaf"),
            "AHRpbQB0YW5zdGFhZnRhbnN0YWFm"
        );
    }

    #[test]
    fn login_encodes_each_field() {
        assert_eq!(encode("username"), "dXNlcm5hbWU=");
    }

    #[test]
    fn mechanism_names() {
        assert_eq!(AuthMechanism::Plain.to_string(), "PLAIN");
        assert_eq!(AuthMechanism::Login.as_str(), "LOGIN");
    }
}
