//! Connection identity used by requesters and queries.
//!
//! Credentials live in the external configuration store; only what identifies
//! a z/OSMF endpoint is kept here.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub uuid: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub allow_self_signed: bool,
}

impl ConnectionConfig {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            url: url.into(),
            allow_self_signed: false,
        }
    }

    /// Host part of the URL, used to root virtual paths.
    pub fn host_key(&self) -> &str {
        trim_url(&self.url)
    }
}

/// Strip the scheme and trailing slashes from a connection URL.
pub fn trim_url(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme.trim_end_matches('/')
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_strips_scheme_and_slash() {
        let conn = ConnectionConfig::new("1", "dev", "https://zos.example.com:443/");
        assert_eq!(conn.host_key(), "zos.example.com:443");

        let bare = ConnectionConfig::new("2", "bare", "zos.example.com");
        assert_eq!(bare.host_key(), "zos.example.com");
    }
}
