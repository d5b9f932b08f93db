//! Pairing URI parsing.
//!
//! Both protocol generations share the `wc:<topic>@<version>?<params>`
//! shape; the embedded version tag decides which stack handles the pairing.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub version: u32,
    pub params: HashMap<String, String>,
}

impl PairingUri {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("pairing uri must use the `wc:` scheme")]
    Scheme,
    #[error("pairing uri topic is empty")]
    EmptyTopic,
    #[error("pairing uri is missing a numeric version tag")]
    Version,
    #[error("pairing uri `{key}` parameter is not valid hex")]
    KeyMaterial { key: &'static str },
}

impl FromStr for PairingUri {
    type Err = UriError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let rest = input.strip_prefix("wc:").ok_or(UriError::Scheme)?;
        let (head, query) = match rest.split_once('?') {
            Some((head, query)) => (head, Some(query)),
            None => (rest, None),
        };
        let (topic, version) = head.split_once('@').ok_or(UriError::Version)?;
        if topic.is_empty() {
            return Err(UriError::EmptyTopic);
        }
        let version: u32 = version.parse().map_err(|_| UriError::Version)?;

        let mut params = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|pair| !pair.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                params.insert(key.to_string(), value.to_string());
            }
        }

        // Symmetric key material must be hex when present; a mangled key can
        // never decrypt the relay envelope, so fail at parse time.
        for key in ["key", "symKey"] {
            if let Some(value) = params.get(key) {
                if hex::decode(value).is_err() {
                    return Err(UriError::KeyMaterial { key });
                }
            }
        }

        Ok(Self {
            topic: topic.to_string(),
            version,
            params,
        })
    }
}
