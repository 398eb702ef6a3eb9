// Composite identifiers
//
// "{providerKey}_{nativeId}": the key is everything before the first
// separator, the native id is the rest and may itself contain '_'.

use std::fmt;

use crate::error::{Error, Result};

pub const SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeId<'a> {
    pub key: &'a str,
    pub native: &'a str,
}

impl<'a> CompositeId<'a> {
    /// Split on the first separator
    pub fn parse(id: &'a str) -> Result<Self> {
        id.split_once(SEPARATOR)
            .map(|(key, native)| Self { key, native })
            .ok_or_else(|| Error::BadIdentifier(id.to_string()))
    }

    /// Like `parse`, but a plain id addresses the provider of the same name
    #[must_use]
    pub fn parse_or_plain(id: &'a str) -> Self {
        Self::parse(id).unwrap_or(Self {
            key: id,
            native: id,
        })
    }
}

impl fmt::Display for CompositeId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, SEPARATOR, self.native)
    }
}

#[must_use]
pub fn compose(key: &str, native: &str) -> String {
    format!("{key}{SEPARATOR}{native}")
}
