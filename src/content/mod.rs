//! Content representation helpers.
//!
//! Mainframe text content comes back without the editor's line conventions;
//! adapters bridge the two. Code-page conversion itself happens in the REST
//! layer, so a `Charset` here is only a name carried through attributes.

pub mod adapter;

pub use adapter::{
    adapter_for, ContentAdapter, IdentityAdapter, LineSeparatorAdapter, RecordLayout,
    RecordLengthAdapter,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    #[default]
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Charset(Cow<'static, str>);

impl Charset {
    /// Charset for untagged text content.
    pub const DEFAULT_TEXT: Charset = Charset(Cow::Borrowed("ISO-8859-1"));
    /// Charset recorded for content tagged binary.
    pub const DEFAULT_BINARY: Charset = Charset(Cow::Borrowed("IBM-1047"));

    pub fn new(name: impl Into<String>) -> Self {
        Charset(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::DEFAULT_TEXT
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drop one trailing `\n` (and a preceding `\r`) if present.
pub fn remove_last_new_line(content: &[u8]) -> &[u8] {
    match content {
        [rest @ .., b'\r', b'\n'] => rest,
        [rest @ .., b'\n'] => rest,
        _ => content,
    }
}

/// Append a `\n`, restoring what `remove_last_new_line` took off on fetch.
pub fn add_new_line(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 1);
    out.extend_from_slice(content);
    out.push(b'\n');
    out
}

/// Fetched bytes as the synchronizer sees them: text loses its final newline.
pub fn from_transfer(mode: ContentMode, fetched: Bytes) -> Bytes {
    match mode {
        ContentMode::Text => {
            let trimmed = remove_last_new_line(&fetched).len();
            fetched.slice(..trimmed)
        }
        ContentMode::Binary => fetched,
    }
}

/// Bytes to upload: text gets its final newline back.
pub fn to_transfer(mode: ContentMode, content: &[u8]) -> Bytes {
    match mode {
        ContentMode::Text => Bytes::from(add_new_line(content)),
        ContentMode::Binary => Bytes::copy_from_slice(content),
    }
}
