//! Content adapters between the editor and mainframe representations.

use crate::api::RecordFormat;
use crate::content::ContentMode;
use bytes::Bytes;

pub trait ContentAdapter: Send + Sync {
    /// Bytes as fetched -> bytes as shown in the editor.
    fn adapt_from_mainframe(&self, content: &[u8]) -> Bytes;

    /// Bytes from the editor -> bytes to upload.
    fn prepare_to_mainframe(&self, content: &[u8]) -> Bytes;
}

/// Record layout of a dataset, used to keep uploaded lines within LRECL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub format: RecordFormat,
    pub record_length: u32,
}

impl RecordLayout {
    /// Bytes of data a single record can hold.
    ///
    /// Variable records spend four bytes on the record descriptor word.
    /// Undefined-format records are never split.
    pub fn usable_length(&self) -> Option<usize> {
        let lrecl = self.record_length as usize;
        match self.format {
            RecordFormat::F | RecordFormat::FB | RecordFormat::FBA => Some(lrecl),
            RecordFormat::V | RecordFormat::VB | RecordFormat::VBA => lrecl.checked_sub(4),
            RecordFormat::U => None,
        }
        .filter(|len| *len > 0)
    }
}

/// Binary content passes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityAdapter;

impl ContentAdapter for IdentityAdapter {
    fn adapt_from_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::copy_from_slice(content)
    }

    fn prepare_to_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::copy_from_slice(content)
    }
}

/// Normalizes CRLF and lone CR to LF.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineSeparatorAdapter;

impl LineSeparatorAdapter {
    pub fn normalize(content: &[u8]) -> Vec<u8> {
        if !content.contains(&b'\r') {
            return content.to_vec();
        }
        let mut out = Vec::with_capacity(content.len());
        let mut iter = content.iter().peekable();
        while let Some(&b) = iter.next() {
            if b == b'\r' {
                if iter.peek() == Some(&&b'\n') {
                    iter.next();
                }
                out.push(b'\n');
            } else {
                out.push(b);
            }
        }
        out
    }
}

impl ContentAdapter for LineSeparatorAdapter {
    fn adapt_from_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::from(Self::normalize(content))
    }

    fn prepare_to_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::from(Self::normalize(content))
    }
}

/// Splits over-long lines before upload so no record is truncated.
#[derive(Debug, Clone, Copy)]
pub struct RecordLengthAdapter {
    max_line: usize,
}

impl RecordLengthAdapter {
    pub fn new(max_line: usize) -> Self {
        Self {
            max_line: max_line.max(1),
        }
    }

    pub fn for_layout(layout: RecordLayout) -> Option<Self> {
        layout.usable_length().map(Self::new)
    }

    fn split_long_lines(&self, content: &[u8]) -> Vec<u8> {
        let normalized = LineSeparatorAdapter::normalize(content);
        let mut out = Vec::with_capacity(normalized.len() + normalized.len() / self.max_line);
        let mut lines = normalized.split(|b| *b == b'\n').peekable();
        while let Some(line) = lines.next() {
            let mut chunks = line.chunks(self.max_line).peekable();
            while let Some(chunk) = chunks.next() {
                out.extend_from_slice(chunk);
                if chunks.peek().is_some() {
                    out.push(b'\n');
                }
            }
            if lines.peek().is_some() {
                out.push(b'\n');
            }
        }
        out
    }
}

impl ContentAdapter for RecordLengthAdapter {
    fn adapt_from_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::from(LineSeparatorAdapter::normalize(content))
    }

    fn prepare_to_mainframe(&self, content: &[u8]) -> Bytes {
        Bytes::from(self.split_long_lines(content))
    }
}

/// Adapter for content in `mode` with an optional dataset record layout.
pub fn adapter_for(mode: ContentMode, layout: Option<RecordLayout>) -> Box<dyn ContentAdapter> {
    match (mode, layout.and_then(RecordLengthAdapter::for_layout)) {
        (ContentMode::Binary, _) => Box::new(IdentityAdapter),
        (ContentMode::Text, Some(adapter)) => Box::new(adapter),
        (ContentMode::Text, None) => Box::new(LineSeparatorAdapter),
    }
}
