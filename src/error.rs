// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for the neighbourhood engine and its components.

use std::fmt;

/// ErrorKind is all kinds of Error this crate can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A parameter was out of range: a shrink request, more sources than the
    /// mask word has bits, a hop beyond the configured maximum, and so on.
    InvalidArgument,
    /// An object was used out of protocol, e.g. reading the successors of a
    /// node cursor before advancing it.
    InvalidState,
    /// Two counter arrays with different register layouts were combined.
    IncompatibleShape,
    /// An edge deletion was attempted without a transpose of the graph.
    MissingTranspose,
    /// An underlying I/O operation failed.
    Io,
}

impl ErrorKind {
    /// Convert this error kind instance into static str.
    pub const fn into_static(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::IncompatibleShape => "IncompatibleShape",
            ErrorKind::MissingTranspose => "MissingTranspose",
            ErrorKind::Io => "Io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error is the error struct returned by all fallible functions of this
/// crate.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::default(),
            source: None,
        }
    }

    /// Shorthand for an [`ErrorKind::InvalidArgument`] error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Shorthand for an [`ErrorKind::InvalidState`] error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Shorthand for an [`ErrorKind::IncompatibleShape`] error.
    pub fn incompatible_shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleShape, message)
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Panics
    ///
    /// Panics if the source has been set.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(src.into());
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "I/O operation failed").set_source(err)
    }
}

impl fmt::Display for Error {
    /// One line: `Kind: message [key=value, ...] (caused by: ...)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }

        for (position, (key, value)) in self.context.iter().enumerate() {
            let lead = if position == 0 { " [" } else { ", " };
            write!(f, "{lead}{key}={value}")?;
        }
        if !self.context.is_empty() {
            write!(f, "]")?;
        }

        if let Some(source) = &self.source {
            write!(f, " (caused by: {source})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    /// Multi-line: the kind and message first, one indented line per
    /// context pair, then the source chain.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        for (key, value) in &self.context {
            write!(f, "\n    {key} = {value}")?;
        }
        if let Some(source) = &self.source {
            write!(f, "\ncaused by: {source:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|cause| cause.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = Error::invalid_argument("requested a shrink");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), "requested a shrink");
    }

    #[test]
    fn test_context_is_displayed() {
        let err = Error::incompatible_shape("register size differs")
            .with_context("left", 5)
            .with_context("right", 6);
        let text = format!("{err}");
        assert!(text.contains("IncompatibleShape"));
        assert!(text.contains("[left=5, right=6]"));
    }

    #[test]
    fn test_debug_is_multi_line() {
        let err = Error::invalid_argument("hop out of range").with_context("hop", 9);
        let text = format!("{err:?}");
        assert!(text.contains("InvalidArgument: hop out of range"));
        assert!(text.contains("\n    hop = 9"));
    }

    #[test]
    fn test_io_source_is_kept() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::from(io);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source().is_some());
    }
}
