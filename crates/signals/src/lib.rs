//! Turn the unstructured output of a child process into discrete signals.
//!
//! Long-running tools (package managers, model servers, downloaders) report
//! their progress as free-form text on stdout and stderr. This crate splits
//! those byte streams into clean lines and runs each line through an ordered
//! table of rules, so callers decide what a line *means* in one place and
//! keep the process plumbing elsewhere.
//!
//! # Example
//!
//! ```no_run
//! use eodi_signals::{LineSplitter, Matcher, OutputLine, OutputStream, RuleTable, StreamFilter};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Pull {
//!     Progress(i32),
//!     Done,
//! }
//!
//! let rules = RuleTable::new()
//!     .signal(StreamFilter::Stderr, Matcher::contains("success"), Pull::Done)
//!     .on(StreamFilter::Any, Matcher::Percent, |m| m.number::<i32>().map(Pull::Progress));
//!
//! let mut splitter = LineSplitter::new();
//! for text in splitter.push(b"pulling 12%\rpulling 47%\n") {
//!     let line = OutputLine::new(OutputStream::Stderr, text);
//!     println!("{:?}", rules.classify(&line));
//! }
//! ```

mod lines;
mod rules;

pub use lines::{strip_ansi, LineSplitter};
pub use rules::{Matcher, RuleMatch, RuleTable, StreamFilter};

use std::fmt;

/// Which pipe of the child process a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One cleaned line of child process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn new(stream: OutputStream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(OutputStream::Stdout, text)
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(OutputStream::Stderr, text)
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream, self.text)
    }
}

/// Errors that can occur while building a rule table
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
