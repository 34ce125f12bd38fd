use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::{OutputLine, OutputStream, RuleError};

/// Restricts a rule to lines read from a particular pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFilter {
    Any,
    Stdout,
    Stderr,
}

impl StreamFilter {
    pub fn accepts(self, stream: OutputStream) -> bool {
        match self {
            StreamFilter::Any => true,
            StreamFilter::Stdout => stream == OutputStream::Stdout,
            StreamFilter::Stderr => stream == OutputStream::Stderr,
        }
    }
}

/// How a rule recognises a line
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Plain substring
    Contains(String),
    /// Substring compared case-insensitively (needle stored lowercase)
    ContainsIgnoreCase(String),
    /// An integer percentage such as `47%` or `47.5 %`; captures the integer part
    Percent,
    /// A byte size such as `1.2 GB` or `300 MiB`; captures the whole size
    SizeUnit,
    /// Arbitrary pattern; captures group 1 when present, the whole match otherwise
    Regex(Regex),
}

impl Matcher {
    pub fn contains(needle: impl Into<String>) -> Self {
        Matcher::Contains(needle.into())
    }

    pub fn contains_ignore_case(needle: impl AsRef<str>) -> Self {
        Matcher::ContainsIgnoreCase(needle.as_ref().to_lowercase())
    }

    /// Whole-word match, so `success` does not fire on `unsuccessful`
    pub fn word(word: &str) -> Self {
        let pattern = format!(r"\b{}\b", regex::escape(word));
        match Regex::new(&pattern) {
            Ok(re) => Matcher::Regex(re),
            Err(_) => Matcher::Contains(word.to_string()),
        }
    }

    pub fn regex(pattern: &str) -> Result<Self, RuleError> {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|source| RuleError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Returns `Some(capture)` when the text matches
    fn find<'a>(&self, text: &'a str) -> Option<Option<&'a str>> {
        match self {
            Matcher::Contains(needle) => text.contains(needle.as_str()).then_some(None),
            Matcher::ContainsIgnoreCase(needle) => {
                text.to_lowercase().contains(needle.as_str()).then_some(None)
            }
            Matcher::Percent => find_percent(text).map(Some),
            Matcher::SizeUnit => find_size(text).map(Some),
            Matcher::Regex(re) => re.captures(text).map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str())
            }),
        }
    }
}

/// A line accepted by a rule, handed to the rule's signal builder
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub line: &'a OutputLine,
    pub capture: Option<&'a str>,
}

impl RuleMatch<'_> {
    /// Parse the captured text as a number
    pub fn number<T: FromStr>(&self) -> Option<T> {
        self.capture.and_then(|c| c.trim().parse().ok())
    }
}

type SignalFn<S> = Box<dyn Fn(&RuleMatch<'_>) -> Option<S> + Send + Sync>;

struct Rule<S> {
    filter: StreamFilter,
    matcher: Matcher,
    signal: SignalFn<S>,
}

/// Ordered (stream, pattern) → signal rules. The first rule that matches a
/// line and produces a signal wins.
pub struct RuleTable<S> {
    rules: Vec<Rule<S>>,
}

impl<S> Default for RuleTable<S> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<S> RuleTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule whose signal is derived from the match. Returning `None`
    /// lets later rules look at the line.
    pub fn on<F>(mut self, filter: StreamFilter, matcher: Matcher, signal: F) -> Self
    where
        F: Fn(&RuleMatch<'_>) -> Option<S> + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            filter,
            matcher,
            signal: Box::new(signal),
        });
        self
    }

    /// Add a rule that always produces the same signal
    pub fn signal(self, filter: StreamFilter, matcher: Matcher, signal: S) -> Self
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(filter, matcher, move |_| Some(signal.clone()))
    }

    pub fn classify(&self, line: &OutputLine) -> Option<S> {
        self.rules.iter().find_map(|rule| {
            if !rule.filter.accepts(line.stream) {
                return None;
            }
            let capture = rule.matcher.find(&line.text)?;
            let signal = (rule.signal)(&RuleMatch { line, capture });
            if signal.is_some() {
                log::trace!("{} matched {:?}", line, rule.matcher);
            }
            signal
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<S> std::fmt::Debug for RuleTable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| (r.filter, &r.matcher)))
            .finish()
    }
}

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.\d+)?\s*%").expect("percent pattern is valid"));

static SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*[KMGT]i?B\b").expect("size pattern is valid")
});

/// Integer part of the first percentage: "47.5 %" reports 47
fn find_percent(text: &str) -> Option<&str> {
    PERCENT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn find_size(text: &str) -> Option<&str> {
    SIZE.find(text).map(|m| m.as_str())
}
