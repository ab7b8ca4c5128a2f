use std::fmt::Display;

use regex::Regex;
use snafu::ResultExt;

use crate::errors::{InvalidMatcherRegexSnafu, Result};
use crate::labels::METRIC_NAME_LABEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

/// A label predicate. Regex variants hold the compiled, fully anchored
/// pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub match_type: MatchType,
    pub name: String,
    pub value: String,
    re: Option<Regex>,
}

impl Matcher {
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        let re = match match_type {
            MatchType::Regex | MatchType::NotRegex => {
                let anchored = format!("^(?:{})$", value);
                Some(Regex::new(&anchored).context(InvalidMatcherRegexSnafu {
                    pattern: value.clone(),
                })?)
            }
            _ => None,
        };
        Ok(Self {
            match_type,
            name,
            value,
            re,
        })
    }

    pub fn eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        // Equality matchers never fail to build.
        Self::new(MatchType::Equal, name, value).unwrap()
    }

    pub fn matches(&self, value: &str) -> bool {
        match self.match_type {
            MatchType::Equal => self.value == value,
            MatchType::NotEqual => self.value != value,
            MatchType::Regex => self.re.as_ref().map(|r| r.is_match(value)).unwrap_or(false),
            MatchType::NotRegex => self.re.as_ref().map(|r| !r.is_match(value)).unwrap_or(false),
        }
    }

    /// True when the matcher accepts the empty string, i.e. it can match
    /// series that do not carry the label at all. Such matchers cannot be
    /// answered from the index and must run as post-filters.
    pub fn matches_empty(&self) -> bool {
        self.matches("")
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.match_type {
            MatchType::Equal => "=",
            MatchType::NotEqual => "!=",
            MatchType::Regex => "=~",
            MatchType::NotRegex => "!~",
        };
        write!(f, "{}{}\"{}\"", self.name, op, self.value)
    }
}

/// Pulls the mandatory `__name__` equality matcher out of a matcher list,
/// returning the metric name and the remaining matchers. None when it is
/// missing or not an equality match.
pub fn extract_metric_name(matchers: Vec<Matcher>) -> Option<(String, Vec<Matcher>)> {
    let mut metric_name = None;
    let mut rest = Vec::with_capacity(matchers.len().saturating_sub(1));
    for m in matchers {
        if metric_name.is_none()
            && m.name == METRIC_NAME_LABEL
            && m.match_type == MatchType::Equal
        {
            metric_name = Some(m.value);
        } else {
            rest.push(m);
        }
    }
    metric_name.map(|name| (name, rest))
}
