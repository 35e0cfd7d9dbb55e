//! The display record handed to the page template and the pure helpers that
//! format its values.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::DateTime;
use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

pub const US_IP: &str = "US_IP";
pub const US_REGDATE: &str = "US_REGDATE";
pub const US_ID: &str = "US_ID";
pub const US_POSTS: &str = "US_POSTS";
pub const U_US_POSTS: &str = "U_US_POSTS";
pub const US_RTITLE: &str = "US_RTITLE";
pub const US_TOPICS: &str = "US_TOPICS";
pub const U_US_TOPICS: &str = "U_US_TOPICS";
/// Set on 3.1 boards, whose templates need the older markup.
pub const S_IS_31: &str = "S_IS_31";

/// Flat field → value mapping for one page render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayRecord(BTreeMap<&'static str, String>);

impl DisplayRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }
}

/// Receives template variables; the host interpolates them into the page.
pub trait TemplateSink: Send + Sync {
    fn assign_vars(&self, vars: DisplayRecord);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateFormatError {
    #[error("invalid date format pattern `{pattern}`")]
    InvalidPattern { pattern: String },
    #[error("timestamp {0} is out of range")]
    OutOfRange(i64),
}

/// Format a unix timestamp in `timezone` using a strftime `pattern`.
pub fn format_user_date(
    timestamp: i64,
    timezone: Tz,
    pattern: &str,
) -> Result<String, DateFormatError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(DateFormatError::InvalidPattern {
            pattern: pattern.to_string(),
        });
    }

    let utc = DateTime::from_timestamp(timestamp, 0).ok_or(DateFormatError::OutOfRange(timestamp))?;
    Ok(utc
        .with_timezone(&timezone)
        .format_with_items(items.iter())
        .to_string())
}

/// Release of the host board, `major.minor` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BoardVersion {
    major: u16,
    minor: u16,
}

impl BoardVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_31(self) -> bool {
        self < Self::new(3, 2)
    }
}

impl Default for BoardVersion {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid board version `{0}`")]
pub struct BoardVersionError(String);

impl FromStr for BoardVersion {
    type Err = BoardVersionError;

    // Accepts release strings such as `3.1.12` or `3.2.0-RC1`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || BoardVersionError(value.to_string());
        let mut parts = value.trim().split('.');

        let mut component = || -> Option<u16> {
            let part = parts.next()?;
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        };

        let major = component().ok_or_else(invalid)?;
        let minor = component().ok_or_else(invalid)?;
        Ok(Self::new(major, minor))
    }
}

/// Builds the "your posts" and "your topics" search links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLinks {
    root_path: String,
    php_ext: String,
}

impl SearchLinks {
    pub fn new(root_path: impl Into<String>, php_ext: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            php_ext: php_ext.into(),
        }
    }

    fn search_script(&self) -> String {
        format!("{}search.{}", self.root_path, self.php_ext)
    }

    pub fn own_posts(&self) -> String {
        format!("{}?search_id=egosearch", self.search_script())
    }

    // The ampersand is pre-escaped because the value is interpolated into HTML.
    pub fn own_topics(&self) -> String {
        format!("{}?search_id=egosearch&amp;sr=posts", self.search_script())
    }
}

impl Default for SearchLinks {
    fn default() -> Self {
        Self::new("./", "php")
    }
}
