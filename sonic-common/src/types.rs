//! # Channel, Action and Language Types
//!
//! Core value types that appear on the wire: the channel a connection is
//! started in, the actions accepted by `TRIGGER`, the optional language tag
//! appended to `PUSH`/`QUERY`, and the record types used by bulk ingestion.
//!
//! ## Design Principles
//!
//! 1. **Closed Sets**: Channels and actions are enums, so an invalid value can
//!    only enter through `FromStr`, which rejects anything outside the set.
//! 2. **Wire Names in One Place**: `as_str` is the single source of the
//!    lowercase names written into `START` and `TRIGGER` lines.
//! 3. **Borrowed Constants**: Well-known language tags are `const` values and
//!    never allocate.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SonicError, SonicResult};

/// Connection-level mode selecting the command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Querying the index (QUERY, SUGGEST).
    Search,
    /// Altering the index (PUSH, POP, COUNT, FLUSH*).
    Ingest,
    /// Administration (TRIGGER).
    Control,
}

impl Channel {
    /// All channels accepted by the server.
    pub const ALL: [Channel; 3] = [Channel::Search, Channel::Ingest, Channel::Control];

    /// Wire name used in the `START` command.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Search => "search",
            Channel::Ingest => "ingest",
            Channel::Control => "control",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = SonicError;

    fn from_str(name: &str) -> SonicResult<Self> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == name)
            .ok_or_else(|| SonicError::invalid_argument(format!("invalid channel name: {name}")))
    }
}

/// Actions understood by the `TRIGGER` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Force the server to consolidate pending index writes.
    Consolidate,
}

impl Action {
    /// All actions accepted by `TRIGGER`.
    pub const ALL: [Action; 1] = [Action::Consolidate];

    /// Wire name used in the `TRIGGER` command.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::Consolidate => "consolidate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SonicError;

    fn from_str(name: &str) -> SonicResult<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| SonicError::invalid_argument(format!("invalid action name: {name}")))
    }
}

/// Optional language tag for `PUSH` and `QUERY`.
///
/// An empty tag means auto-detect and is never written to the wire; `none`
/// disables stop-word and stemming on the server; anything else is an
/// ISO 639-3 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lang(Cow<'static, str>);

impl Lang {
    /// Let the server detect the language (nothing appended).
    pub const AUTO_DETECT: Lang = Lang(Cow::Borrowed(""));
    /// Disable language-specific processing.
    pub const NONE: Lang = Lang(Cow::Borrowed("none"));
    pub const ARA: Lang = Lang(Cow::Borrowed("ara"));
    pub const CMN: Lang = Lang(Cow::Borrowed("cmn"));
    pub const DEU: Lang = Lang(Cow::Borrowed("deu"));
    pub const ENG: Lang = Lang(Cow::Borrowed("eng"));
    pub const FRA: Lang = Lang(Cow::Borrowed("fra"));
    pub const ITA: Lang = Lang(Cow::Borrowed("ita"));
    pub const JPN: Lang = Lang(Cow::Borrowed("jpn"));
    pub const NLD: Lang = Lang(Cow::Borrowed("nld"));
    pub const POR: Lang = Lang(Cow::Borrowed("por"));
    pub const RUS: Lang = Lang(Cow::Borrowed("rus"));
    pub const SPA: Lang = Lang(Cow::Borrowed("spa"));

    /// Builds a tag from an arbitrary locale code.
    pub fn new(tag: impl Into<String>) -> Self {
        Lang(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when no `LANG(...)` parameter should be emitted.
    pub fn is_auto_detect(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Lang {
    fn default() -> Self {
        Lang::AUTO_DETECT
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One object to push or pop during bulk ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestBulkRecord {
    pub object: String,
    pub text: String,
}

impl IngestBulkRecord {
    pub fn new(object: impl Into<String>, text: impl Into<String>) -> Self {
        IngestBulkRecord {
            object: object.into(),
            text: text.into(),
        }
    }
}

/// A failed record from bulk ingestion. Successful records produce no entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestBulkError {
    pub object: String,
    pub error: SonicError,
}
