//! Contest document model.
//!
//! The [`Contest`] is the root aggregate handed to every other component:
//! the persistence layer stores it, the history log snapshots it, and the
//! compiler host serializes it into Typst source.
//!
//! ```text
//! Contest
//! ├── meta       (title, author, layout toggles, ...)
//! ├── problems   (ordered - position decides the letter A, B, C, ...)
//! ├── images     ({uuid, name} - bytes live in the blob store)
//! └── template?  (full override of the library template)
//! ```

pub mod assets;
mod example;
mod store;

pub use example::example_contest;
pub use store::{DocumentSnapshot, DocumentStore, ImageBlobs};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Contest-wide metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestMeta {
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub date: String,
    pub language: String,
    /// Render a title page before the first problem.
    pub enable_titlepage: bool,
    /// Render running header and footer on every page.
    pub enable_header_footer: bool,
    /// Render the problem overview table on the title page.
    pub enable_problem_list: bool,
    /// Language override for the title page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titlepage_language: Option<String>,
    /// Language override for problem pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_language: Option<String>,
}

impl Default for ContestMeta {
    fn default() -> Self {
        Self {
            title: "Untitled Contest".to_string(),
            subtitle: String::new(),
            author: String::new(),
            date: String::new(),
            language: "en".to_string(),
            enable_titlepage: true,
            enable_header_footer: true,
            enable_problem_list: true,
            titlepage_language: None,
            problem_language: None,
        }
    }
}

/// Markup language of a problem statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFormat {
    #[default]
    Latex,
    Markdown,
    Typst,
}

impl StatementFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latex => "latex",
            Self::Markdown => "markdown",
            Self::Typst => "typst",
        }
    }
}

/// One sample test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub input: String,
    pub output: String,
}

/// Display metadata of a problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemMeta {
    pub display_name: String,
    pub format: StatementFormat,
    pub samples: Vec<Sample>,
}

/// Statement text in the problem's declared format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statement {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One contest task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Client-side identity, stable across reorders. Never compiled.
    #[serde(default = "new_key")]
    pub key: String,
    pub problem: ProblemMeta,
    pub statement: Statement,
}

impl Problem {
    /// Create a problem with a fresh key.
    pub fn new(display_name: impl Into<String>, format: StatementFormat) -> Self {
        Self {
            key: new_key(),
            problem: ProblemMeta {
                display_name: display_name.into(),
                format,
                samples: Vec::new(),
            },
            statement: Statement::default(),
        }
    }
}

/// Generate a fresh client key.
pub fn new_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Persisted image metadata; the bytes live in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub uuid: String,
    pub name: String,
}

/// Live image: metadata plus a shared handle to the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub uuid: String,
    pub name: String,
    pub bytes: Arc<[u8]>,
}

/// Root document aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    #[serde(default)]
    pub meta: ContestMeta,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub images: Vec<ImageMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Contest {
    /// Copy of this contest holding only the problem at `index`.
    ///
    /// Used for single-problem previews; meta, images and template are kept.
    pub fn single_problem(&self, index: usize) -> Option<Self> {
        let problem = self.problems.get(index)?.clone();
        Some(Self {
            meta: self.meta.clone(),
            problems: vec![problem],
            images: self.images.clone(),
            template: self.template.clone(),
        })
    }

    /// Index of the problem with `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.problems.iter().position(|p| p.key == key)
    }

    /// Index of the problem displayed with `letter`.
    pub fn index_of_letter(&self, letter: &str) -> Option<usize> {
        let index = letter_index(letter)?;
        (index < self.problems.len()).then_some(index)
    }
}

/// Display letter for a problem position: A..Z, then AA, AB, ...
pub fn problem_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Inverse of [`problem_letter`]; case-insensitive.
pub fn letter_index(letter: &str) -> Option<usize> {
    if letter.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for ch in letter.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}
