use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a document job.
///
/// Used only to attribute statistics and log lines, never to make scheduling
/// decisions. Surrounding whitespace is trimmed so that the same document
/// submitted twice maps to the same limiter.
///
/// # Examples
///
/// ```
/// use quotaflow_lib::DocumentId;
///
/// let id = DocumentId::from("  lecture-03.pdf ");
/// assert_eq!(id.as_str(), "lecture-03.pdf");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the identifier as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Label used to tag a single page-call of this document in logs
    #[must_use]
    pub fn page_label(&self, page: usize) -> String {
        format!("{}#{page}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            DocumentId(id)
        } else {
            DocumentId(trimmed.to_string())
        }
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId(id.trim().to_string())
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}
