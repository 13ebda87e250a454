//! Core data models that flow through a feedback job.
//!
//! A [`Submission`] is fetched from the platform, its files are sent to the
//! analysis service, the returned [`AnalysisPayload`] is flattened into
//! [`SmellId`]s and one matching [`Comment`] is published.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// One source file of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFile {
    pub filename: String,
    pub content: String,
}

/// A learner's submission as returned by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub id: String,
    pub track_id: String,
    #[serde(deserialize_with = "files_in_document_order")]
    pub files: Vec<SubmissionFile>,
}

/// Deserialize a `{filename: content}` object into a list, keeping the order
/// in which the keys appear in the document.
fn files_in_document_order<'de, D>(deserializer: D) -> Result<Vec<SubmissionFile>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FilesVisitor;

    impl<'de> Visitor<'de> for FilesVisitor {
        type Value = Vec<SubmissionFile>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object mapping file names to contents")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut files = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((filename, content)) = map.next_entry::<String, String>()? {
                files.push(SubmissionFile { filename, content });
            }
            Ok(files)
        }
    }

    deserializer.deserialize_map(FilesVisitor)
}

/// All keys matched for one smell category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Response body of `POST {host}/analyze/{track}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub results: Vec<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisPayload {
    /// The service's complaint, if any. An empty string counts as no error.
    pub fn rejection(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// A smell identifier of the form `type/key`.
///
/// Used both when flattening analysis results and as the comment corpus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SmellId(String);

impl SmellId {
    /// Join `kind` and `key` with `/`.
    ///
    /// Empty and `.` segments are dropped so the result matches the key a
    /// corpus file at the same relative path would get.
    pub fn new(kind: &str, key: &str) -> Self {
        let parts: Vec<&str> = kind
            .split('/')
            .chain(key.split('/'))
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        Self(parts.join("/"))
    }

    /// Derive an identifier from a path relative to the corpus root.
    ///
    /// The trailing extension is dropped and components are joined with `/`
    /// regardless of platform. Returns `None` for empty or non-UTF-8 paths.
    pub fn from_relative_path(relative: &Path) -> Option<Self> {
        let stripped = relative.with_extension("");
        let mut parts = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SmellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw content of an authored comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment(Vec<u8>);

impl Comment {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}
