//! The authored comment corpus.
//!
//! Built once at startup by walking the track's comment directory. Every
//! regular file becomes one entry keyed by its relative path with the
//! extension removed, so `<root>/<track>/typeA/issue.md` is looked up as
//! `typeA/issue`. The corpus is immutable afterwards and is shared by
//! reference between all jobs.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CommentsConfig;
use crate::models::{Comment, SmellId};

#[derive(Debug, Default)]
pub struct CommentCorpus {
    root: PathBuf,
    comments: HashMap<SmellId, Comment>,
}

impl CommentCorpus {
    /// Load the corpus for the configured track.
    pub fn from_config(config: &CommentsConfig) -> Result<Self> {
        let excludes = build_globset(&config.exclude_globs)?;
        Self::walk(&config.track_dir(), &excludes, config.follow_symlinks)
    }

    /// Load every regular file under `root`.
    pub fn build(root: &Path) -> Result<Self> {
        Self::walk(root, &GlobSet::empty(), false)
    }

    fn walk(root: &Path, excludes: &GlobSet, follow_links: bool) -> Result<Self> {
        if !root.is_dir() {
            bail!("Comment directory does not exist: {}", root.display());
        }

        let mut comments = HashMap::new();
        let walker = WalkDir::new(root)
            .follow_links(follow_links)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to walk comment directory {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if excludes.is_match(relative) {
                continue;
            }

            let Some(id) = SmellId::from_relative_path(relative) else {
                tracing::warn!(path = %path.display(), "skipping comment with unusable path");
                continue;
            };

            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read comment {}", path.display()))?;
            if bytes.is_empty() {
                tracing::warn!(path = %path.display(), "skipping empty comment");
                continue;
            }

            if comments.insert(id.clone(), Comment::new(bytes)).is_some() {
                tracing::warn!(
                    smell = %id,
                    path = %path.display(),
                    "duplicate comment identifier, keeping the later file"
                );
            }
        }

        tracing::debug!(root = %root.display(), comments = comments.len(), "comment corpus loaded");

        Ok(Self {
            root: root.to_path_buf(),
            comments,
        })
    }

    pub fn get(&self, id: &SmellId) -> Option<&Comment> {
        self.comments.get(id)
    }

    pub fn get_key_value(&self, id: &SmellId) -> Option<(&SmellId, &Comment)> {
        self.comments.get_key_value(id)
    }

    pub fn contains(&self, id: &SmellId) -> bool {
        self.comments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All identifiers, sorted.
    pub fn ids(&self) -> Vec<&SmellId> {
        let mut ids: Vec<&SmellId> = self.comments.keys().collect();
        ids.sort();
        ids
    }
}

impl FromIterator<(SmellId, Comment)> for CommentCorpus {
    fn from_iter<I: IntoIterator<Item = (SmellId, Comment)>>(iter: I) -> Self {
        Self {
            root: PathBuf::new(),
            comments: iter.into_iter().collect(),
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
