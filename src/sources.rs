//! Source contents and the open-document table.

use crate::{error::Result, utils};
use md5::Digest;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Content of a single source file.
///
/// The content is shared so copies into cache entries and compiler inputs
/// stay cheap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub content: Arc<String>,
}

impl Source {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: Arc::new(content.into()) }
    }

    /// Reads the file's content from disk.
    pub fn read(path: &Path) -> Result<Self> {
        Ok(Self::new(utils::read_source(path)?))
    }

    /// Returns the MD5 hash of the file's content.
    pub fn content_hash(&self) -> String {
        let mut hasher = md5::Md5::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

/// Mapping of file path to source content.
pub type Sources = BTreeMap<PathBuf, Source>;

/// An editor document the outer layer has opened, with the monotonic version
/// the editor assigned to its current contents.
#[derive(Clone, Debug)]
pub struct OpenDocument {
    pub source: Source,
    pub lsp_version: i64,
}

/// Table of open documents, keyed by absolute path.
///
/// Version keys for open documents are derived from the editor-assigned
/// version rather than the filesystem, and source text is served from here in
/// preference to disk.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: BTreeMap<PathBuf, OpenDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, path: impl Into<PathBuf>, content: impl Into<String>, version: i64) {
        let path = path.into();
        trace!(path = %path.display(), version, "open document");
        self.documents.insert(path, OpenDocument { source: Source::new(content), lsp_version: version });
    }

    pub fn close(&mut self, path: &Path) -> Option<OpenDocument> {
        trace!(path = %path.display(), "close document");
        self.documents.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&OpenDocument> {
        self.documents.get(path)
    }

    /// The editor-assigned version of the document, if it is open.
    pub fn version(&self, path: &Path) -> Option<i64> {
        self.documents.get(path).map(|doc| doc.lsp_version)
    }

    /// Returns the open-document content, falling back to reading from disk.
    pub fn content(&self, path: &Path) -> Result<Source> {
        match self.documents.get(path) {
            Some(doc) => Ok(doc.source.clone()),
            None => Source::read(path),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        let a = Source::new("int x;\n");
        let b = Source::new("int x;\n");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), Source::new("int y;\n").content_hash());
    }

    #[test]
    fn open_documents_shadow_disk() {
        let mut docs = DocumentStore::new();
        docs.open("/virtual/a.pike", "int x;", 3);
        assert_eq!(docs.version(Path::new("/virtual/a.pike")), Some(3));
        let src = docs.content(Path::new("/virtual/a.pike")).unwrap();
        assert_eq!(src.as_str(), "int x;");
        docs.close(Path::new("/virtual/a.pike"));
        assert!(docs.content(Path::new("/virtual/a.pike")).is_err());
    }
}
