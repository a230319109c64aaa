//! Staged file access
//!
//! Nothing touches the disk until [`Workspace::flush`]. Every path is read at
//! most once; later reads and edits go to the staged copy, so several
//! resources sharing one declaration document all edit the same value.
//! A dirty document left without entries is deleted on flush instead of
//! being written. A document that still equals what was parsed from disk is
//! never rewritten, so reading one keeps its comments and layout.

use meshcut_document::{DocumentError, StructuredDocument};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum Staged {
    Document(StructuredDocument),
    Text(String),
    Bytes(Vec<u8>),
    Deleted,
}

/// In-memory overlay over the file system, keyed by absolute path
#[derive(Debug, Default)]
pub struct Workspace {
    staged: BTreeMap<PathBuf, Staged>,
    dirty: BTreeSet<PathBuf>,
    /// Documents as parsed from disk, for paths not yet overwritten
    pristine: BTreeMap<PathBuf, StructuredDocument>,
}

/// sha256 hex digest of file content
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn io_error(path: &Path, error: std::io::Error) -> StorageError {
    StorageError::IoError(path.display().to_string(), error.to_string())
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, path: &Path) -> Result<&mut Staged, StorageError> {
        if !self.staged.contains_key(path) {
            let staged = match std::fs::read(path) {
                Ok(bytes) => Staged::Bytes(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Staged::Deleted,
                Err(e) => return Err(io_error(path, e)),
            };
            self.staged.insert(path.to_path_buf(), staged);
        }

        self.staged
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound(path.display().to_string()))
    }

    /// Whether `path` exists once staged edits are applied
    pub fn exists(&self, path: &Path) -> bool {
        match self.staged.get(path) {
            Some(Staged::Deleted) => false,
            Some(_) => true,
            None => path.exists(),
        }
    }

    fn ensure_document(&mut self, path: &Path) -> Result<(), StorageError> {
        let on_disk = !self.dirty.contains(path);
        let staged = self.load(path)?;

        let document = match staged {
            Staged::Document(_) => return Ok(()),
            Staged::Deleted => {
                tracing::debug!(path = %path.display(), "no declaration document yet, starting empty");
                StructuredDocument::new()
            }
            Staged::Text(text) => parse_document(path, text)?,
            Staged::Bytes(bytes) => parse_document(path, &String::from_utf8_lossy(bytes))?,
        };
        if on_disk {
            self.pristine.insert(path.to_path_buf(), document.clone());
        }
        self.staged.insert(path.to_path_buf(), Staged::Document(document));
        Ok(())
    }

    /// Declaration document at `path`, without staging it for editing
    pub fn document(&mut self, path: &Path) -> Result<&StructuredDocument, StorageError> {
        self.ensure_document(path)?;
        match self.staged.get(path) {
            Some(Staged::Document(document)) => Ok(document),
            _ => Err(StorageError::NotFound(path.display().to_string())),
        }
    }

    /// Declaration document at `path`, staged for editing
    ///
    /// A missing file yields an empty document. The document is only written
    /// back if it ends up different from what was read.
    pub fn document_mut(&mut self, path: &Path) -> Result<&mut StructuredDocument, StorageError> {
        self.ensure_document(path)?;
        self.dirty.insert(path.to_path_buf());

        match self.staged.get_mut(path) {
            Some(Staged::Document(document)) => Ok(document),
            _ => Err(StorageError::NotFound(path.display().to_string())),
        }
    }

    fn is_unchanged(&self, path: &Path) -> bool {
        match (self.staged.get(path), self.pristine.get(path)) {
            (Some(Staged::Document(document)), Some(original)) => document == original,
            _ => false,
        }
    }

    /// Raw content at `path`
    pub fn read_bytes(&mut self, path: &Path) -> Result<Vec<u8>, StorageError> {
        match self.load(path)? {
            Staged::Bytes(bytes) => Ok(bytes.clone()),
            Staged::Text(text) => Ok(text.clone().into_bytes()),
            Staged::Document(document) => document
                .to_yaml()
                .map(String::into_bytes)
                .map_err(|e| StorageError::DocumentError(path.display().to_string(), e)),
            Staged::Deleted => Err(StorageError::NotFound(path.display().to_string())),
        }
    }

    pub fn read_text(&mut self, path: &Path) -> Result<String, StorageError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|e| {
            StorageError::IoError(path.display().to_string(), e.to_string())
        })
    }

    pub fn write_text(&mut self, path: &Path, text: String) {
        self.stage(path, Staged::Text(text));
    }

    pub fn write_bytes(&mut self, path: &Path, bytes: Vec<u8>) {
        self.stage(path, Staged::Bytes(bytes));
    }

    /// Stage a whole document, replacing whatever was at `path`
    pub fn write_document(&mut self, path: &Path, document: StructuredDocument) {
        self.stage(path, Staged::Document(document));
    }

    pub fn delete(&mut self, path: &Path) {
        self.stage(path, Staged::Deleted);
    }

    fn stage(&mut self, path: &Path, staged: Staged) {
        self.pristine.remove(path);
        self.staged.insert(path.to_path_buf(), staged);
        self.dirty.insert(path.to_path_buf());
    }

    /// Copy `from` to `to`, returning the content fingerprint
    pub fn copy(&mut self, from: &Path, to: &Path) -> Result<String, StorageError> {
        let bytes = self.read_bytes(from)?;
        let digest = fingerprint(&bytes);
        self.write_bytes(to, bytes);
        Ok(digest)
    }

    /// Move `from` to `to`, returning the content fingerprint
    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<String, StorageError> {
        let digest = self.copy(from, to)?;
        if from != to {
            self.delete(from);
        }
        Ok(digest)
    }

    /// Paths the next flush will write or delete
    pub fn pending(&self) -> Vec<PathBuf> {
        self.dirty
            .iter()
            .filter(|path| self.will_change(path))
            .cloned()
            .collect()
    }

    /// Staged documents that will be deleted because their last entry left
    pub fn emptied_documents(&self) -> Vec<PathBuf> {
        self.dirty
            .iter()
            .filter(|path| {
                matches!(self.staged.get(*path), Some(Staged::Document(d)) if d.is_empty())
                    && !self.is_unchanged(path)
                    && path.exists()
            })
            .cloned()
            .collect()
    }

    fn will_change(&self, path: &Path) -> bool {
        if self.is_unchanged(path) {
            return false;
        }
        match self.staged.get(path) {
            Some(Staged::Deleted) => path.exists(),
            Some(Staged::Document(document)) if document.is_empty() => path.exists(),
            Some(_) => true,
            None => false,
        }
    }

    /// Write every staged change to disk
    pub fn flush(&mut self) -> Result<usize, StorageError> {
        let mut written = 0;

        for path in std::mem::take(&mut self.dirty) {
            if self.is_unchanged(&path) {
                continue;
            }
            let Some(staged) = self.staged.get(&path) else {
                continue;
            };

            let content = match staged {
                Staged::Deleted => None,
                Staged::Document(document) if document.is_empty() => None,
                Staged::Document(document) => Some(
                    document
                        .to_yaml()
                        .map(String::into_bytes)
                        .map_err(|e| StorageError::DocumentError(path.display().to_string(), e))?,
                ),
                Staged::Text(text) => Some(text.clone().into_bytes()),
                Staged::Bytes(bytes) => Some(bytes.clone()),
            };

            match content {
                Some(content) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
                    }
                    std::fs::write(&path, content).map_err(|e| io_error(&path, e))?;
                    tracing::debug!(path = %path.display(), "wrote file");
                    written += 1;
                }
                None if path.exists() => {
                    std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
                    tracing::debug!(path = %path.display(), "removed file");
                    written += 1;
                }
                None => {}
            }
        }

        Ok(written)
    }
}

fn parse_document(path: &Path, text: &str) -> Result<StructuredDocument, StorageError> {
    StructuredDocument::from_yaml(text)
        .map_err(|e| StorageError::DocumentError(path.display().to_string(), e))
}

/// Project-relative file operations over a read root and a write root
///
/// Reads resolve against `read_root`, writes against `write_root`. For
/// single-project commands both roots are the same directory.
#[derive(Debug)]
pub struct FileManager {
    read_root: PathBuf,
    write_root: PathBuf,
    workspace: Workspace,
}

impl FileManager {
    pub fn new(read_root: impl Into<PathBuf>, write_root: impl Into<PathBuf>) -> Self {
        Self {
            read_root: read_root.into(),
            write_root: write_root.into(),
            workspace: Workspace::new(),
        }
    }

    /// Both roots at one project
    pub fn in_place(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.clone(), root)
    }

    pub fn read_root(&self) -> &Path {
        &self.read_root
    }

    pub fn write_root(&self) -> &Path {
        &self.write_root
    }

    /// Exchange the read and write roots
    pub fn swap_roots(&mut self) {
        std::mem::swap(&mut self.read_root, &mut self.write_root);
    }

    pub fn source_path(&self, relative: &Path) -> PathBuf {
        self.read_root.join(relative)
    }

    pub fn target_path(&self, relative: &Path) -> PathBuf {
        self.write_root.join(relative)
    }

    /// Document under the read root
    pub fn read_document(&mut self, relative: &Path) -> Result<&mut StructuredDocument, StorageError> {
        let path = self.source_path(relative);
        self.workspace.document_mut(&path)
    }

    /// Document under the read root, for lookups only
    pub fn view_document(&mut self, relative: &Path) -> Result<&StructuredDocument, StorageError> {
        let path = self.source_path(relative);
        self.workspace.document(&path)
    }

    /// Document under the write root
    pub fn target_document(&mut self, relative: &Path) -> Result<&mut StructuredDocument, StorageError> {
        let path = self.target_path(relative);
        self.workspace.document_mut(&path)
    }

    pub fn read_text(&mut self, relative: &Path) -> Result<String, StorageError> {
        let path = self.source_path(relative);
        self.workspace.read_text(&path)
    }

    /// Overwrite a file under the read root (in-place edits such as reference rewrites)
    pub fn update_text(&mut self, relative: &Path, text: String) {
        let path = self.source_path(relative);
        self.workspace.write_text(&path, text);
    }

    pub fn write_text(&mut self, relative: &Path, text: String) {
        let path = self.target_path(relative);
        self.workspace.write_text(&path, text);
    }

    pub fn write_document(&mut self, relative: &Path, document: StructuredDocument) {
        let path = self.target_path(relative);
        self.workspace.write_document(&path, document);
    }

    pub fn source_exists(&self, relative: &Path) -> bool {
        self.workspace.exists(&self.source_path(relative))
    }

    /// Copy from the read root to the same relative path under the write root
    pub fn copy(&mut self, relative: &Path) -> Result<String, StorageError> {
        let (from, to) = (self.source_path(relative), self.target_path(relative));
        self.workspace.copy(&from, &to)
    }

    /// Move from the read root to the same relative path under the write root
    pub fn move_file(&mut self, relative: &Path) -> Result<String, StorageError> {
        let (from, to) = (self.source_path(relative), self.target_path(relative));
        self.workspace.rename(&from, &to)
    }

    /// Rename within the read root
    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<String, StorageError> {
        let (from, to) = (self.source_path(from), self.source_path(to));
        self.workspace.rename(&from, &to)
    }

    pub fn delete(&mut self, relative: &Path) {
        let path = self.source_path(relative);
        self.workspace.delete(&path);
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn flush(&mut self) -> Result<usize, StorageError> {
        self.workspace.flush()
    }
}

/// File access errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to access {0}: {1}")]
    IoError(String, String),

    #[error("Invalid declaration document {0}: {1}")]
    DocumentError(String, #[source] DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Mapping;

    #[test]
    fn missing_document_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::new();

        let document = workspace.document_mut(&dir.path().join("models/_models.yml")).unwrap();
        assert!(document.is_empty());
        assert!(workspace.pending().is_empty());
    }

    #[test]
    fn edits_accumulate_on_one_staged_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_models.yml");
        std::fs::write(&path, "version: 2\nmodels:\n  - name: a\n").unwrap();

        let mut workspace = Workspace::new();
        let mut entry = Mapping::new();
        entry.insert("name".into(), "b".into());
        workspace.document_mut(&path).unwrap().set_entry("models", entry).unwrap();

        // The file changing underneath does not matter once staged
        std::fs::write(&path, "version: 2\n").unwrap();
        let document = workspace.document_mut(&path).unwrap();
        assert_eq!(document.entry_names("models"), vec!["a", "b"]);

        workspace.flush().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("name: a") && written.contains("name: b"));
    }

    #[test]
    fn untouched_documents_keep_their_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_macros.yml");
        let original = "version: 2\n\n# shared helpers\nmacros:\n    - name: cents_to_dollars   # keep\n";
        std::fs::write(&path, original).unwrap();

        let mut workspace = Workspace::new();
        assert!(workspace.document(&path).unwrap().entry("macros", "cents_to_dollars").is_some());
        // Mutable access without an edit, and an edit that is undone
        let document = workspace.document_mut(&path).unwrap();
        let entry = document.remove_entry("macros", "cents_to_dollars").unwrap();
        document.set_entry("macros", entry).unwrap();

        assert!(workspace.pending().is_empty());
        assert!(workspace.emptied_documents().is_empty());
        assert_eq!(workspace.flush().unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn document_over_staged_bytes_is_still_written() {
        let parent = tempfile::tempdir().unwrap();
        let child = tempfile::tempdir().unwrap();
        std::fs::write(parent.path().join("_models.yml"), "models:\n  - name: a\n").unwrap();

        let mut files = FileManager::new(parent.path(), child.path());
        files.copy(Path::new("_models.yml")).unwrap();
        files.target_document(Path::new("_models.yml")).unwrap();

        assert_eq!(files.workspace().pending(), vec![child.path().join("_models.yml")]);
        files.flush().unwrap();
        assert!(child.path().join("_models.yml").exists());
    }

    #[test]
    fn emptied_document_is_deleted_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_models.yml");
        std::fs::write(&path, "models:\n  - name: a\n").unwrap();

        let mut workspace = Workspace::new();
        workspace.document_mut(&path).unwrap().remove_entry("models", "a");

        assert_eq!(workspace.emptied_documents(), vec![path.clone()]);
        workspace.flush().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn move_between_roots_is_staged_until_flush() {
        let parent = tempfile::tempdir().unwrap();
        let child = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(parent.path().join("models")).unwrap();
        std::fs::write(parent.path().join("models/orders.sql"), "select 1").unwrap();

        let mut files = FileManager::new(parent.path(), child.path());
        let digest = files.move_file(Path::new("models/orders.sql")).unwrap();

        assert_eq!(digest, fingerprint(b"select 1"));
        assert!(!files.source_exists(Path::new("models/orders.sql")));
        assert!(parent.path().join("models/orders.sql").exists());

        files.flush().unwrap();
        assert!(!parent.path().join("models/orders.sql").exists());
        assert_eq!(
            std::fs::read_to_string(child.path().join("models/orders.sql")).unwrap(),
            "select 1"
        );
    }

    #[test]
    fn reading_a_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileManager::in_place(dir.path());
        assert!(matches!(
            files.read_text(Path::new("nope.sql")),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn swapping_roots() {
        let mut files = FileManager::new("/a", "/b");
        files.swap_roots();
        assert_eq!(files.read_root(), Path::new("/b"));
        assert_eq!(files.write_root(), Path::new("/a"));
    }
}
