//! Injected key-value persistence for the stores.
//!
//! Documents are small (a few dozen items, a few thousand subscribers), so
//! every write is a full-document rewrite. Atomicity comes from writing a
//! temp file and renaming it over the target.

use std::path::PathBuf;

use anyhow::Context;

/// Named-document persistence boundary.
///
/// The stores read and write whole documents by name; how those documents
/// land on disk (or don't) is this trait's concern.
pub trait Storage {
    /// Read a document, `None` if it has never been written.
    fn read(&self, doc: &str) -> anyhow::Result<Option<String>>;

    /// Replace a document's contents.
    fn write(&self, doc: &str, contents: &str) -> anyhow::Result<()>;
}

/// One `<doc>.json` file per document under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, doc: &str) -> PathBuf {
        self.dir.join(format!("{doc}.json"))
    }
}

impl Storage for JsonFileStorage {
    fn read(&self, doc: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(doc);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn write(&self, doc: &str, contents: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(doc);
        let tmp = self.dir.join(format!(".{doc}.json.tmp"));
        std::fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// Shared in-memory storage for unit tests.
///
/// Clones share the same backing map, so a store "reopened" from a clone
/// sees prior writes. The write counter lets tests assert that redundant
/// persists are skipped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: std::sync::Arc<std::sync::Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    docs: std::collections::HashMap<String, String>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls observed across all clones.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    /// Raw document contents, for byte-level assertions.
    pub fn raw(&self, doc: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.docs.get(doc).cloned())
    }

    /// Seed a document directly, bypassing the stores.
    pub fn put(&self, doc: &str, contents: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.docs.insert(doc.to_string(), contents.to_string());
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self, doc: &str) -> anyhow::Result<Option<String>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?;
        Ok(inner.docs.get(doc).cloned())
    }

    fn write(&self, doc: &str, contents: &str) -> anyhow::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?;
        inner.docs.insert(doc.to_string(), contents.to_string());
        inner.writes += 1;
        Ok(())
    }
}
