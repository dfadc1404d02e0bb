//! Access to shortcut files by identity.

use crate::error::{Result, TejsError};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// Last-modified state of a file. `Missing` differs from every timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStamp {
    Missing,
    Modified(DateTime<Utc>),
}

impl FileStamp {
    pub fn exists(&self) -> bool {
        matches!(self, FileStamp::Modified(_))
    }
}

pub trait StampSource {
    fn stamp(&self, identity: &str) -> FileStamp;
}

pub trait FileStore: StampSource {
    fn read(&self, identity: &str) -> Result<String>;
}

impl<T: StampSource + ?Sized> StampSource for Rc<T> {
    fn stamp(&self, identity: &str) -> FileStamp {
        (**self).stamp(identity)
    }
}

impl<T: StampSource + ?Sized> StampSource for Arc<T> {
    fn stamp(&self, identity: &str) -> FileStamp {
        (**self).stamp(identity)
    }
}

impl<T: FileStore + ?Sized> FileStore for Rc<T> {
    fn read(&self, identity: &str) -> Result<String> {
        (**self).read(identity)
    }
}

impl<T: FileStore + ?Sized> FileStore for Arc<T> {
    fn read(&self, identity: &str) -> Result<String> {
        (**self).read(identity)
    }
}

/// Shortcut files on disk. Relative identities resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, identity: &str) -> PathBuf {
        let path = Path::new(identity);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl StampSource for FsStore {
    fn stamp(&self, identity: &str) -> FileStamp {
        fs::metadata(self.resolve(identity))
            .and_then(|metadata| metadata.modified())
            .map(|modified| FileStamp::Modified(DateTime::<Utc>::from(modified)))
            .unwrap_or(FileStamp::Missing)
    }
}

impl FileStore for FsStore {
    fn read(&self, identity: &str) -> Result<String> {
        let path = self.resolve(identity);
        if !path.exists() {
            return Err(TejsError::Parse {
                identity: identity.to_string(),
                message: format!("file not found at {}", path.display()),
            });
        }
        Ok(fs::read_to_string(&path)?)
    }
}
