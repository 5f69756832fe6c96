use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identity for one tracked source file.
///
/// Cheap to clone and safe to use as a map key: equality and hashing
/// delegate to the underlying path and never change for the lifetime of a
/// registry entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileKey(Arc<Path>);

impl FileKey {
	/// Creates a key for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self(Arc::from(path.into()))
	}

	/// The path behind this key.
	pub fn path(&self) -> &Path {
		&self.0
	}
}

impl fmt::Display for FileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.display().fmt(f)
	}
}
