//! Virtual filesystem exposed by a slicing engine.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from virtual filesystem operations.
#[derive(Error, Debug)]
pub enum FsError {
    /// Path does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A directory was expected.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file was expected.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Backing storage error.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Virtual path of the failed operation.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Result type for filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Minimal filesystem interface of an engine instance.
///
/// Relative paths resolve against the root directory.
pub trait VirtualFs {
    /// Create a directory. The parent must exist.
    fn mkdir(&mut self, path: &str) -> FsResult<()>;
    /// Create or replace a file. The parent must exist.
    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()>;
    /// Read a whole file.
    fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;
    /// Remove a file.
    fn unlink(&mut self, path: &str) -> FsResult<()>;
    /// Remove an empty directory.
    fn rmdir(&mut self, path: &str) -> FsResult<()>;
    /// Names of the entries directly inside a directory, sorted.
    fn read_dir(&self, path: &str) -> FsResult<Vec<String>>;
}

/// Remove `path` and everything below it.
///
/// Returns the number of entries removed, the directory itself included.
pub fn remove_tree(fs: &mut dyn VirtualFs, path: &str) -> FsResult<usize> {
    let dir = normalize(path);
    let mut removed = 0;
    for name in fs.read_dir(&dir)? {
        let child = format!("{}/{}", dir.trim_end_matches('/'), name);
        match fs.unlink(&child) {
            Ok(()) => removed += 1,
            Err(FsError::IsADirectory(_)) => removed += remove_tree(fs, &child)?,
            Err(e) => return Err(e),
        }
    }
    fs.rmdir(&dir)?;
    Ok(removed + 1)
}

/// Normalize a virtual path to an absolute, `/`-separated form.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory [`VirtualFs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFs {
    nodes: BTreeMap<String, Node>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self { nodes }
    }

    /// All paths with a flag telling whether each is a directory.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.nodes
            .iter()
            .map(|(path, node)| (path.clone(), matches!(node, Node::Dir)))
            .collect()
    }

    /// Whether `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(&normalize(path))
    }

    /// Number of files (excluding directories).
    pub fn file_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n, Node::File(_)))
            .count()
    }

    fn require_parent_dir(&self, path: &str) -> FsResult<()> {
        let parent = parent_of(path);
        match self.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(FsError::NotADirectory(parent.to_string())),
            None => Err(FsError::NotFound(parent.to_string())),
        }
    }

    fn has_children(&self, dir: &str) -> bool {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .any(|(p, _)| p != dir)
    }
}

impl VirtualFs for MemoryFs {
    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        if self.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        self.require_parent_dir(&path)?;
        self.nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let path = normalize(path);
        if let Some(Node::Dir) = self.nodes.get(&path) {
            return Err(FsError::IsADirectory(path));
        }
        self.require_parent_dir(&path)?;
        self.nodes.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize(path);
        match self.nodes.get(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        match self.nodes.get(&path) {
            Some(Node::File(_)) => {
                self.nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        match self.nodes.get(&path) {
            Some(Node::Dir) if path == "/" => Err(FsError::DirectoryNotEmpty(path)),
            Some(Node::Dir) => {
                if self.has_children(&path) {
                    return Err(FsError::DirectoryNotEmpty(path));
                }
                self.nodes.remove(&path);
                Ok(())
            }
            Some(Node::File(_)) => Err(FsError::NotADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize(path);
        match self.nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory(path)),
            None => return Err(FsError::NotFound(path)),
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        Ok(self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, _)| p.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Model.stl"), "/Model.stl");
        assert_eq!(normalize("/definitions/"), "/definitions");
        assert_eq!(normalize("definitions/./a/../printer.def.json"), "/definitions/printer.def.json");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_file_lifecycle() {
        let mut fs = MemoryFs::new();
        fs.write_file("Model.stl", b"abc").unwrap();
        assert_eq!(fs.read_file("/Model.stl").unwrap(), b"abc");
        fs.unlink("Model.stl").unwrap();
        assert!(matches!(fs.read_file("Model.stl"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_directory_rules() {
        let mut fs = MemoryFs::new();
        assert!(matches!(
            fs.write_file("/definitions/a.json", b"{}"),
            Err(FsError::NotFound(_))
        ));

        fs.mkdir("/definitions").unwrap();
        assert!(matches!(fs.mkdir("/definitions"), Err(FsError::AlreadyExists(_))));

        fs.write_file("/definitions/a.json", b"{}").unwrap();
        assert!(matches!(
            fs.rmdir("/definitions"),
            Err(FsError::DirectoryNotEmpty(_))
        ));
        assert!(matches!(fs.unlink("/definitions"), Err(FsError::IsADirectory(_))));

        fs.unlink("/definitions/a.json").unwrap();
        fs.rmdir("/definitions").unwrap();
        assert_eq!(fs, MemoryFs::new());
    }

    #[test]
    fn test_read_dir_lists_direct_children() {
        let mut fs = MemoryFs::new();
        fs.mkdir("/definitions").unwrap();
        fs.mkdir("/definitions/nested").unwrap();
        fs.write_file("/definitions/b.json", b"{}").unwrap();
        fs.write_file("/definitions/nested/a.json", b"{}").unwrap();
        fs.write_file("/Model.stl", b"").unwrap();

        assert_eq!(fs.read_dir("/definitions").unwrap(), vec!["b.json", "nested"]);
        assert_eq!(fs.read_dir("/").unwrap(), vec!["Model.stl", "definitions"]);
        assert!(matches!(fs.read_dir("/Model.stl"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.read_dir("/missing"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_remove_tree() {
        let mut fs = MemoryFs::new();
        fs.mkdir("/definitions").unwrap();
        fs.mkdir("/definitions/nested").unwrap();
        fs.write_file("/definitions/b.json", b"{}").unwrap();
        fs.write_file("/definitions/nested/a.json", b"{}").unwrap();
        fs.write_file("/Model.stl", b"").unwrap();

        assert_eq!(remove_tree(&mut fs, "/definitions").unwrap(), 4);
        assert!(!fs.exists("/definitions"));
        assert!(fs.exists("/Model.stl"));
    }

    #[test]
    fn test_sibling_prefix_is_not_a_child() {
        let mut fs = MemoryFs::new();
        fs.mkdir("/defs").unwrap();
        fs.write_file("/defs2", b"x").unwrap();
        fs.rmdir("/defs").unwrap();
        assert!(fs.exists("/defs2"));
    }
}
