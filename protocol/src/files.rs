use serde::{Deserialize, Serialize};

/// A named blob shipped to workers as part of a work order.
///
/// The server side shares these as `Arc<File>` so a blob that appears in many
/// work orders (script files, the ensemble payload snapshot) is held in
/// memory once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Directory of the file relative to the version root; empty for files
    /// living in the root itself.
    pub relative_dir: String,
    pub name: String,
    pub data: Vec<u8>,
}

impl File {
    /// Creates a file placed in the version root.
    pub fn in_root(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            relative_dir: String::new(),
            name: name.into(),
            data,
        }
    }
}
