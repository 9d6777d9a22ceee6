use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of the path-addressed file tree.
///
/// Within one folder, `name` is unique by construction; `path` is the
/// canonical slash-join of ancestor names and is never duplicated across
/// the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileNode {
    File {
        name: String,
        path: String,
        content: String,
    },
    Folder {
        name: String,
        path: String,
        children: BTreeMap<String, FileNode>,
    },
}

impl FileNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        FileNode::File {
            name: name.into(),
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        FileNode::Folder {
            name: name.into(),
            path: path.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileNode::File { name, .. } | FileNode::Folder { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FileNode::File { path, .. } | FileNode::Folder { path, .. } => path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FileNode::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, FileNode::Folder { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            FileNode::File { content, .. } => Some(content),
            FileNode::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, FileNode>> {
        match self {
            FileNode::Folder { children, .. } => Some(children),
            FileNode::File { .. } => None,
        }
    }
}

/// Join a parent path and a child name into the canonical node path
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_wire_shape_is_type_tagged() {
        let node = FileNode::file("App.tsx", "src/App.tsx", "code");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["path"], "src/App.tsx");

        let node = FileNode::folder("src", "src");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "folder");
    }

    #[test]
    fn join_path_skips_empty_parent() {
        assert_eq!(join_path("", "src"), "src");
        assert_eq!(join_path("src", "App.tsx"), "src/App.tsx");
    }
}
