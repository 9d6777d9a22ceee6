use crate::builder::FileTree;
use crate::node::FileNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire shape the sandbox's mount primitive accepts.
///
/// Serializes to exactly the nested record structure the runtime expects:
/// `{"file": {"contents": "..."}}` for files and
/// `{"directory": {"<name>": ...}}` for directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountNode {
    File(FileEntry),
    Directory(BTreeMap<String, MountNode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub contents: String,
}

impl MountNode {
    pub fn file(contents: impl Into<String>) -> Self {
        MountNode::File(FileEntry {
            contents: contents.into(),
        })
    }

    pub fn contents(&self) -> Option<&str> {
        match self {
            MountNode::File(entry) => Some(&entry.contents),
            MountNode::Directory(_) => None,
        }
    }
}

/// Mapping from top-level names to mount nodes
pub type MountTree = BTreeMap<String, MountNode>;

/// Project the file tree into the sandbox mount structure.
///
/// Total over a well-formed tree and recomputed wholesale on every tree
/// change; this is a pure transform with no hidden state.
pub fn project(tree: &FileTree) -> MountTree {
    project_children(tree.root())
}

fn project_children(children: &BTreeMap<String, FileNode>) -> MountTree {
    children
        .iter()
        .map(|(name, node)| (name.clone(), project_node(node)))
        .collect()
}

fn project_node(node: &FileNode) -> MountNode {
    match node {
        FileNode::File { content, .. } => MountNode::file(content.clone()),
        FileNode::Folder { children, .. } => MountNode::Directory(project_children(children)),
    }
}

/// Flatten a mount tree into `(path, contents)` pairs for every file,
/// depth-first in name order
pub fn flatten_files(tree: &MountTree) -> Vec<(String, &str)> {
    fn walk<'a>(tree: &'a MountTree, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in tree {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            match node {
                MountNode::File(entry) => out.push((path, entry.contents.as_str())),
                MountNode::Directory(children) => walk(children, &path, out),
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, "", &mut out);
    out
}

/// Overlay a single file onto an existing mount tree, creating
/// directories along the path. Last write wins, matching the sandbox's
/// own mount merge semantics.
pub fn overlay_file(tree: &mut MountTree, path: &str, contents: &str) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((leaf, ancestors)) = segments.split_last() else {
        return;
    };

    let mut current = tree;
    for segment in ancestors {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| MountNode::Directory(BTreeMap::new()));
        if !matches!(entry, MountNode::Directory(_)) {
            *entry = MountNode::Directory(BTreeMap::new());
        }
        current = match entry {
            MountNode::Directory(children) => children,
            MountNode::File(_) => unreachable!("entry was just made a directory"),
        };
    }
    current.insert(leaf.to_string(), MountNode::file(contents));
}

/// Build the minimal mount tree holding a single file at a
/// slash-delimited path, for overlay re-mounts of one corrected file
pub fn single_file_tree(path: &str, contents: &str) -> MountTree {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut node = MountNode::file(contents);
    for segment in segments.iter().skip(1).rev() {
        let mut children = BTreeMap::new();
        children.insert(segment.to_string(), node);
        node = MountNode::Directory(children);
    }
    let mut tree = MountTree::new();
    if let Some(first) = segments.first() {
        tree.insert(first.to_string(), node);
    }
    tree
}
