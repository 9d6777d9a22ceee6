use crate::error::{TreeError, TreeResult};
use crate::node::{join_path, FileNode};
use siteforge_artifact::{ActionKind, BuildAction, BuildStep, StepStatus};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome of applying one batch of steps to the tree
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Whether any step mutated the tree
    pub changed: bool,
    /// `RunScript` actions forwarded to the orchestrator, in ascending
    /// `sequence` order relative to the full step sequence
    pub scripts: Vec<BuildAction>,
    /// `(step id, reason)` for steps rejected with a path-kind conflict
    pub conflicts: Vec<(usize, String)>,
}

/// The hierarchical, path-addressed file tree.
///
/// Exclusively owns its nodes; downstream components receive read-only
/// projections. Steps merge into the tree through [`FileTree::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    root: BTreeMap<String, FileNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level nodes, ordered by name
    pub fn root(&self) -> &BTreeMap<String, FileNode> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Look up a node by its canonical slash-delimited path
    pub fn get(&self, path: &str) -> Option<&FileNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for segment in segments {
            node = node.children()?.get(segment)?;
        }
        Some(node)
    }

    /// All file nodes, depth-first in name order
    pub fn files(&self) -> Vec<&FileNode> {
        fn collect<'a>(children: &'a BTreeMap<String, FileNode>, out: &mut Vec<&'a FileNode>) {
            for node in children.values() {
                match node {
                    FileNode::File { .. } => out.push(node),
                    FileNode::Folder { children, .. } => collect(children, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    /// Merge a batch of newly arrived steps into the tree.
    ///
    /// Steps are applied in ascending `sequence` order. Already-completed
    /// steps are no-ops, so reapplying the same batch leaves the tree
    /// unchanged. A path-kind conflict fails only the offending step; the
    /// remaining steps in the batch still apply.
    pub fn apply(&mut self, steps: &mut [BuildStep]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        let mut order: Vec<usize> = (0..steps.len()).collect();
        order.sort_by_key(|&i| steps[i].action.sequence);

        for i in order {
            let step = &mut steps[i];
            if step.status.is_terminal() {
                continue;
            }
            step.advance_to(StepStatus::InProgress);

            match self.apply_action(&step.action, &mut outcome) {
                Ok(()) => step.advance_to(StepStatus::Completed),
                Err(e) => {
                    warn!(step = step.id, error = %e, "step rejected");
                    outcome.conflicts.push((step.id, e.to_string()));
                    step.fail(e.to_string());
                }
            }
        }

        outcome
    }

    fn apply_action(&mut self, action: &BuildAction, outcome: &mut ApplyOutcome) -> TreeResult<()> {
        match action.kind {
            ActionKind::CreateFile | ActionKind::EditFile => {
                self.upsert_file(action)?;
                outcome.changed = true;
            }
            ActionKind::DeleteFile => {
                if self.delete_node(action)? {
                    outcome.changed = true;
                }
            }
            ActionKind::CreateFolder => {
                if self.ensure_folder_path(action)? {
                    outcome.changed = true;
                }
            }
            ActionKind::RunScript => {
                debug!(sequence = action.sequence, "forwarding script action");
                outcome.scripts.push(action.clone());
            }
        }
        Ok(())
    }

    /// Insert or replace a file, creating intermediate folders as needed.
    /// Last writer wins by `sequence`.
    fn upsert_file(&mut self, action: &BuildAction) -> TreeResult<()> {
        let segments = action.path_segments();
        let (leaf, ancestors) = segments.split_last().ok_or(TreeError::EmptyPath)?;

        let (children, parent_path) = descend(&mut self.root, ancestors)?;
        let path = join_path(&parent_path, leaf);

        match children.get_mut(*leaf) {
            Some(FileNode::File { content, .. }) => {
                *content = action.payload.clone();
            }
            Some(FileNode::Folder { .. }) => {
                return Err(TreeError::PathConflict {
                    path,
                    reason: "a folder already exists at this path".to_string(),
                });
            }
            None => {
                children.insert(
                    leaf.to_string(),
                    FileNode::file(leaf.to_string(), path, action.payload.clone()),
                );
            }
        }
        Ok(())
    }

    /// Remove the node at the action's path. An absent path, including one
    /// whose ancestors do not exist, is a no-op that leaves the tree
    /// untouched. Returns whether the tree changed.
    fn delete_node(&mut self, action: &BuildAction) -> TreeResult<bool> {
        let segments = action.path_segments();
        let (leaf, ancestors) = segments.split_last().ok_or(TreeError::EmptyPath)?;

        let mut children = &mut self.root;
        for segment in ancestors {
            children = match children.get_mut(*segment) {
                Some(FileNode::Folder { children, .. }) => children,
                _ => return Ok(false),
            };
        }
        Ok(children.remove(*leaf).is_some())
    }

    /// Ensure a folder exists at the action's path. Returns whether the
    /// tree changed.
    fn ensure_folder_path(&mut self, action: &BuildAction) -> TreeResult<bool> {
        let segments = action.path_segments();
        let (leaf, ancestors) = segments.split_last().ok_or(TreeError::EmptyPath)?;

        let (children, parent_path) = descend(&mut self.root, ancestors)?;
        let path = join_path(&parent_path, leaf);

        match children.get(*leaf) {
            Some(FileNode::Folder { .. }) => Ok(false),
            Some(FileNode::File { .. }) => Err(TreeError::PathConflict {
                path,
                reason: "a file already exists at this path".to_string(),
            }),
            None => {
                children.insert(leaf.to_string(), FileNode::folder(leaf.to_string(), path));
                Ok(true)
            }
        }
    }
}

/// Walk `segments` from `root`, creating a folder for every intermediate
/// segment not yet present. Returns the children map the leaf lives in and
/// the path of that parent.
fn descend<'a>(
    root: &'a mut BTreeMap<String, FileNode>,
    segments: &[&str],
) -> TreeResult<(&'a mut BTreeMap<String, FileNode>, String)> {
    let mut children = root;
    let mut parent_path = String::new();

    for segment in segments {
        let path = join_path(&parent_path, segment);
        let node = children
            .entry(segment.to_string())
            .or_insert_with(|| FileNode::folder(segment.to_string(), path.clone()));
        children = match node {
            FileNode::Folder { children, .. } => children,
            FileNode::File { .. } => {
                return Err(TreeError::PathConflict {
                    path,
                    reason: "a file occupies an intermediate path segment".to_string(),
                });
            }
        };
        parent_path = path;
    }

    Ok((children, parent_path))
}
