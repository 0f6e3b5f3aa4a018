//! Structural view of a persisted story.
//!
//! [`StoryTree`] indexes the flat record list of one story, checks the
//! global invariants (unique ids, single root, no dangling parents, no
//! cycles, no orphans, consistent branch and terminal flags) and walks the tree depth
//! first in canonical order. Siblings are ordered by `created_at`, then id.
//!
//! Violations are reported, never repaired.

use crate::scenelet::SceneletRecord;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A story tree invariant does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid scenelet record {id:?} in story {story_id:?}: {reason}")]
    InvalidRecord {
        story_id: String,
        id: String,
        reason: String,
    },

    #[error("story {story_id} has more than one scenelet with id {id}")]
    DuplicateId { story_id: String, id: String },

    #[error("story {story_id} is missing a root scenelet")]
    MissingRoot { story_id: String },

    #[error("story {story_id} has multiple roots: {}", .ids.join(", "))]
    MultipleRoots { story_id: String, ids: Vec<String> },

    #[error("parent {parent_id} referenced but missing (by scenelet {scenelet_id})")]
    MissingParent {
        scenelet_id: String,
        parent_id: String,
    },

    #[error("cycle detected at scenelet {scenelet_id}")]
    CycleDetected { scenelet_id: String },

    #[error("scenelet {scenelet_id} is reachable more than once")]
    Revisited { scenelet_id: String },

    #[error("terminal scenelet cannot have children: {scenelet_id}")]
    TerminalHasChildren { scenelet_id: String },

    #[error("branch point {scenelet_id} is missing its choice prompt")]
    BranchMissingPrompt { scenelet_id: String },

    #[error("branch point {scenelet_id} has no children")]
    BranchWithoutChildren { scenelet_id: String },

    #[error("branch point {scenelet_id} has child {child_id} without a choice label")]
    BranchChildMissingLabel {
        scenelet_id: String,
        child_id: String,
    },

    #[error(
        "scenelet {scenelet_id} is not a branch point but its child {child_id} carries a choice label"
    )]
    UnflaggedBranch {
        scenelet_id: String,
        child_id: String,
    },

    #[error("orphaned scenelets in story {story_id}: {}", .ids.join(", "))]
    Orphaned { story_id: String, ids: Vec<String> },
}

/// Indexed, root-checked view over one story's records.
#[derive(Debug)]
pub struct StoryTree<'a> {
    story_id: String,
    /// The story's records in canonical order.
    records: Vec<&'a SceneletRecord>,
    root: usize,
    /// Parent id to child positions in `records`, already in sibling order.
    children: HashMap<&'a str, Vec<usize>>,
}

/// One node reached by [`StoryTree::walk`].
pub struct Visit<'t, 'a> {
    pub record: &'a SceneletRecord,
    /// Children in canonical order.
    pub children: &'t [&'a SceneletRecord],
    tree: &'t StoryTree<'a>,
    ancestors: &'t [Frame],
}

impl<'t, 'a> Visit<'t, 'a> {
    /// Records from the root down to and including this one.
    pub fn path(&self) -> Vec<&'a SceneletRecord> {
        self.ancestors
            .iter()
            .map(|frame| self.tree.records[frame.index])
            .chain(std::iter::once(self.record))
            .collect()
    }

    /// Zero for the root.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    index: usize,
    next_child: usize,
}

impl<'a> StoryTree<'a> {
    /// Index the records of `story_id`.
    ///
    /// Records of other stories are ignored. Returns `Ok(None)` when the story
    /// has no records at all.
    pub fn build(
        story_id: &str,
        records: &'a [SceneletRecord],
    ) -> Result<Option<Self>, ValidationError> {
        let mut records: Vec<&SceneletRecord> =
            records.iter().filter(|r| r.story_id == story_id).collect();
        if records.is_empty() {
            return Ok(None);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut ids: HashSet<&str> = HashSet::with_capacity(records.len());
        for record in &records {
            check_record(record)?;
            if !ids.insert(record.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    story_id: story_id.to_string(),
                    id: record.id.clone(),
                });
            }
        }

        let roots: Vec<usize> = (0..records.len())
            .filter(|&i| records[i].is_root())
            .collect();
        let root = match roots.as_slice() {
            [] => {
                return Err(ValidationError::MissingRoot {
                    story_id: story_id.to_string(),
                })
            }
            [root] => *root,
            _ => {
                return Err(ValidationError::MultipleRoots {
                    story_id: story_id.to_string(),
                    ids: roots.iter().map(|&i| records[i].id.clone()).collect(),
                })
            }
        };

        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, &record) in records.iter().enumerate() {
            let Some(parent_id) = record.parent_id.as_deref() else {
                continue;
            };
            if !ids.contains(parent_id) {
                return Err(ValidationError::MissingParent {
                    scenelet_id: record.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
            children.entry(parent_id).or_default().push(index);
        }

        Ok(Some(Self {
            story_id: story_id.to_string(),
            records,
            root,
            children,
        }))
    }

    /// Number of records in the story.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn child_positions(&self, index: usize) -> &[usize] {
        self.children
            .get(self.records[index].id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Walk the tree depth first, checking every node.
    ///
    /// `visit` sees each node before any of its children. The walk fails on
    /// the first violated invariant; once it finishes, every record must have
    /// been reached exactly once.
    pub fn walk<F>(&self, mut visit: F) -> Result<(), ValidationError>
    where
        F: FnMut(Visit<'_, 'a>),
    {
        let mut reached = vec![false; self.records.len()];
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut frames: Vec<Frame> = Vec::new();

        self.enter(self.root, &mut frames, &mut on_path, &mut reached, &mut visit)?;

        while let Some(frame) = frames.last_mut() {
            let index = frame.index;
            match self.child_positions(index).get(frame.next_child) {
                Some(&child) => {
                    frame.next_child += 1;
                    self.enter(child, &mut frames, &mut on_path, &mut reached, &mut visit)?;
                }
                None => {
                    frames.pop();
                    on_path.remove(self.records[index].id.as_str());
                }
            }
        }

        let orphans: Vec<String> = reached
            .iter()
            .enumerate()
            .filter(|(_, reached)| !**reached)
            .map(|(i, _)| self.records[i].id.clone())
            .collect();
        if !orphans.is_empty() {
            return Err(ValidationError::Orphaned {
                story_id: self.story_id.clone(),
                ids: orphans,
            });
        }

        Ok(())
    }

    fn enter<F>(
        &self,
        index: usize,
        frames: &mut Vec<Frame>,
        on_path: &mut HashSet<&'a str>,
        reached: &mut [bool],
        visit: &mut F,
    ) -> Result<(), ValidationError>
    where
        F: FnMut(Visit<'_, 'a>),
    {
        let record = self.records[index];
        if on_path.contains(record.id.as_str()) {
            return Err(ValidationError::CycleDetected {
                scenelet_id: record.id.clone(),
            });
        }
        if reached[index] {
            return Err(ValidationError::Revisited {
                scenelet_id: record.id.clone(),
            });
        }
        reached[index] = true;

        let children: Vec<&SceneletRecord> = self
            .child_positions(index)
            .iter()
            .map(|&i| self.records[i])
            .collect();
        check_node(record, &children)?;

        visit(Visit {
            record,
            children: &children,
            tree: self,
            ancestors: frames.as_slice(),
        });

        on_path.insert(record.id.as_str());
        frames.push(Frame {
            index,
            next_child: 0,
        });
        Ok(())
    }
}

fn check_record(record: &SceneletRecord) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidRecord {
        story_id: record.story_id.clone(),
        id: record.id.clone(),
        reason: reason.to_string(),
    };

    if record.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if record.story_id.trim().is_empty() {
        return Err(invalid("story id must not be empty"));
    }
    if matches!(record.parent_id.as_deref(), Some(p) if p.trim().is_empty()) {
        return Err(invalid("parent id must be absent or non-empty"));
    }
    Ok(())
}

fn check_node(record: &SceneletRecord, children: &[&SceneletRecord]) -> Result<(), ValidationError> {
    let id = || record.id.clone();

    if record.is_terminal_node && !children.is_empty() {
        return Err(ValidationError::TerminalHasChildren { scenelet_id: id() });
    }

    if record.is_branch_point {
        if !has_text(record.choice_prompt.as_deref()) {
            return Err(ValidationError::BranchMissingPrompt { scenelet_id: id() });
        }
        if children.is_empty() {
            return Err(ValidationError::BranchWithoutChildren { scenelet_id: id() });
        }
        if let Some(child) = children
            .iter()
            .find(|c| !has_text(c.choice_label_from_parent.as_deref()))
        {
            return Err(ValidationError::BranchChildMissingLabel {
                scenelet_id: id(),
                child_id: child.id.clone(),
            });
        }
    } else if let Some(child) = children
        .iter()
        .find(|c| c.choice_label_from_parent.is_some())
    {
        // Children were created for a branch but the parent was never flagged.
        return Err(ValidationError::UnflaggedBranch {
            scenelet_id: id(),
            child_id: child.id.clone(),
        });
    }

    Ok(())
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}
