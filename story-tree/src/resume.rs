//! Resume planning.
//!
//! Rebuilds the frontier of unfinished generation work from a persisted
//! story. Content is never re-derived: every open leaf (a scenelet with no
//! children that is neither a branch point nor terminal) becomes one
//! [`GenerationTask`] carrying its path from the root.

use crate::scenelet::{GenerationTask, SceneletRecord};
use crate::tree::{StoryTree, ValidationError};
use serde::{Deserialize, Serialize};

/// Outstanding work for a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumePlan {
    /// Open leaves in canonical depth-first order.
    pub pending_tasks: Vec<GenerationTask>,
}

impl ResumePlan {
    /// Whether every path in the story has concluded.
    pub fn is_complete(&self) -> bool {
        self.pending_tasks.is_empty()
    }
}

/// Plan the remaining generation work for `story_id`.
///
/// `records` may contain other stories; they are ignored. A story with no
/// records yields an empty plan. Any structural problem fails the whole plan.
pub fn plan_resume(story_id: &str, records: &[SceneletRecord]) -> Result<ResumePlan, ValidationError> {
    let Some(tree) = StoryTree::build(story_id, records)? else {
        return Ok(ResumePlan::default());
    };

    let mut pending_tasks = Vec::new();
    tree.walk(|visit| {
        let record = visit.record;
        let open = visit.children.is_empty() && !record.is_branch_point && !record.is_terminal_node;
        if open {
            pending_tasks.push(GenerationTask {
                story_id: story_id.to_string(),
                parent_scenelet_id: Some(record.id.clone()),
                path_context: visit.path().into_iter().map(|r| r.content.clone()).collect(),
            });
        }
    })?;

    Ok(ResumePlan { pending_tasks })
}
