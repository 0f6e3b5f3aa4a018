//! Canonical snapshot of a story tree.
//!
//! The snapshot is the depth-first listing of a validated story that other
//! pipeline stages paste into their prompts. Its text form is treated as a
//! byte-stable artifact: field order and formatting are fixed, and empty
//! collections are written out as `[]` rather than dropped.

use crate::scenelet::{DialogueLine, SceneletRecord};
use crate::tree::{StoryTree, ValidationError};
use serde::{Deserialize, Serialize};

/// Structural role of a scenelet. Linear scenelets carry no role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneletRole {
    Root,
    Branch,
    Terminal,
}

impl SceneletRole {
    fn of(record: &SceneletRecord) -> Option<Self> {
        if record.is_root() {
            Some(SceneletRole::Root)
        } else if record.is_branch_point {
            Some(SceneletRole::Branch)
        } else if record.is_terminal_node {
            Some(SceneletRole::Terminal)
        } else {
            None
        }
    }
}

/// Normalized view of one scenelet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneletDigest {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<SceneletRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_label: Option<String>,
    pub description: String,
    pub dialogue: Vec<DialogueLine>,
    pub shot_suggestions: Vec<String>,
}

impl SceneletDigest {
    fn from_record(record: &SceneletRecord) -> Self {
        Self {
            id: record.id.clone(),
            parent_id: record.parent_id.clone(),
            role: SceneletRole::of(record),
            choice_label: record.choice_label_from_parent.clone(),
            description: record.content.description.clone(),
            dialogue: record.content.dialogue.clone(),
            shot_suggestions: record.content.shot_suggestions.clone(),
        }
    }
}

/// One option offered at a branch point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchChoice {
    pub label: String,
    pub leads_to_id: String,
}

/// The choice offered by a branch point, listed right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchingPointDigest {
    pub source_scenelet_id: String,
    pub choice_prompt: String,
    pub choices: Vec<BranchChoice>,
}

/// An entry in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SnapshotEntry {
    Scenelet(SceneletDigest),
    BranchingPoint(BranchingPointDigest),
}

/// Depth-first listing of a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySnapshot {
    pub story_id: String,
    pub entries: Vec<SnapshotEntry>,
}

impl StorySnapshot {
    /// Render the entries as pretty-printed JSON with two-space indentation.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }

    /// The scenelet digests, in order.
    pub fn scenelets(&self) -> impl Iterator<Item = &SceneletDigest> {
        self.entries.iter().filter_map(|entry| match entry {
            SnapshotEntry::Scenelet(digest) => Some(digest),
            SnapshotEntry::BranchingPoint(_) => None,
        })
    }
}

/// Build the snapshot of `story_id`.
///
/// The story must be structurally valid; a story with no records has no
/// root and is rejected.
pub fn assemble_snapshot(
    story_id: &str,
    records: &[SceneletRecord],
) -> Result<StorySnapshot, ValidationError> {
    let tree = StoryTree::build(story_id, records)?.ok_or_else(|| ValidationError::MissingRoot {
        story_id: story_id.to_string(),
    })?;

    let mut entries = Vec::with_capacity(tree.len());
    tree.walk(|visit| {
        let record = visit.record;
        entries.push(SnapshotEntry::Scenelet(SceneletDigest::from_record(record)));

        if record.is_branch_point {
            let choices = visit
                .children
                .iter()
                .map(|child| BranchChoice {
                    label: child.choice_label_from_parent.clone().unwrap_or_default(),
                    leads_to_id: child.id.clone(),
                })
                .collect();
            entries.push(SnapshotEntry::BranchingPoint(BranchingPointDigest {
                source_scenelet_id: record.id.clone(),
                choice_prompt: record.choice_prompt.clone().unwrap_or_default(),
                choices,
            }));
        }
    })?;

    Ok(StorySnapshot {
        story_id: story_id.to_string(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordBuilder;
    use pretty_assertions::assert_eq;

    fn door_story() -> Vec<SceneletRecord> {
        vec![
            RecordBuilder::new("s", "y")
                .parent("r")
                .label("Right")
                .description("Right hall")
                .terminal()
                .at(2)
                .build(),
            RecordBuilder::new("s", "r")
                .description("Fog")
                .dialogue("Mara", "Hello")
                .shot("Wide")
                .branch("Which door?")
                .at(0)
                .build(),
            RecordBuilder::new("s", "x")
                .parent("r")
                .label("Left")
                .description("Left hall")
                .terminal()
                .at(1)
                .build(),
        ]
    }

    #[test]
    fn test_text_is_stable() {
        let snapshot = assemble_snapshot("s", &door_story()).unwrap();
        let expected = r#"[
  {
    "type": "scenelet",
    "id": "r",
    "parent_id": null,
    "role": "root",
    "description": "Fog",
    "dialogue": [
      {
        "character": "Mara",
        "line": "Hello"
      }
    ],
    "shot_suggestions": [
      "Wide"
    ]
  },
  {
    "type": "branching-point",
    "source_scenelet_id": "r",
    "choice_prompt": "Which door?",
    "choices": [
      {
        "label": "Left",
        "leads_to_id": "x"
      },
      {
        "label": "Right",
        "leads_to_id": "y"
      }
    ]
  },
  {
    "type": "scenelet",
    "id": "x",
    "parent_id": "r",
    "role": "terminal",
    "choice_label": "Left",
    "description": "Left hall",
    "dialogue": [],
    "shot_suggestions": []
  },
  {
    "type": "scenelet",
    "id": "y",
    "parent_id": "r",
    "role": "terminal",
    "choice_label": "Right",
    "description": "Right hall",
    "dialogue": [],
    "shot_suggestions": []
  }
]"#;
        assert_eq!(snapshot.to_text().unwrap(), expected);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut reversed = door_story();
        reversed.reverse();
        assert_eq!(
            assemble_snapshot("s", &reversed).unwrap(),
            assemble_snapshot("s", &door_story()).unwrap()
        );
    }

    #[test]
    fn test_linear_scenelets_have_no_role() {
        let records = vec![
            RecordBuilder::new("s", "r").at(0).build(),
            RecordBuilder::new("s", "l").parent("r").at(1).build(),
        ];
        let snapshot = assemble_snapshot("s", &records).unwrap();
        let digests: Vec<_> = snapshot.scenelets().collect();
        assert_eq!(digests[0].role, Some(SceneletRole::Root));
        assert_eq!(digests[1].role, None);
        assert!(!snapshot.to_text().unwrap().contains("\"role\": null"));
    }

    #[test]
    fn test_empty_story_is_rejected() {
        assert!(matches!(
            assemble_snapshot("s", &[]).unwrap_err(),
            ValidationError::MissingRoot { .. }
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let records = vec![
            RecordBuilder::new("s", "r").at(0).build(),
            RecordBuilder::new("s", "a").parent("r").at(1).build(),
            RecordBuilder::new("s", "a").parent("r").at(2).build(),
        ];
        assert!(matches!(
            assemble_snapshot("s", &records).unwrap_err(),
            ValidationError::DuplicateId { .. }
        ));
    }

    #[test]
    fn test_invalid_tree_is_rejected() {
        let records = vec![
            RecordBuilder::new("s", "r").terminal().at(0).build(),
            RecordBuilder::new("s", "a").parent("r").at(1).build(),
        ];
        assert!(matches!(
            assemble_snapshot("s", &records).unwrap_err(),
            ValidationError::TerminalHasChildren { .. }
        ));
    }
}
