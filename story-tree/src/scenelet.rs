//! Story tree data model.
//!
//! A story is a tree of scenelets. Records are created once by the growth
//! engine and afterwards only ever flagged as a branch point or a terminal
//! node. Everything here is plain data so it can be persisted and replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One spoken line inside a scenelet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub character: String,
    pub line: String,
}

impl DialogueLine {
    pub fn new(character: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            line: line.into(),
        }
    }
}

/// The narrative payload of a scenelet, as produced by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneletContent {
    pub description: String,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
    #[serde(default)]
    pub shot_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_label: Option<String>,
}

impl SceneletContent {
    /// Content with a description and nothing else.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            dialogue: Vec::new(),
            shot_suggestions: Vec::new(),
            choice_label: None,
        }
    }

    pub fn with_dialogue(mut self, character: impl Into<String>, line: impl Into<String>) -> Self {
        self.dialogue.push(DialogueLine::new(character, line));
        self
    }

    pub fn with_shot(mut self, shot: impl Into<String>) -> Self {
        self.shot_suggestions.push(shot.into());
        self
    }

    pub fn with_choice_label(mut self, label: impl Into<String>) -> Self {
        self.choice_label = Some(label.into());
        self
    }
}

/// A persisted scenelet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneletRecord {
    /// Assigned by the store.
    pub id: String,
    pub story_id: String,
    /// `None` only for the root.
    pub parent_id: Option<String>,
    /// Set iff the parent is a branch point.
    #[serde(default)]
    pub choice_label_from_parent: Option<String>,
    /// Set iff `is_branch_point`.
    #[serde(default)]
    pub choice_prompt: Option<String>,
    pub content: SceneletContent,
    #[serde(default)]
    pub is_branch_point: bool,
    #[serde(default)]
    pub is_terminal_node: bool,
    /// Defines canonical sibling order.
    pub created_at: DateTime<Utc>,
}

impl SceneletRecord {
    /// Whether this record is the root of its story.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Payload for [`SceneletStore::create_scenelet`](crate::store::SceneletStore::create_scenelet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScenelet {
    pub story_id: String,
    pub parent_id: Option<String>,
    pub choice_label_from_parent: Option<String>,
    pub content: SceneletContent,
}

/// A unit of pending generation work.
///
/// Tasks are flat and serializable so the pending frontier can always be
/// rebuilt from storage instead of living on a call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub story_id: String,
    /// The scenelet to continue from; `None` asks for the opening scenelet.
    pub parent_scenelet_id: Option<String>,
    /// Contents from the root down to and including the parent.
    pub path_context: Vec<SceneletContent>,
}

impl GenerationTask {
    /// The task that generates a story's opening scenelet.
    pub fn root(story_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
            parent_scenelet_id: None,
            path_context: Vec::new(),
        }
    }

    /// The follow-up task continuing from `child`, whose content extends this path.
    pub fn continue_from(&self, child: &SceneletRecord) -> Self {
        let mut path_context = self.path_context.clone();
        path_context.push(child.content.clone());
        Self {
            story_id: self.story_id.clone(),
            parent_scenelet_id: Some(child.id.clone()),
            path_context,
        }
    }

    /// Whether this task asks for the opening scenelet.
    pub fn is_root(&self) -> bool {
        self.parent_scenelet_id.is_none() && self.path_context.is_empty()
    }
}

/// The premise a story is grown from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryBrief {
    #[serde(default)]
    pub title: Option<String>,
    pub premise: String,
}

impl StoryBrief {
    pub fn new(premise: impl Into<String>) -> Self {
        Self {
            title: None,
            premise: premise.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
