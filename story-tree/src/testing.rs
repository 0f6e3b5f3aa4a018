//! Testing utilities for the story tree engine.
//!
//! This module provides tools for deterministic testing:
//! - `ScriptedGenerator` replays canned responses without API calls
//! - `ScriptedResponse` builds wire-format generation output
//! - `RecordBuilder` builds persisted records for validation tests

use crate::generator::{GenerationRequest, Generator, GeneratorError};
use crate::scenelet::{DialogueLine, SceneletContent, SceneletRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A scripted response from the generator.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// A single scenelet that continues the story.
    Linear(SceneletContent),
    /// A single scenelet that ends its path.
    Concluding(SceneletContent),
    /// A choice between labelled scenelets.
    Branch {
        choice_prompt: String,
        options: Vec<(String, SceneletContent)>,
    },
    /// Text returned exactly as given.
    Raw(String),
}

impl ScriptedResponse {
    pub fn linear(description: impl Into<String>) -> Self {
        Self::Linear(SceneletContent::new(description))
    }

    pub fn concluding(description: impl Into<String>) -> Self {
        Self::Concluding(SceneletContent::new(description))
    }

    /// A branch offering `options` as (label, description) pairs.
    pub fn branch<L, D>(choice_prompt: impl Into<String>, options: Vec<(L, D)>) -> Self
    where
        L: Into<String>,
        D: Into<String>,
    {
        Self::Branch {
            choice_prompt: choice_prompt.into(),
            options: options
                .into_iter()
                .map(|(label, description)| (label.into(), SceneletContent::new(description)))
                .collect(),
        }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// Render as the text a generation service would return.
    pub fn to_raw(&self) -> String {
        let value = match self {
            ScriptedResponse::Raw(text) => return text.clone(),
            ScriptedResponse::Linear(content) => json!({
                "branch_point": false,
                "is_concluding_scene": false,
                "next_scenelets": [wire_scenelet(content, None)],
            }),
            ScriptedResponse::Concluding(content) => json!({
                "branch_point": false,
                "is_concluding_scene": true,
                "next_scenelets": [wire_scenelet(content, None)],
            }),
            ScriptedResponse::Branch {
                choice_prompt,
                options,
            } => json!({
                "branch_point": true,
                "is_concluding_scene": false,
                "choice_prompt": choice_prompt,
                "next_scenelets": options
                    .iter()
                    .map(|(label, content)| wire_scenelet(content, Some(label.as_str())))
                    .collect::<Vec<_>>(),
            }),
        };
        value.to_string()
    }
}

fn wire_scenelet(content: &SceneletContent, label: Option<&str>) -> Value {
    let mut value = json!({
        "description": content.description,
        "dialogue": content.dialogue,
        "shot_suggestions": content.shot_suggestions,
    });
    if let Some(label) = label.or(content.choice_label.as_deref()) {
        value["choice_label"] = json!(label);
    }
    value
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<String>,
    requests: Vec<GenerationRequest>,
}

/// A generator that returns scripted responses in order.
///
/// Clones share the same script, so a test can keep a handle for
/// inspection after moving one into an engine. Once the script runs out,
/// every call fails with [`GeneratorError::Unavailable`], which is how tests
/// simulate an interrupted run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self::from_raw(responses.iter().map(ScriptedResponse::to_raw).collect())
    }

    pub fn from_raw(responses: Vec<String>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                responses: responses.into(),
                requests: Vec::new(),
            })),
        }
    }

    /// Append a response to the end of the script.
    pub fn queue(&self, response: ScriptedResponse) {
        self.lock().responses.push_back(response.to_raw());
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GeneratorError> {
        let mut script = self.lock();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .ok_or_else(|| GeneratorError::Unavailable("script exhausted".to_string()))
    }
}

/// Builder for persisted records with predictable ids and timestamps.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: SceneletRecord,
}

impl RecordBuilder {
    pub fn new(story_id: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            record: SceneletRecord {
                content: SceneletContent::new(format!("Scenelet {id}")),
                id,
                story_id: story_id.into(),
                parent_id: None,
                choice_label_from_parent: None,
                choice_prompt: None,
                is_branch_point: false,
                is_terminal_node: false,
                created_at: base_time(),
            },
        }
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.record.parent_id = Some(parent_id.into());
        self
    }

    /// Set the choice label, both on the record and in its content.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.record.content.choice_label = Some(label.clone());
        self.record.choice_label_from_parent = Some(label);
        self
    }

    pub fn branch(mut self, choice_prompt: impl Into<String>) -> Self {
        self.record.is_branch_point = true;
        self.record.choice_prompt = Some(choice_prompt.into());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.record.is_terminal_node = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.content.description = description.into();
        self
    }

    pub fn dialogue(mut self, character: impl Into<String>, line: impl Into<String>) -> Self {
        self.record
            .content
            .dialogue
            .push(DialogueLine::new(character, line));
        self
    }

    pub fn shot(mut self, shot: impl Into<String>) -> Self {
        self.record.content.shot_suggestions.push(shot.into());
        self
    }

    /// Creation time, in seconds after a fixed base.
    pub fn at(mut self, seconds: i64) -> Self {
        self.record.created_at = base_time() + Duration::seconds(seconds);
        self
    }

    pub fn build(self) -> SceneletRecord {
        self.record
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify_response, ClassifiedResponse};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: "system".to_string(),
            user_content: "user".to_string(),
            timeout: None,
        }
    }

    #[test]
    fn test_scripted_responses_classify() {
        let linear = classify_response(&ScriptedResponse::linear("Fog").to_raw()).unwrap();
        assert_eq!(linear.kind(), "linear");

        let end = classify_response(&ScriptedResponse::concluding("Dawn").to_raw()).unwrap();
        assert_eq!(end.kind(), "concluding");

        let branch = ScriptedResponse::branch("Which door?", vec![("Left", "L"), ("Right", "R")]);
        match classify_response(&branch.to_raw()).unwrap() {
            ClassifiedResponse::Branch {
                choice_prompt,
                scenelets,
            } => {
                assert_eq!(choice_prompt, "Which door?");
                let labels: Vec<_> = scenelets.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, vec!["Left", "Right"]);
            }
            other => panic!("expected branch, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_generator_replays_then_fails() {
        let generator = ScriptedGenerator::new(vec![ScriptedResponse::raw("one")]);
        let handle = generator.clone();

        assert_eq!(generator.generate(request()).await.unwrap(), "one");
        assert!(matches!(
            generator.generate(request()).await,
            Err(GeneratorError::Unavailable(_))
        ));
        assert_eq!(handle.calls(), 2);
        assert_eq!(handle.remaining(), 0);

        handle.queue(ScriptedResponse::raw("two"));
        assert_eq!(generator.generate(request()).await.unwrap(), "two");
        assert_eq!(handle.requests()[0].user_content, "user");
    }

    #[test]
    fn test_record_builder() {
        let record = RecordBuilder::new("s", "a")
            .parent("r")
            .label("Left")
            .at(3)
            .build();
        assert_eq!(record.parent_id.as_deref(), Some("r"));
        assert_eq!(record.choice_label_from_parent.as_deref(), Some("Left"));
        assert_eq!(record.content.choice_label.as_deref(), Some("Left"));
        assert!(record.created_at > RecordBuilder::new("s", "b").build().created_at);
    }
}
