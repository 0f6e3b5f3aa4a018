//! Classification of raw generation output.
//!
//! The generation service answers with a JSON object describing the next
//! scenelet(s). This module validates that object and turns it into one of
//! three continuation shapes. Nothing is defaulted or silently dropped: any
//! missing or malformed field fails with a [`ParseError`] naming it.

use crate::scenelet::{DialogueLine, SceneletContent};
use serde_json::{Map, Value};
use thiserror::Error;

/// Malformed or incomplete generation output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid generation response: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One labelled continuation of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOption {
    pub label: String,
    pub content: SceneletContent,
}

/// The shape of a validated generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResponse {
    /// The story continues with a single scenelet.
    Linear { scenelet: SceneletContent },
    /// The path ends with this scenelet.
    Concluding { scenelet: SceneletContent },
    /// The story forks into two or more labelled continuations.
    Branch {
        choice_prompt: String,
        scenelets: Vec<BranchOption>,
    },
}

impl ClassifiedResponse {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedResponse::Linear { .. } => "linear",
            ClassifiedResponse::Concluding { .. } => "concluding",
            ClassifiedResponse::Branch { .. } => "branch",
        }
    }
}

/// Parse and classify a raw generation response.
pub fn classify_response(raw: &str) -> Result<ClassifiedResponse, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new("response is empty"));
    }

    // Bare JSON is taken as is; fences are only stripped when that fails.
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => serde_json::from_str(extract_json(trimmed))
            .map_err(|e| ParseError::new(format!("response is not valid JSON: {e}")))?,
    };
    let object = value
        .as_object()
        .ok_or_else(|| ParseError::new("response must be a JSON object"))?;

    let branch_point = require_bool(object, "branch_point")?;
    let is_concluding = require_bool(object, "is_concluding_scene")?;

    let raw_scenelets = match object.get("next_scenelets") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) => {
            return Err(ParseError::new("`next_scenelets` must not be empty"));
        }
        _ => return Err(ParseError::new("`next_scenelets` must be a non-empty array")),
    };

    if branch_point && is_concluding {
        return Err(ParseError::new(
            "response cannot be both a branch point and a concluding scene",
        ));
    }

    let scenelets = raw_scenelets
        .iter()
        .enumerate()
        .map(|(index, item)| normalize_scenelet(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    if branch_point {
        let choice_prompt = match object.get("choice_prompt") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Err(ParseError::new(
                    "branch responses require a non-empty `choice_prompt`",
                ))
            }
        };

        if scenelets.len() < 2 {
            return Err(ParseError::new(
                "branch responses must include at least two scenelets",
            ));
        }

        let options = scenelets
            .into_iter()
            .enumerate()
            .map(|(index, content)| match content.choice_label.clone() {
                Some(label) => Ok(BranchOption { label, content }),
                None => Err(ParseError::new(format!(
                    "next_scenelets[{index}].choice_label is required for branch responses"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        return Ok(ClassifiedResponse::Branch {
            choice_prompt,
            scenelets: options,
        });
    }

    let shape = if is_concluding { "concluding" } else { "linear" };
    let scenelet = single(scenelets, shape)?;
    Ok(if is_concluding {
        ClassifiedResponse::Concluding { scenelet }
    } else {
        ClassifiedResponse::Linear { scenelet }
    })
}

fn single(mut scenelets: Vec<SceneletContent>, shape: &str) -> Result<SceneletContent, ParseError> {
    if scenelets.len() != 1 {
        return Err(ParseError::new(format!(
            "{shape} responses must include exactly one scenelet, found {}",
            scenelets.len()
        )));
    }
    Ok(scenelets.remove(0))
}

fn require_bool(object: &Map<String, Value>, field: &str) -> Result<bool, ParseError> {
    match object.get(field) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ParseError::new(format!("`{field}` must be a boolean"))),
        None => Err(ParseError::new(format!("missing boolean field `{field}`"))),
    }
}

fn normalize_scenelet(index: usize, item: &Value) -> Result<SceneletContent, ParseError> {
    let path = format!("next_scenelets[{index}]");
    let object = item
        .as_object()
        .ok_or_else(|| ParseError::new(format!("{path} must be an object")))?;

    let description = non_empty_string(object.get("description"))
        .ok_or_else(|| ParseError::new(format!("{path}.description must be a non-empty string")))?;

    let dialogue = match object.get("dialogue") {
        Some(Value::Array(lines)) => lines
            .iter()
            .enumerate()
            .map(|(i, line)| normalize_dialogue(&format!("{path}.dialogue[{i}]"), line))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(ParseError::new(format!("{path}.dialogue must be an array"))),
    };

    let shot_suggestions = match object.get("shot_suggestions") {
        Some(Value::Array(shots)) => shots
            .iter()
            .enumerate()
            .map(|(i, shot)| {
                non_empty_string(Some(shot)).ok_or_else(|| {
                    ParseError::new(format!(
                        "{path}.shot_suggestions[{i}] must be a non-empty string"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(ParseError::new(format!(
                "{path}.shot_suggestions must be an array"
            )))
        }
    };

    let choice_label = match object.get("choice_label") {
        None | Some(Value::Null) => None,
        Some(value) => Some(non_empty_string(Some(value)).ok_or_else(|| {
            ParseError::new(format!("{path}.choice_label must be a non-empty string"))
        })?),
    };

    Ok(SceneletContent {
        description,
        dialogue,
        shot_suggestions,
        choice_label,
    })
}

fn normalize_dialogue(path: &str, item: &Value) -> Result<DialogueLine, ParseError> {
    let object = item
        .as_object()
        .ok_or_else(|| ParseError::new(format!("{path} must be an object")))?;

    let character = non_empty_string(object.get("character"))
        .ok_or_else(|| ParseError::new(format!("{path}.character must be a non-empty string")))?;
    let line = non_empty_string(object.get("line"))
        .ok_or_else(|| ParseError::new(format!("{path}.line must be a non-empty string")))?;

    Ok(DialogueLine { character, line })
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Extract JSON from a response that might be wrapped in a markdown code block.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenelet(description: &str) -> Value {
        json!({
            "description": description,
            "dialogue": [],
            "shot_suggestions": ["Wide shot"]
        })
    }

    fn labelled(description: &str, label: &str) -> Value {
        let mut value = scenelet(description);
        value["choice_label"] = json!(label);
        value
    }

    fn message(result: Result<ClassifiedResponse, ParseError>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_linear_response() {
        let raw = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{
                "description": "  The keeper climbs the stairs.  ",
                "dialogue": [{"character": " Mara ", "line": "Who lit the lamp?"}],
                "shot_suggestions": ["Low angle on the spiral stair"]
            }]
        })
        .to_string();

        let ClassifiedResponse::Linear { scenelet } = classify_response(&raw).unwrap() else {
            panic!("expected linear");
        };
        assert_eq!(scenelet.description, "The keeper climbs the stairs.");
        assert_eq!(scenelet.dialogue, vec![DialogueLine::new("Mara", "Who lit the lamp?")]);
        assert_eq!(scenelet.shot_suggestions.len(), 1);
        assert_eq!(scenelet.choice_label, None);
    }

    #[test]
    fn test_concluding_response() {
        let raw = json!({
            "branch_point": false,
            "is_concluding_scene": true,
            "next_scenelets": [scenelet("The light goes dark for good.")]
        })
        .to_string();

        assert!(matches!(
            classify_response(&raw).unwrap(),
            ClassifiedResponse::Concluding { .. }
        ));
    }

    #[test]
    fn test_branch_response_keeps_label_order() {
        let raw = json!({
            "branch_point": true,
            "is_concluding_scene": false,
            "choice_prompt": " Which door? ",
            "next_scenelets": [labelled("Left hall", " Left "), labelled("Right hall", "Right")]
        })
        .to_string();

        let ClassifiedResponse::Branch {
            choice_prompt,
            scenelets,
        } = classify_response(&raw).unwrap()
        else {
            panic!("expected branch");
        };
        assert_eq!(choice_prompt, "Which door?");
        let labels: Vec<_> = scenelets.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Left", "Right"]);
        assert_eq!(scenelets[0].content.choice_label.as_deref(), Some("Left"));
    }

    #[test]
    fn test_branch_with_one_scenelet_fails() {
        let raw = json!({
            "branch_point": true,
            "is_concluding_scene": false,
            "choice_prompt": "Which door?",
            "next_scenelets": [labelled("Left hall", "Left")]
        })
        .to_string();

        assert!(message(classify_response(&raw)).contains("must include at least two scenelets"));
    }

    #[test]
    fn test_branch_requires_prompt_and_labels() {
        let no_prompt = json!({
            "branch_point": true,
            "is_concluding_scene": false,
            "choice_prompt": "   ",
            "next_scenelets": [labelled("a", "A"), labelled("b", "B")]
        })
        .to_string();
        assert!(message(classify_response(&no_prompt)).contains("choice_prompt"));

        let missing_label = json!({
            "branch_point": true,
            "is_concluding_scene": false,
            "choice_prompt": "Pick",
            "next_scenelets": [labelled("a", "A"), scenelet("b")]
        })
        .to_string();
        assert!(message(classify_response(&missing_label))
            .contains("next_scenelets[1].choice_label is required"));
    }

    #[test]
    fn test_conflicting_flags_fail() {
        let raw = json!({
            "branch_point": true,
            "is_concluding_scene": true,
            "choice_prompt": "Pick",
            "next_scenelets": [labelled("a", "A"), labelled("b", "B")]
        })
        .to_string();
        assert!(message(classify_response(&raw)).contains("cannot be both"));
    }

    #[test]
    fn test_missing_discriminators_fail() {
        let raw = json!({
            "is_concluding_scene": false,
            "next_scenelets": [scenelet("a")]
        })
        .to_string();
        assert!(message(classify_response(&raw)).contains("`branch_point`"));

        let raw = json!({
            "branch_point": false,
            "is_concluding_scene": "no",
            "next_scenelets": [scenelet("a")]
        })
        .to_string();
        assert!(message(classify_response(&raw)).contains("`is_concluding_scene` must be a boolean"));
    }

    #[test]
    fn test_scenelet_count_rules() {
        let empty = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": []
        })
        .to_string();
        assert!(message(classify_response(&empty)).contains("next_scenelets"));

        let two_linear = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [scenelet("a"), scenelet("b")]
        })
        .to_string();
        assert!(message(classify_response(&two_linear)).contains("exactly one scenelet"));
    }

    #[test]
    fn test_field_errors_name_the_offender() {
        let bad_line = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{
                "description": "x",
                "dialogue": [{"character": "Mara", "line": "ok"}, {"character": "Tom", "line": " "}],
                "shot_suggestions": []
            }]
        })
        .to_string();
        assert!(message(classify_response(&bad_line))
            .contains("next_scenelets[0].dialogue[1].line must be a non-empty string"));

        let bad_shot = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{"description": "x", "dialogue": [], "shot_suggestions": ["", "b"]}]
        })
        .to_string();
        assert!(message(classify_response(&bad_shot)).contains("shot_suggestions[0]"));

        let no_description = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{"description": "", "dialogue": [], "shot_suggestions": []}]
        })
        .to_string();
        assert!(message(classify_response(&no_description)).contains("description"));

        let no_dialogue = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{"description": "x", "shot_suggestions": []}]
        })
        .to_string();
        assert!(message(classify_response(&no_dialogue)).contains("dialogue must be an array"));
    }

    #[test]
    fn test_not_json_fails() {
        assert!(message(classify_response("The keeper wakes up.")).contains("not valid JSON"));
        assert!(message(classify_response("[1, 2]")).contains("JSON object"));
        assert!(message(classify_response("   ")).contains("empty"));
    }

    #[test]
    fn test_markdown_wrapped_response() {
        let raw = format!(
            "Here you go:\n```json\n{}\n```",
            json!({
                "branch_point": false,
                "is_concluding_scene": false,
                "next_scenelets": [scenelet("a")]
            })
        );
        assert!(matches!(
            classify_response(&raw).unwrap(),
            ClassifiedResponse::Linear { .. }
        ));
    }

    #[test]
    fn test_backticks_inside_bare_json_survive() {
        let raw = json!({
            "branch_point": false,
            "is_concluding_scene": false,
            "next_scenelets": [{
                "description": "She types ```run``` on the console",
                "dialogue": [],
                "shot_suggestions": []
            }]
        })
        .to_string();

        let ClassifiedResponse::Linear { scenelet } = classify_response(&raw).unwrap() else {
            panic!("expected linear");
        };
        assert_eq!(scenelet.description, "She types ```run``` on the console");
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "```\n{\"branch_point\": false}\n```";
        assert_eq!(extract_json(text), "{\"branch_point\": false}");
    }
}
