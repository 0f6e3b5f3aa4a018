//! Prompt construction for scenelet generation.

use crate::scenelet::{GenerationTask, SceneletContent, StoryBrief};

/// Marker placed in the prompt when the opening scenelet is requested.
pub const ROOT_MARKER: &str =
    "ROOT: No scenelets exist yet. Write the opening scenelet of the story. It must not be a branch point.";

/// The system instruction sent with every generation call.
pub fn system_instruction() -> &'static str {
    include_str!("prompts/scenelet_system.txt")
}

/// The user message for a task: the brief, then the path so far.
pub fn user_content(brief: &StoryBrief, task: &GenerationTask) -> String {
    let mut prompt = String::from("## Story Brief\n");
    if let Some(ref title) = brief.title {
        prompt.push_str(&format!("Title: {title}\n"));
    }
    prompt.push_str(brief.premise.trim());
    prompt.push_str("\n\n## Story So Far\n");

    if task.is_root() {
        prompt.push_str(ROOT_MARKER);
        prompt.push('\n');
        return prompt;
    }

    for (i, content) in task.path_context.iter().enumerate() {
        prompt.push_str(&format!("\nScenelet {}:\n", i + 1));
        render_content(&mut prompt, content);
    }

    prompt.push_str("\n## Task\nContinue the story from the last scenelet above.\n");
    prompt
}

fn render_content(out: &mut String, content: &SceneletContent) {
    if let Some(ref label) = content.choice_label {
        out.push_str(&format!("Choice taken: {label}\n"));
    }
    out.push_str(&format!("Description: {}\n", content.description));
    if !content.dialogue.is_empty() {
        out.push_str("Dialogue:\n");
        for line in &content.dialogue {
            out.push_str(&format!("- {}: \"{}\"\n", line.character, line.line));
        }
    }
    if !content.shot_suggestions.is_empty() {
        out.push_str("Shot suggestions:\n");
        for shot in &content.shot_suggestions {
            out.push_str(&format!("- {shot}\n"));
        }
    }
}
