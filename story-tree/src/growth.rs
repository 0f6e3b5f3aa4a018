//! Tree growth engine.
//!
//! The [`GrowthEngine`] expands one story depth first. It keeps an explicit
//! stack of [`GenerationTask`]s, asks the generator for each task's
//! continuation, classifies the answer and writes the resulting scenelets
//! through the store. A run ends when every explored path has concluded.
//!
//! Nothing is rolled back on failure. Whatever was committed before an error
//! stays in the store, and [`GrowthEngine::resume`] picks up from there.

use crate::classify::{classify_response, ClassifiedResponse, ParseError};
use crate::config::GrowthConfig;
use crate::generator::{GenerationRequest, Generator, GeneratorError};
use crate::prompt;
use crate::resume::plan_resume;
use crate::scenelet::{GenerationTask, NewScenelet, StoryBrief};
use crate::store::{SceneletStore, StoreError};
use crate::tree::ValidationError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a growth run.
#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("generation failed for story {story_id}: {source}")]
    Generation {
        story_id: String,
        #[source]
        source: GeneratorError,
    },

    #[error("story {story_id}, parent {}: {source}", .parent_id.as_deref().unwrap_or("<root>"))]
    Parse {
        story_id: String,
        parent_id: Option<String>,
        #[source]
        source: ParseError,
    },

    #[error("store error for story {story_id}: {source}")]
    Store {
        story_id: String,
        #[source]
        source: StoreError,
    },

    #[error("story {story_id}: branch point returned for the opening scenelet, which has no parent")]
    BranchWithoutParent { story_id: String },

    #[error("story {story_id}: step limit of {limit} generation calls reached")]
    StepLimitExceeded { story_id: String, limit: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// What a growth run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrowthReport {
    pub story_id: String,
    pub generation_calls: usize,
    pub scenelets_created: usize,
    pub branch_points: usize,
    pub terminals: usize,
}

/// Depth-first driver for one story at a time.
pub struct GrowthEngine<G, S> {
    generator: G,
    store: S,
    config: GrowthConfig,
}

impl<G: Generator, S: SceneletStore> GrowthEngine<G, S> {
    pub fn new(generator: G, store: S) -> Self {
        Self {
            generator,
            store,
            config: GrowthConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GrowthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Grow a new story from its opening scenelet.
    pub async fn start(&self, story_id: &str, brief: &StoryBrief) -> Result<GrowthReport, GrowthError> {
        self.grow(brief, vec![GenerationTask::root(story_id)]).await
    }

    /// Continue a story from whatever is persisted.
    ///
    /// An empty story starts from the opening scenelet; otherwise the stored
    /// tree is validated and its open leaves are grown. A finished story
    /// makes no generation calls.
    pub async fn resume(&self, story_id: &str, brief: &StoryBrief) -> Result<GrowthReport, GrowthError> {
        let records = self
            .store
            .list_scenelets_by_story(story_id)
            .await
            .map_err(|source| GrowthError::Store {
                story_id: story_id.to_string(),
                source,
            })?;

        if records.is_empty() {
            info!(story_id, "no scenelets stored; starting from the root");
            return self.start(story_id, brief).await;
        }

        let plan = plan_resume(story_id, &records)?;
        info!(
            story_id,
            stored = records.len(),
            pending = plan.pending_tasks.len(),
            "resuming story"
        );
        if plan.is_complete() {
            return Ok(GrowthReport {
                story_id: story_id.to_string(),
                ..GrowthReport::default()
            });
        }
        self.grow(brief, plan.pending_tasks).await
    }

    /// Grow from `tasks` until every path concludes.
    ///
    /// The first task is processed first. All tasks must belong to the same
    /// story.
    pub async fn grow(
        &self,
        brief: &StoryBrief,
        tasks: Vec<GenerationTask>,
    ) -> Result<GrowthReport, GrowthError> {
        let story_id = match tasks.first() {
            Some(task) => task.story_id.clone(),
            None => return Ok(GrowthReport::default()),
        };
        let mut report = GrowthReport {
            story_id: story_id.clone(),
            ..GrowthReport::default()
        };

        info!(story_id = %story_id, tasks = tasks.len(), "growth run started");

        let mut stack = tasks;
        stack.reverse();

        while let Some(task) = stack.pop() {
            if let Some(limit) = self.config.max_steps {
                if report.generation_calls >= limit {
                    warn!(story_id = %story_id, limit, pending = stack.len() + 1, "step limit reached");
                    return Err(GrowthError::StepLimitExceeded { story_id, limit });
                }
            }

            match self.step(brief, &task, &mut stack, &mut report).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        story_id = %story_id,
                        parent = task.parent_scenelet_id.as_deref().unwrap_or("<root>"),
                        error = %err,
                        "growth run aborted"
                    );
                    return Err(err);
                }
            }
        }

        info!(
            story_id = %story_id,
            generation_calls = report.generation_calls,
            scenelets_created = report.scenelets_created,
            branch_points = report.branch_points,
            terminals = report.terminals,
            "growth run finished"
        );
        Ok(report)
    }

    /// Process one task, pushing its follow-ups onto `stack`.
    async fn step(
        &self,
        brief: &StoryBrief,
        task: &GenerationTask,
        stack: &mut Vec<GenerationTask>,
        report: &mut GrowthReport,
    ) -> Result<(), GrowthError> {
        let story_id = task.story_id.as_str();
        debug!(
            story_id,
            parent = task.parent_scenelet_id.as_deref().unwrap_or("<root>"),
            depth = task.path_context.len(),
            "generating continuation"
        );

        // Ask the generator
        let request = GenerationRequest {
            system_instruction: prompt::system_instruction().to_string(),
            user_content: prompt::user_content(brief, task),
            timeout: self.config.request_timeout(),
        };
        report.generation_calls += 1;
        let raw = self
            .generator
            .generate(request)
            .await
            .map_err(|source| GrowthError::Generation {
                story_id: story_id.to_string(),
                source,
            })?;

        // Classify
        let response = classify_response(&raw).map_err(|source| GrowthError::Parse {
            story_id: story_id.to_string(),
            parent_id: task.parent_scenelet_id.clone(),
            source,
        })?;
        debug!(story_id, shape = response.kind(), "classified response");

        let store_err = |source| GrowthError::Store {
            story_id: story_id.to_string(),
            source,
        };

        match response {
            ClassifiedResponse::Branch {
                choice_prompt,
                scenelets,
            } => {
                let parent_id = task
                    .parent_scenelet_id
                    .as_deref()
                    .ok_or_else(|| GrowthError::BranchWithoutParent {
                        story_id: story_id.to_string(),
                    })?;

                // Children first, in label order, so creation order is sibling order.
                let mut continuations = Vec::with_capacity(scenelets.len());
                for option in scenelets {
                    let child = self
                        .store
                        .create_scenelet(NewScenelet {
                            story_id: story_id.to_string(),
                            parent_id: Some(parent_id.to_string()),
                            choice_label_from_parent: Some(option.label),
                            content: option.content,
                        })
                        .await
                        .map_err(store_err)?;
                    report.scenelets_created += 1;
                    continuations.push(task.continue_from(&child));
                }

                self.store
                    .mark_scenelet_as_branch_point(parent_id, &choice_prompt)
                    .await
                    .map_err(store_err)?;
                report.branch_points += 1;

                // Reversed so the first label is popped first.
                stack.extend(continuations.into_iter().rev());
            }

            ClassifiedResponse::Concluding { scenelet } => {
                let record = self
                    .store
                    .create_scenelet(NewScenelet {
                        story_id: story_id.to_string(),
                        parent_id: task.parent_scenelet_id.clone(),
                        choice_label_from_parent: None,
                        content: scenelet,
                    })
                    .await
                    .map_err(store_err)?;
                report.scenelets_created += 1;

                self.store
                    .mark_scenelet_as_terminal(&record.id)
                    .await
                    .map_err(store_err)?;
                report.terminals += 1;
            }

            ClassifiedResponse::Linear { scenelet } => {
                let record = self
                    .store
                    .create_scenelet(NewScenelet {
                        story_id: story_id.to_string(),
                        parent_id: task.parent_scenelet_id.clone(),
                        choice_label_from_parent: None,
                        content: scenelet,
                    })
                    .await
                    .map_err(store_err)?;
                report.scenelets_created += 1;
                stack.push(task.continue_from(&record));
            }
        }

        Ok(())
    }
}
