//! `storytree` binary.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use story_tree::{
    assemble_snapshot, init_telemetry, plan_resume, ClaudeGenerator, Config, GrowthEngine,
    JsonFileStore, SceneletStore, StoryBrief,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    }
    .with_env_overrides()?;
    if let Some(level) = cli.log.clone() {
        config.log_level = level;
    }
    init_telemetry(&config.log_level);

    let store = JsonFileStore::new(&cli.store);
    info!(store = %store.path().display(), "opened scenelet store");

    match cli.command {
        Command::Grow {
            story,
            premise,
            title,
        } => {
            let mut brief = StoryBrief::new(premise);
            if let Some(title) = title {
                brief = brief.with_title(title);
            }

            let generator = ClaudeGenerator::from_env(config.generator.clone())
                .context("failed to create the Claude generator")?;
            let engine = GrowthEngine::new(generator, store).with_config(config.growth.clone());
            let report = engine
                .resume(&story, &brief)
                .await
                .with_context(|| format!("growth of story {story} stopped"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Plan { story } => {
            let records = store.list_scenelets_by_story(&story).await?;
            let plan = plan_resume(&story, &records)?;
            println!("{}", serde_json::to_string_pretty(&plan.pending_tasks)?);
        }

        Command::Validate { story } => {
            let records = store.list_scenelets_by_story(&story).await?;
            let plan = plan_resume(&story, &records)
                .with_context(|| format!("story {story} is invalid"))?;
            if records.is_empty() {
                println!("story {story} has no scenelets");
            } else {
                println!(
                    "story {story} is valid: {} scenelets, {} pending",
                    records.len(),
                    plan.pending_tasks.len()
                );
            }
        }

        Command::Snapshot { story } => {
            let records = store.list_scenelets_by_story(&story).await?;
            let snapshot = assemble_snapshot(&story, &records)?;
            println!("{}", snapshot.to_text()?);
        }
    }

    Ok(())
}
