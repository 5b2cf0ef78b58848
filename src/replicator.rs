//! The full corpus pipeline: many recipes times many templates.
//!
//! A [`Replicator`] owns everything a run needs:
//!
//! ```text
//! recipes (same medium)  ×  synthesized templates
//!        │                          │
//!        └──── CorpusGenerator per (recipe, template) ────┐
//!                                                          ▼
//!                                             dest/<corpus files>
//!                                                          │
//!                          remove templates, remove duplicates
//! ```
//!
//! Templates synthesized by the replicator live in the destination directory
//! next to the corpus. They are removed explicitly before deduplication and
//! again when the replicator is dropped, so an aborted run never leaves them
//! behind.
//!
//! An interrupt flag (set from a Ctrl-C handler) is checked before every tool
//! invocation. A set flag ends the run with [`ReplicatorError::Interrupted`].
//! Share the same flag with the runner (see
//! [`ProcessRunner::with_interrupt`](crate::process::ProcessRunner::with_interrupt))
//! to also kill a tool that is already running.

use crate::builtin::RecipeSource;
use crate::dedup::{self, DedupError, DedupStats};
use crate::generate::load_generator;
use crate::process::{ToolError, ToolRunner};
use crate::recipe::{Medium, Recipe, RecipeError};
use crate::template::{self, Template, TemplateError, TemplateOptions};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReplicatorError {
    #[error("{0}")]
    Recipe(#[from] RecipeError),
    #[error("{0}")]
    Template(TemplateError),
    #[error("{0}")]
    Tool(ToolError),
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Interrupted")]
    Interrupted,
}

impl From<ToolError> for ReplicatorError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Interrupted { .. } => ReplicatorError::Interrupted,
            other => ReplicatorError::Tool(other),
        }
    }
}

impl From<TemplateError> for ReplicatorError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Tool(ToolError::Interrupted { .. }) => ReplicatorError::Interrupted,
            other => ReplicatorError::Template(other),
        }
    }
}

/// Generates a corpus from recipes and templates of one medium.
pub struct Replicator<R: ToolRunner> {
    medium: Medium,
    dest: PathBuf,
    recipes: Vec<Recipe>,
    templates: Vec<Template>,
    runner: R,
    interrupted: Arc<AtomicBool>,
}

impl<R: ToolRunner> Replicator<R> {
    /// Load every unique recipe source. Recipes for another medium are
    /// skipped with a warning; an invalid recipe is an error.
    pub fn new(
        medium: Medium,
        dest: impl Into<PathBuf>,
        sources: impl IntoIterator<Item = RecipeSource>,
        runner: R,
    ) -> Result<Self, ReplicatorError> {
        let mut seen = HashSet::new();
        let mut recipes = Vec::new();
        for source in sources {
            if !seen.insert(source.clone()) {
                continue;
            }
            let recipe = source.load()?;
            if recipe.medium() == medium {
                recipes.push(recipe);
            } else {
                warn!("'{}' is incompatible with recipe '{}'", medium, source);
                info!("Skipping '{}'", source);
            }
        }
        Ok(Self {
            medium,
            dest: dest.into(),
            recipes,
            templates: Vec::new(),
            runner,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an interrupt flag, typically one set by a signal handler.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Number of files the run will generate, before deduplication.
    pub fn len(&self) -> usize {
        self.recipes.iter().map(Recipe::len).sum::<usize>() * self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_interrupt(&self) -> Result<(), ReplicatorError> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(ReplicatorError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Synthesize one template per unique name, in the order given.
    pub fn generate_templates<S: AsRef<str>>(
        &mut self,
        names: &[S],
        options: &TemplateOptions,
    ) -> Result<(), ReplicatorError> {
        let mut unique: Vec<&str> = Vec::new();
        for name in names {
            if !unique.contains(&name.as_ref()) {
                unique.push(name.as_ref());
            }
        }
        std::fs::create_dir_all(&self.dest)?;
        debug!("generating {} '{}' template(s)...", unique.len(), self.medium);
        for name in unique {
            self.check_interrupt()?;
            let generated =
                template::synthesize(self.medium, name, &self.dest, options, &self.runner)?;
            self.templates.push(generated);
        }
        debug!(
            "generated template(s): {}",
            self.templates
                .iter()
                .map(|t| t.file().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    /// Run every recipe against every template. Returns the number of files
    /// written. The first tool failure aborts the run.
    pub fn generate_corpus(&self) -> Result<usize, ReplicatorError> {
        std::fs::create_dir_all(&self.dest)?;
        let mut written = 0;
        for recipe in &self.recipes {
            for template in &self.templates {
                let mut generator = load_generator(recipe, &self.dest, &self.runner)?;
                generator.add_template(template);
                info!(
                    "Generating {} '{}' file(s) using template '{}'...",
                    recipe.len(),
                    generator.description(),
                    template.name()
                );
                let mut files = generator.generate();
                loop {
                    self.check_interrupt()?;
                    match files.next() {
                        Some(file) => {
                            let file = file?;
                            debug!("created '{}'", file.display());
                            written += 1;
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(written)
    }

    /// Delete synthesized templates. Failures are logged, not returned.
    pub fn remove_templates(&self) {
        for template in &self.templates {
            if let Err(e) = template.remove() {
                warn!(
                    "Unable to remove template '{}': {}",
                    template.file().display(),
                    e
                );
            }
        }
    }

    /// Remove byte-identical files from the destination directory.
    pub fn remove_duplicates(&self) -> Result<DedupStats, ReplicatorError> {
        Ok(dedup::remove_duplicates(&self.dest)?)
    }
}

impl<R: ToolRunner> Drop for Replicator<R> {
    fn drop(&mut self) {
        self.remove_templates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        MockRunner, SAMPLE_AUDIO_RECIPE, SAMPLE_IMAGE_RECIPE, SAMPLE_PARAM_RECIPE,
        SAMPLE_VIDEO_RECIPE,
    };
    use std::fs;
    use tempfile::TempDir;

    fn write_recipes(dir: &Path, recipes: &[&str]) -> Vec<RecipeSource> {
        let recipe_dir = dir.join("recipes");
        fs::create_dir_all(&recipe_dir).unwrap();
        recipes
            .iter()
            .enumerate()
            .map(|(idx, recipe)| {
                let path = recipe_dir.join(format!("recipe-{idx:02}.yml"));
                fs::write(&path, recipe).unwrap();
                RecipeSource::File(path)
            })
            .collect()
    }

    fn corpus_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // =========================================================================
    // Counts
    // =========================================================================

    #[test]
    fn pre_flight_counts() {
        let cases: &[(Medium, &[&str], &[&str], usize)] = &[
            (Medium::Audio, &[], &[], 0),
            (Medium::Video, &[SAMPLE_VIDEO_RECIPE], &["noise"], 1),
            (Medium::Audio, &[SAMPLE_VIDEO_RECIPE], &["noise"], 0),
            (Medium::Image, &[SAMPLE_VIDEO_RECIPE], &["noise"], 0),
            (Medium::Video, &[SAMPLE_VIDEO_RECIPE], &["noise", "solid"], 2),
            (
                Medium::Video,
                &[SAMPLE_VIDEO_RECIPE, SAMPLE_VIDEO_RECIPE],
                &["noise"],
                2,
            ),
            (
                Medium::Video,
                &[SAMPLE_VIDEO_RECIPE, SAMPLE_VIDEO_RECIPE],
                &["noise", "solid"],
                4,
            ),
        ];
        for (medium, recipes, templates, expected) in cases {
            let tmp = TempDir::new().unwrap();
            let sources = write_recipes(tmp.path(), recipes);
            let mut replicator = Replicator::new(
                *medium,
                tmp.path().join("output"),
                sources,
                MockRunner::new(),
            )
            .unwrap();
            assert_eq!(replicator.len(), 0);
            replicator
                .generate_templates(templates, &TemplateOptions::default())
                .unwrap();
            assert_eq!(replicator.len(), *expected, "{medium} {templates:?}");
            assert_eq!(replicator.generate_corpus().unwrap(), *expected);
            replicator.remove_templates();
        }
    }

    #[test]
    fn duplicate_sources_load_once() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_PARAM_RECIPE]);
        let twice = sources.iter().cloned().chain(sources.iter().cloned());
        let replicator =
            Replicator::new(Medium::Video, tmp.path(), twice, MockRunner::new()).unwrap();
        assert_eq!(replicator.recipes().len(), 1);
    }

    #[test]
    fn mismatched_medium_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_AUDIO_RECIPE, SAMPLE_IMAGE_RECIPE]);
        let replicator =
            Replicator::new(Medium::Image, tmp.path(), sources, MockRunner::new()).unwrap();
        assert_eq!(replicator.recipes().len(), 1);
        assert_eq!(replicator.recipes()[0].codec(), "jpeg");
    }

    #[test]
    fn invalid_recipe_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &["base: {}\n"]);
        let err = Replicator::new(Medium::Video, tmp.path(), sources, MockRunner::new())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Recipe missing entry 'codec'");
    }

    // =========================================================================
    // Templates
    // =========================================================================

    #[test]
    fn template_names_are_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let mut replicator = Replicator::new(
            Medium::Audio,
            tmp.path(),
            Vec::<RecipeSource>::new(),
            MockRunner::new(),
        )
        .unwrap();
        replicator
            .generate_templates(&["sine", "noise", "sine"], &TemplateOptions::default())
            .unwrap();
        let names: Vec<&str> = replicator.templates().iter().map(Template::name).collect();
        assert_eq!(names, vec!["sine", "noise"]);
        assert_eq!(replicator.runner().commands().len(), 2);
    }

    #[test]
    fn unknown_template_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut replicator = Replicator::new(
            Medium::Image,
            tmp.path(),
            Vec::<RecipeSource>::new(),
            MockRunner::new(),
        )
        .unwrap();
        let result = replicator.generate_templates(&["sine"], &TemplateOptions::default());
        assert!(matches!(
            result,
            Err(ReplicatorError::Template(TemplateError::Unknown { .. }))
        ));
    }

    #[test]
    fn drop_removes_templates() {
        let tmp = TempDir::new().unwrap();
        let file = {
            let mut replicator = Replicator::new(
                Medium::Video,
                tmp.path(),
                Vec::<RecipeSource>::new(),
                MockRunner::new(),
            )
            .unwrap();
            replicator
                .generate_templates(&["test"], &TemplateOptions::default())
                .unwrap();
            let file = replicator.templates()[0].file().to_path_buf();
            assert!(file.exists());
            file
        };
        assert!(!file.exists());
    }

    // =========================================================================
    // Full pipeline
    // =========================================================================

    #[test]
    fn pipeline_removes_templates_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("output");
        let sources = write_recipes(tmp.path(), &[SAMPLE_PARAM_RECIPE]);
        let mut replicator =
            Replicator::new(Medium::Video, &dest, sources, MockRunner::new()).unwrap();
        replicator
            .generate_templates(&["noise", "solid"], &TemplateOptions::default())
            .unwrap();
        assert_eq!(replicator.generate_corpus().unwrap(), 4);
        replicator.remove_templates();

        // the mock writes flags only, so both templates produce the same files
        let stats = replicator.remove_duplicates().unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(
            corpus_files(&dest),
            vec![
                "video-h264-libx264-noise-param-00.mp4",
                "video-h264-libx264-noise-param-01.mp4",
            ]
        );
    }

    #[test]
    fn unavailable_tool_aborts_generation() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_IMAGE_RECIPE]);
        let mut replicator =
            Replicator::new(Medium::Image, tmp.path(), sources, MockRunner::unavailable())
                .unwrap();
        replicator
            .generate_templates(&["solid"], &TemplateOptions::default())
            .unwrap();
        let err = replicator.generate_corpus().unwrap_err();
        assert_eq!(err.to_string(), "ImageMagick is not available");
    }

    #[test]
    fn tool_failure_aborts_generation() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_PARAM_RECIPE]);
        // call 0 synthesizes the template
        let mut replicator =
            Replicator::new(Medium::Video, tmp.path(), sources, MockRunner::failing_on(2))
                .unwrap();
        replicator
            .generate_templates(&["noise"], &TemplateOptions::default())
            .unwrap();
        let result = replicator.generate_corpus();
        assert!(matches!(
            result,
            Err(ReplicatorError::Tool(ToolError::Failed { .. }))
        ));
        assert_eq!(replicator.runner().commands().len(), 3);
    }

    #[test]
    fn interrupt_stops_before_next_invocation() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_PARAM_RECIPE]);
        let flag = Arc::new(AtomicBool::new(false));
        let mut replicator =
            Replicator::new(Medium::Video, tmp.path(), sources, MockRunner::new())
                .unwrap()
                .with_interrupt(flag.clone());
        replicator
            .generate_templates(&["noise"], &TemplateOptions::default())
            .unwrap();
        let template = replicator.templates()[0].file().to_path_buf();
        assert!(template.exists());
        flag.store(true, Ordering::SeqCst);
        let result = replicator.generate_corpus();
        assert!(matches!(result, Err(ReplicatorError::Interrupted)));
        assert_eq!(replicator.runner().commands().len(), 1);
        drop(replicator);
        assert!(!template.exists());
    }

    #[test]
    fn interrupted_tool_ends_run() {
        let tmp = TempDir::new().unwrap();
        let sources = write_recipes(tmp.path(), &[SAMPLE_PARAM_RECIPE]);
        let mut replicator =
            Replicator::new(Medium::Video, tmp.path(), sources, MockRunner::interrupted_on(1))
                .unwrap();
        replicator
            .generate_templates(&["noise"], &TemplateOptions::default())
            .unwrap();
        let template = replicator.templates()[0].file().to_path_buf();
        let result = replicator.generate_corpus();
        assert!(matches!(result, Err(ReplicatorError::Interrupted)));
        assert_eq!(replicator.runner().commands().len(), 2);
        drop(replicator);
        assert!(!template.exists());
    }

    #[test]
    fn interrupted_template_synthesis_ends_run() {
        let tmp = TempDir::new().unwrap();
        let mut replicator = Replicator::new(
            Medium::Video,
            tmp.path(),
            Vec::<RecipeSource>::new(),
            MockRunner::interrupted_on(0),
        )
        .unwrap();
        let result = replicator.generate_templates(&["noise"], &TemplateOptions::default());
        assert!(matches!(result, Err(ReplicatorError::Interrupted)));
        assert!(replicator.templates().is_empty());
    }
}
