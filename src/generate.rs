//! Corpus generation: one recipe applied to a set of templates.
//!
//! A [`CorpusGenerator`] pairs every template it holds with every variation
//! of its recipe and runs the recipe's [`Tool`] once per pair. Output files
//! are named by [`CorpusName`](crate::naming::CorpusName):
//!
//! ```text
//! generated-corpus/
//! ├── video-h264-libx264-noise-preset-00.mp4
//! ├── video-h264-libx264-noise-preset-01.mp4
//! └── video-h264-libx264-noise-resolution-00.mp4
//! ```
//!
//! ## Supported tools
//!
//! | Tool | Binary | Command |
//! |---|---|---|
//! | `ffmpeg` | `ffmpeg` | `ffmpeg -i <template> -y <flags...> <dest>` |
//! | `imagemagick` | `convert` | `convert <template> <flags...> <dest>` |
//!
//! The destination path is always the last argument. Adding a tool means
//! adding a [`Tool`] variant and its command layout.

use crate::naming::CorpusName;
use crate::process::{ToolError, ToolRunner};
use crate::recipe::{Recipe, RecipeError, Variation};
use crate::template::Template;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// External tool a recipe is encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    ImageMagick,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::ImageMagick];

    /// Name used by the `tool` entry of a recipe.
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::ImageMagick => "imagemagick",
        }
    }

    /// Executable looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::ImageMagick => "convert",
        }
    }

    /// Assemble the command that encodes `input` with `flags` into `dest`.
    pub fn command(self, input: &Path, flags: &[String], dest: &Path) -> Vec<OsString> {
        let mut cmd = vec![OsString::from(self.binary())];
        match self {
            Tool::Ffmpeg => {
                cmd.push("-i".into());
                cmd.push(input.into());
                cmd.push("-y".into());
            }
            Tool::ImageMagick => cmd.push(input.into()),
        }
        cmd.extend(flags.iter().map(OsString::from));
        cmd.push(dest.into());
        cmd
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tool::Ffmpeg => "FFmpeg",
            Tool::ImageMagick => "ImageMagick",
        })
    }
}

impl FromStr for Tool {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RecipeError::UnsupportedTool(s.to_string()))
    }
}

/// Applies one recipe to the templates added to it.
pub struct CorpusGenerator<'a, R: ToolRunner + ?Sized> {
    recipe: &'a Recipe,
    dest: PathBuf,
    templates: Vec<&'a Template>,
    runner: &'a R,
}

impl<'a, R: ToolRunner + ?Sized> CorpusGenerator<'a, R> {
    pub fn new(recipe: &'a Recipe, dest: impl Into<PathBuf>, runner: &'a R) -> Self {
        Self {
            recipe,
            dest: dest.into(),
            templates: Vec::new(),
            runner,
        }
    }

    /// Append a template. Templates are processed in the order they are added.
    pub fn add_template(&mut self, template: &'a Template) {
        self.templates.push(template);
    }

    /// `medium/library/codec/container`, for log output.
    pub fn description(&self) -> String {
        [
            self.recipe.medium().as_str(),
            self.recipe.library(),
            self.recipe.codec(),
            self.recipe.container(),
        ]
        .join("/")
    }

    /// Lazily encode every (template, variation) pair.
    ///
    /// Each item is the destination path of a file the tool produced. A tool
    /// failure is yielded as an error and ends the sequence; files written
    /// before the failure are left in place.
    pub fn generate(&self) -> impl Iterator<Item = Result<PathBuf, ToolError>> + '_ {
        let mut failed = false;
        self.templates
            .iter()
            .flat_map(move |template| {
                self.recipe
                    .iter()
                    .map(move |variation| (*template, variation))
            })
            .map_while(move |(template, variation)| {
                if failed {
                    return None;
                }
                let result = self.encode(template, &variation);
                failed = result.is_err();
                Some(result)
            })
    }

    fn encode(&self, template: &Template, variation: &Variation<'_>) -> Result<PathBuf, ToolError> {
        let name = CorpusName {
            medium: self.recipe.medium().as_str(),
            codec: self.recipe.codec(),
            library: self.recipe.library(),
            template: template.name(),
            group: variation.group,
            index: variation.index,
            container: self.recipe.container(),
        };
        let dest = self.dest.join(name.file_name());
        let cmd = self
            .recipe
            .tool()
            .command(template.file(), &variation.flags, &dest);
        self.runner.run(&cmd)?;
        Ok(dest)
    }
}

/// Create a generator for `recipe`, checking that its tool is installed
/// before anything touches the filesystem.
pub fn load_generator<'a, R: ToolRunner + ?Sized>(
    recipe: &'a Recipe,
    dest: &Path,
    runner: &'a R,
) -> Result<CorpusGenerator<'a, R>, ToolError> {
    let tool = recipe.tool();
    if !runner.is_available(tool.binary()) {
        return Err(ToolError::Unavailable(tool));
    }
    Ok(CorpusGenerator::new(recipe, dest, runner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockRunner, SAMPLE_PARAM_RECIPE, SAMPLE_VIDEO_RECIPE};
    use tempfile::TempDir;

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn tool_names_round_trip() {
        assert_eq!("ffmpeg".parse::<Tool>().unwrap(), Tool::Ffmpeg);
        assert_eq!("imagemagick".parse::<Tool>().unwrap(), Tool::ImageMagick);
        let err = "gimp".parse::<Tool>().unwrap_err();
        assert_eq!(err.to_string(), "Recipe tool 'gimp' unsupported");
    }

    #[test]
    fn ffmpeg_command_layout() {
        let cmd = Tool::Ffmpeg.command(
            Path::new("in.wav"),
            &["-c:a".to_string(), "mp3".to_string()],
            Path::new("out.mp3"),
        );
        assert_eq!(cmd, ["ffmpeg", "-i", "in.wav", "-y", "-c:a", "mp3", "out.mp3"]);
    }

    #[test]
    fn imagemagick_command_layout() {
        let cmd = Tool::ImageMagick.command(
            Path::new("in.png"),
            &["-quality".to_string(), "10".to_string()],
            Path::new("out.jpg"),
        );
        assert_eq!(cmd, ["convert", "in.png", "-quality", "10", "out.jpg"]);
    }

    #[test]
    fn description_lists_recipe_fields() {
        let recipe: Recipe = SAMPLE_VIDEO_RECIPE.parse().unwrap();
        let runner = MockRunner::new();
        let generator = CorpusGenerator::new(&recipe, "out", &runner);
        assert_eq!(generator.description(), "video/libx264/h264/mp4");
    }

    #[test]
    fn generates_one_file_per_template_and_variation() {
        let tmp = TempDir::new().unwrap();
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
        let runner = MockRunner::new();
        let t1 = Template::new("template01", tmp.path().join("template.bin"));
        let t2 = Template::new("template02", tmp.path().join("template.bin"));

        let mut generator = CorpusGenerator::new(&recipe, tmp.path().join("output"), &runner);
        generator.add_template(&t1);
        generator.add_template(&t2);

        let corpus: Vec<PathBuf> = generator.generate().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            file_names(&corpus),
            vec![
                "video-h264-libx264-template01-param-00.mp4",
                "video-h264-libx264-template01-param-01.mp4",
                "video-h264-libx264-template02-param-00.mp4",
                "video-h264-libx264-template02-param-01.mp4",
            ]
        );
        assert!(corpus.iter().all(|p| p.exists()));
    }

    #[test]
    fn variation_flags_reach_the_tool() {
        let tmp = TempDir::new().unwrap();
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
        let runner = MockRunner::new();
        let template = Template::new("t", tmp.path().join("template.bin"));
        let mut generator = CorpusGenerator::new(&recipe, tmp.path(), &runner);
        generator.add_template(&template);
        generator.generate().for_each(|r| {
            r.unwrap();
        });

        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(&commands[0][4..6], &["-an", "flags-1"]);
        assert_eq!(&commands[1][4..6], &["-an", "flags-2"]);
        assert!(commands.iter().all(|c| !c.contains(&"overwrite-me".to_string())));
        assert!(commands[0].last().unwrap().ends_with("video-h264-libx264-t-param-00.mp4"));
    }

    #[test]
    fn generation_is_lazy() {
        let tmp = TempDir::new().unwrap();
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
        let runner = MockRunner::new();
        let template = Template::new("t", tmp.path().join("template.bin"));
        let mut generator = CorpusGenerator::new(&recipe, tmp.path(), &runner);
        generator.add_template(&template);

        let mut files = generator.generate();
        assert!(runner.commands().is_empty());
        files.next().unwrap().unwrap();
        assert_eq!(runner.commands().len(), 1);
    }

    #[test]
    fn failure_ends_generation() {
        let tmp = TempDir::new().unwrap();
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
        let runner = MockRunner::failing_on(1);
        let template = Template::new("t", tmp.path().join("template.bin"));
        let mut generator = CorpusGenerator::new(&recipe, tmp.path(), &runner);
        generator.add_template(&template);
        generator.add_template(&template);

        let results: Vec<_> = generator.generate().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ToolError::Failed { .. })));
        assert_eq!(runner.commands().len(), 2);
        // the file written before the failure is kept
        assert!(results[0].as_ref().unwrap().exists());
    }

    #[test]
    fn no_templates_generates_nothing() {
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
        let runner = MockRunner::new();
        let generator = CorpusGenerator::new(&recipe, "unused", &runner);
        assert_eq!(generator.generate().count(), 0);
    }

    #[test]
    fn load_generator_checks_availability() {
        let tmp = TempDir::new().unwrap();
        let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();

        let runner = MockRunner::new();
        assert!(load_generator(&recipe, tmp.path(), &runner).is_ok());

        let runner = MockRunner::unavailable();
        let err = load_generator(&recipe, tmp.path(), &runner).err().unwrap();
        assert!(matches!(err, ToolError::Unavailable(Tool::Ffmpeg)));
        assert_eq!(err.to_string(), "FFmpeg is not available");
    }
}
