//! Recipes shipped inside the binary.
//!
//! Built-in recipes live in `recipes/*.yml` and are embedded at compile time.
//! On the command line a recipe argument is first looked up by built-in file
//! name (`video-h264-libx264.yml`) and only then treated as a path.

use crate::recipe::{Recipe, RecipeError};
use std::fmt;
use std::path::{Path, PathBuf};

/// A recipe document compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinRecipe {
    pub name: &'static str,
    pub source: &'static str,
}

impl BuiltinRecipe {
    pub fn parse(&self) -> Result<Recipe, RecipeError> {
        self.source.parse()
    }
}

macro_rules! builtin {
    ($name:literal) => {
        BuiltinRecipe {
            name: $name,
            source: include_str!(concat!("../recipes/", $name)),
        }
    };
}

/// Every built-in recipe, sorted by name.
pub const BUILTIN_RECIPES: &[BuiltinRecipe] = &[
    builtin!("animation-gif-ffmpeg.yml"),
    builtin!("audio-flac-ffmpeg.yml"),
    builtin!("audio-mp3-libmp3lame.yml"),
    builtin!("audio-opus-libopus.yml"),
    builtin!("image-jpeg-imagemagick.yml"),
    builtin!("image-png-ffmpeg.yml"),
    builtin!("video-h264-libx264.yml"),
    builtin!("video-vp9-libvpx.yml"),
];

pub fn find_builtin(name: &str) -> Option<&'static BuiltinRecipe> {
    BUILTIN_RECIPES.iter().find(|r| r.name == name)
}

/// Where a recipe comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecipeSource {
    Builtin(&'static BuiltinRecipe),
    File(PathBuf),
}

impl RecipeSource {
    /// Resolve a command-line argument: built-in name first, then an
    /// existing file.
    pub fn resolve(arg: &str) -> Result<Self, RecipeError> {
        if let Some(builtin) = find_builtin(arg) {
            return Ok(RecipeSource::Builtin(builtin));
        }
        let path = Path::new(arg);
        if path.is_file() {
            Ok(RecipeSource::File(path.to_path_buf()))
        } else {
            Err(RecipeError::NotFound(path.to_path_buf()))
        }
    }

    pub fn load(&self) -> Result<Recipe, RecipeError> {
        match self {
            RecipeSource::Builtin(builtin) => builtin.parse(),
            RecipeSource::File(path) => Recipe::load(path),
        }
    }
}

impl fmt::Display for RecipeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeSource::Builtin(builtin) => f.write_str(builtin.name),
            RecipeSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<PathBuf> for RecipeSource {
    fn from(path: PathBuf) -> Self {
        RecipeSource::File(path)
    }
}

impl From<&'static BuiltinRecipe> for RecipeSource {
    fn from(builtin: &'static BuiltinRecipe) -> Self {
        RecipeSource::Builtin(builtin)
    }
}
