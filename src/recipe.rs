//! Recipe loading, validation, and variation expansion.
//!
//! A recipe is a YAML document describing how to encode a template with an
//! external tool. The `base` section names the encoder configuration and the
//! `variation` section lists named groups of alternative flag-sets:
//!
//! ```yaml
//! base:
//!   codec: "mp3"
//!   container: "mp3"
//!   library: "libmp3lame"
//!   medium: "audio"
//!   tool: "ffmpeg"
//!   default_flags:
//!     encoder: ["-c:a", "libmp3lame"]
//!     duration: ["-t", "1"]
//!
//! variation:
//!   vbr:
//!   - ["-q:a", "0"]
//!   - ["-q:a", "9"]
//!   duration:
//!   - ["-t", "2"]
//! ```
//!
//! ## Expansion
//!
//! Iterating a recipe yields one [`Variation`] per flag-set, in group order
//! then flag-set order. The resolved flags of a variation are every default
//! group's tokens (in declaration order) followed by the flag-set itself.
//! The default group that shares its name with the variation group is left
//! out, so a variation group replaces its namesake. In the example above the
//! `duration` variation runs with `-c:a libmp3lame -t 2`, never `-t 1`.
//!
//! ## Validation
//!
//! Documents are deserialized into a loose structure first, then checked in a
//! fixed order so each failure names the offending field. Error messages are
//! stable and double as the recipe format's diagnostics contract.

use crate::generate::Tool;
use crate::naming::is_filesystem_safe;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("Recipe file does not exist: '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("Unable to read recipe '{path}': {source}", path = .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid YAML file ({0})")]
    InvalidDocument(String),
    #[error("Recipe missing entry '{0}'")]
    MissingEntry(&'static str),
    #[error("Recipe '{0}' entry is invalid")]
    InvalidEntry(String),
    #[error("Recipe 'default_flags' is invalid")]
    InvalidDefaultFlags,
    #[error("Recipe 'default_flags' name '{0}' is invalid")]
    InvalidDefaultFlagsName(String),
    #[error("Recipe 'default_flags' '{0}' is incomplete")]
    IncompleteDefaultFlags(String),
    #[error("Recipe 'default_flags' '{0}' is invalid")]
    InvalidDefaultFlagsGroup(String),
    #[error("Recipe 'default_flags' '{0}' has invalid flags")]
    InvalidDefaultFlagsTokens(String),
    #[error("Recipe missing variations")]
    MissingVariations,
    #[error("Recipe variation name '{0}' is invalid")]
    InvalidVariationName(String),
    #[error("Recipe variation '{0}' is incomplete")]
    IncompleteVariation(String),
    #[error("Recipe variation '{0}' is invalid")]
    InvalidVariation(String),
    #[error("Recipe variation '{0}' has invalid flags")]
    InvalidVariationTokens(String),
    #[error("Recipe medium '{0}' unsupported")]
    UnsupportedMedium(String),
    #[error("Recipe tool '{0}' unsupported")]
    UnsupportedTool(String),
}

/// Kind of content a recipe produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Medium {
    Animation,
    Audio,
    Image,
    Video,
}

impl Medium {
    pub const ALL: [Medium; 4] = [Medium::Animation, Medium::Audio, Medium::Image, Medium::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            Medium::Animation => "animation",
            Medium::Audio => "audio",
            Medium::Image => "image",
            Medium::Video => "video",
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Medium {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Medium::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RecipeError::UnsupportedMedium(s.to_string()))
    }
}

/// Named list of flag tokens from `base.default_flags`.
#[derive(Debug, Clone, PartialEq)]
struct FlagGroup {
    name: String,
    flags: Vec<String>,
}

/// Named list of alternative flag-sets from `variation`.
#[derive(Debug, Clone, PartialEq)]
struct VariationGroup {
    name: String,
    flag_sets: Vec<Vec<String>>,
}

/// One expanded entry of a recipe: a flag-set with the defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation<'a> {
    /// Variation group name (used in output filenames).
    pub group: &'a str,
    /// Position of the flag-set inside its group.
    pub index: usize,
    /// Default flags followed by the flag-set's own tokens.
    pub flags: Vec<String>,
}

/// A validated recipe. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    codec: String,
    container: String,
    library: String,
    medium: Medium,
    tool: Tool,
    default_flags: Vec<FlagGroup>,
    variations: Vec<VariationGroup>,
}

/// Top level of a recipe document. Fields use [`present`] so that an explicit
/// `null` is distinguishable from a missing key.
#[derive(Debug, Default, Deserialize)]
struct RecipeDocument {
    #[serde(default, deserialize_with = "present")]
    base: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    variation: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BaseSection {
    #[serde(default, deserialize_with = "present")]
    codec: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    container: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    library: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    medium: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    tool: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    default_flags: Option<Value>,
    /// Keys beyond the known ones, held to the same scalar rule.
    #[serde(flatten)]
    extra: Mapping,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Recipe {
    /// Load and validate a recipe file.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        debug!("loading recipe '{}'", path.display());
        let bytes = std::fs::read(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text =
            String::from_utf8(bytes).map_err(|e| RecipeError::InvalidDocument(e.to_string()))?;
        text.parse()
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Variation group names in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.variations.iter().map(|g| g.name.as_str())
    }

    /// Number of variations, i.e. the number of flag-sets across all groups.
    pub fn len(&self) -> usize {
        self.variations.iter().map(|g| g.flag_sets.len()).sum()
    }

    /// Always false for a validated recipe.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the recipe into its variations. See the [module docs](self).
    pub fn iter(&self) -> impl Iterator<Item = Variation<'_>> {
        self.variations.iter().flat_map(move |group| {
            let base: Vec<&str> = self
                .default_flags
                .iter()
                .filter(|defaults| defaults.name != group.name)
                .flat_map(|defaults| defaults.flags.iter().map(String::as_str))
                .collect();
            group
                .flag_sets
                .iter()
                .enumerate()
                .map(move |(index, flag_set)| Variation {
                    group: &group.name,
                    index,
                    flags: base
                        .iter()
                        .map(|token| token.to_string())
                        .chain(flag_set.iter().cloned())
                        .collect(),
                })
        })
    }
}

impl<'a> IntoIterator for &'a Recipe {
    type Item = Variation<'a>;
    type IntoIter = Box<dyn Iterator<Item = Variation<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromStr for Recipe {
    type Err = RecipeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str::<Value>(text)
                .map_err(|e| RecipeError::InvalidDocument(e.to_string()))?
        };
        let document = match value {
            Value::Null => RecipeDocument::default(),
            Value::Mapping(_) => serde_yaml::from_value(value)
                .map_err(|e| RecipeError::InvalidDocument(e.to_string()))?,
            _ => {
                return Err(RecipeError::InvalidDocument(
                    "document is not a mapping".into(),
                ));
            }
        };
        validate(document)
    }
}

fn validate(document: RecipeDocument) -> Result<Recipe, RecipeError> {
    let base = match document.base {
        None => return Err(RecipeError::MissingEntry("base")),
        Some(value @ Value::Mapping(_)) => serde_yaml::from_value::<BaseSection>(value)
            .map_err(|_| RecipeError::InvalidEntry("base".into()))?,
        Some(_) => return Err(RecipeError::InvalidEntry("base".into())),
    };

    let codec = base.codec.ok_or(RecipeError::MissingEntry("codec"))?;
    let container = base.container.ok_or(RecipeError::MissingEntry("container"))?;
    let library = base.library.ok_or(RecipeError::MissingEntry("library"))?;
    let medium = base.medium.ok_or(RecipeError::MissingEntry("medium"))?;
    let tool = base.tool.ok_or(RecipeError::MissingEntry("tool"))?;
    let variation = document
        .variation
        .ok_or(RecipeError::MissingEntry("variation"))?;

    let codec = safe_scalar("codec", codec)?;
    let container = safe_scalar("container", container)?;
    let library = safe_scalar("library", library)?;
    let medium = safe_scalar("medium", medium)?;
    let tool = safe_scalar("tool", tool)?;
    for (key, value) in base.extra {
        let key = describe(&key);
        match value {
            Value::String(s) if is_filesystem_safe(&s) => {}
            _ => return Err(RecipeError::InvalidEntry(key)),
        }
    }

    let default_flags = parse_default_flags(base.default_flags)?;
    let variations = parse_variations(variation)?;

    Ok(Recipe {
        codec,
        container,
        library,
        medium: medium.parse()?,
        tool: tool.parse()?,
        default_flags,
        variations,
    })
}

fn safe_scalar(field: &'static str, value: Value) -> Result<String, RecipeError> {
    match value {
        Value::String(s) if is_filesystem_safe(&s) => Ok(s),
        _ => Err(RecipeError::InvalidEntry(field.into())),
    }
}

fn parse_default_flags(value: Option<Value>) -> Result<Vec<FlagGroup>, RecipeError> {
    let mapping = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Mapping(mapping)) => mapping,
        Some(_) => return Err(RecipeError::InvalidDefaultFlags),
    };
    let mut groups = Vec::with_capacity(mapping.len());
    for (key, flags) in mapping {
        let name = group_name(&key)
            .ok_or_else(|| RecipeError::InvalidDefaultFlagsName(describe(&key)))?;
        if is_blank(&flags) {
            return Err(RecipeError::IncompleteDefaultFlags(name));
        }
        let Value::Sequence(tokens) = flags else {
            return Err(RecipeError::InvalidDefaultFlagsGroup(name));
        };
        let Some(flags) = string_tokens(tokens) else {
            return Err(RecipeError::InvalidDefaultFlagsTokens(name));
        };
        groups.push(FlagGroup { name, flags });
    }
    Ok(groups)
}

fn parse_variations(value: Value) -> Result<Vec<VariationGroup>, RecipeError> {
    let mapping: Mapping = match value {
        Value::Null => return Err(RecipeError::MissingVariations),
        Value::Mapping(mapping) if mapping.is_empty() => {
            return Err(RecipeError::MissingVariations);
        }
        Value::Mapping(mapping) => mapping,
        _ => return Err(RecipeError::InvalidEntry("variation".into())),
    };
    let mut groups = Vec::with_capacity(mapping.len());
    for (key, entry) in mapping {
        let name =
            group_name(&key).ok_or_else(|| RecipeError::InvalidVariationName(describe(&key)))?;
        if is_blank(&entry) {
            return Err(RecipeError::IncompleteVariation(name));
        }
        let Value::Sequence(entries) = entry else {
            return Err(RecipeError::InvalidVariation(name));
        };
        let mut flag_sets = Vec::with_capacity(entries.len());
        for flags in entries {
            if is_blank(&flags) {
                return Err(RecipeError::IncompleteVariation(name));
            }
            let Value::Sequence(tokens) = flags else {
                return Err(RecipeError::InvalidVariation(name));
            };
            let Some(tokens) = string_tokens(tokens) else {
                return Err(RecipeError::InvalidVariationTokens(name));
            };
            flag_sets.push(tokens);
        }
        groups.push(VariationGroup { name, flag_sets });
    }
    Ok(groups)
}

/// A group name must be a filesystem-safe string key.
fn group_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) if is_filesystem_safe(s) => Some(s.clone()),
        _ => None,
    }
}

/// Render a mapping key for an error message.
fn describe(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        _ => false,
    }
}

fn string_tokens(tokens: Vec<Value>) -> Option<Vec<String>> {
    tokens
        .into_iter()
        .map(|token| match token {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}
