//! Template input files.
//!
//! A [`Template`] is the source media every variation of a recipe is encoded
//! from. Templates are either supplied by the user or synthesized with FFmpeg
//! from one of a few built-in patterns:
//!
//! | Medium | Patterns |
//! |---|---|
//! | audio | `noise`, `silence`, `sine`, `test` |
//! | image | `noise`, `solid`, `test` |
//! | video / animation | `noise`, `solid`, `test` |
//!
//! Synthesized files are written next to the corpus and must be removed
//! before deduplication runs; [`Template::remove`] is idempotent.

use crate::generate::Tool;
use crate::process::{ToolError, ToolRunner};
use crate::recipe::Medium;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub const AUDIO_TEMPLATES: &[&str] = &["noise", "silence", "sine", "test"];
pub const IMAGE_TEMPLATES: &[&str] = &["noise", "solid", "test"];
pub const VIDEO_TEMPLATES: &[&str] = &["noise", "solid", "test"];

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unknown {medium} template '{name}'")]
    Unknown { medium: Medium, name: String },
    #[error("Invalid resolution '{0}'")]
    InvalidResolution(String),
    #[error("Template requires a positive duration")]
    InvalidDuration,
    #[error("Template requires a positive duration or frame count")]
    InvalidLength,
    #[error("Template generation failed: {0}")]
    Tool(#[from] ToolError),
}

/// An input file and the name used for it in corpus filenames.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    file: PathBuf,
}

impl Template {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Delete the template file. A file that is already gone is not an error.
    pub fn remove(&self) -> io::Result<()> {
        debug!("removing template '{}'", self.file.display());
        match std::fs::remove_file(&self.file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Frame size in the form `WIDTHxHEIGHT`, both positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 768,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TemplateError::InvalidResolution(s.to_string());
        let lower = s.to_lowercase();
        let (width, height) = lower.split_once('x').ok_or_else(invalid)?;
        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Whether `value` is a valid `WIDTHxHEIGHT` resolution.
pub fn is_resolution(value: &str) -> bool {
    value.parse::<Resolution>().is_ok()
}

/// Medium specific options for synthesized templates.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOptions {
    /// Runtime in seconds (audio, video).
    pub duration: f64,
    /// Frame count, 0 for no limit (video, animation).
    pub frames: u32,
    /// Frame size (image, video, animation).
    pub resolution: Resolution,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            duration: 1.0,
            frames: 0,
            resolution: Resolution::default(),
        }
    }
}

/// Template patterns available for `medium`. Animation shares video patterns.
pub fn template_names(medium: Medium) -> &'static [&'static str] {
    match medium {
        Medium::Audio => AUDIO_TEMPLATES,
        Medium::Image => IMAGE_TEMPLATES,
        Medium::Animation | Medium::Video => VIDEO_TEMPLATES,
    }
}

/// Synthesize a template for `medium` into `dest`.
pub fn synthesize(
    medium: Medium,
    name: &str,
    dest: &Path,
    options: &TemplateOptions,
    runner: &(impl ToolRunner + ?Sized),
) -> Result<Template, TemplateError> {
    match medium {
        Medium::Audio => generate_audio(name, dest, options.duration, runner),
        Medium::Image => generate_image(name, dest, options.resolution, runner),
        Medium::Animation | Medium::Video => generate_video(
            name,
            dest,
            options.duration,
            options.frames,
            options.resolution,
            runner,
        ),
    }
}

fn check_name(medium: Medium, name: &str) -> Result<(), TemplateError> {
    if template_names(medium).contains(&name) {
        Ok(())
    } else {
        Err(TemplateError::Unknown {
            medium,
            name: name.to_string(),
        })
    }
}

fn lavfi_command(source: String) -> Vec<OsString> {
    [Tool::Ffmpeg.binary(), "-y", "-f", "lavfi", "-i"]
        .into_iter()
        .map(OsString::from)
        .chain([OsString::from(source)])
        .collect()
}

fn push_args(cmd: &mut Vec<OsString>, args: &[&str]) {
    cmd.extend(args.iter().map(OsString::from));
}

/// Generate a WAV audio template.
pub fn generate_audio(
    name: &str,
    dest: &Path,
    duration: f64,
    runner: &(impl ToolRunner + ?Sized),
) -> Result<Template, TemplateError> {
    check_name(Medium::Audio, name)?;
    if duration <= 0.0 {
        return Err(TemplateError::InvalidDuration);
    }
    let source = match name {
        "noise" => "anoisesrc=a=0.1:c=white",
        "silence" => "anullsrc",
        "sine" => "sine=frequency=880",
        _ => "aevalsrc=sin(2*PI*(360-2.5/2)*t)|sin(2*PI*(360+2.5/2)*t)",
    };
    let mut cmd = lavfi_command(source.to_string());
    push_args(&mut cmd, &["-c:a", "pcm_s16le", "-t", &format!("{duration:.0}")]);
    let file = dest.join(format!("template-audio-{name}.wav"));
    cmd.push(file.clone().into_os_string());
    runner.run(&cmd)?;
    Ok(Template::new(name, file))
}

/// Generate a single-frame PNG image template.
pub fn generate_image(
    name: &str,
    dest: &Path,
    resolution: Resolution,
    runner: &(impl ToolRunner + ?Sized),
) -> Result<Template, TemplateError> {
    check_name(Medium::Image, name)?;
    let source = match name {
        "noise" => format!("color=c=gray:s={resolution}, noise=alls=100:allf=t"),
        "solid" => "color=c=red".to_string(),
        _ => format!("testsrc=s={resolution}"),
    };
    let mut cmd = lavfi_command(source);
    push_args(&mut cmd, &["-frames", "1"]);
    let file = dest.join(format!("template-image-{name}-{resolution}.png"));
    cmd.push(file.clone().into_os_string());
    runner.run(&cmd)?;
    Ok(Template::new(name, file))
}

/// Generate an H.264 MP4 video template, limited by `frames` when non-zero,
/// otherwise by `duration`.
pub fn generate_video(
    name: &str,
    dest: &Path,
    duration: f64,
    frames: u32,
    resolution: Resolution,
    runner: &(impl ToolRunner + ?Sized),
) -> Result<Template, TemplateError> {
    check_name(Medium::Video, name)?;
    if duration <= 0.0 && frames == 0 {
        return Err(TemplateError::InvalidLength);
    }
    let source = match name {
        "noise" => format!("color=c=gray:s={resolution}, noise=alls=100:allf=t"),
        "solid" => "color=c=red".to_string(),
        _ => format!("testsrc2=s={resolution}"),
    };
    let mut cmd = lavfi_command(source);
    push_args(&mut cmd, &["-pix_fmt", "yuv420p", "-c:v", "libx264"]);
    if frames > 0 {
        push_args(&mut cmd, &["-frames", &frames.to_string()]);
    } else {
        push_args(&mut cmd, &["-t", &format!("{duration:.0}")]);
    }
    push_args(&mut cmd, &["-crf", "17"]);
    let file = dest.join(format!("template-video-{name}-{resolution}.mp4"));
    cmd.push(file.clone().into_os_string());
    runner.run(&cmd)?;
    Ok(Template::new(name, file))
}
