//! Shared test utilities for the corpus-replicator test suite.
//!
//! Provides sample recipe documents and [`MockRunner`], a [`ToolRunner`] that
//! records commands instead of spawning processes.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let runner = MockRunner::new();
//! let recipe: Recipe = SAMPLE_PARAM_RECIPE.parse().unwrap();
//! // ... run a generator with &runner ...
//! assert_eq!(runner.commands().len(), 2);
//! ```

use crate::process::{ToolError, ToolRunner, display_command};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// =========================================================================
// Sample recipes
// =========================================================================

/// Audio recipe with one default group and two variation groups (4 items).
pub const SAMPLE_AUDIO_RECIPE: &str = r#"
base:
  codec: "codec"
  container: "container"
  library: "library"
  medium: "audio"
  tool: "ffmpeg"
  default_flags:
    encoder:
      ["-c:a", "mp3"]

variation:
  vbr:
  - ["-vbr", "1"]
  - ["-vbr", "3"]
  - ["-vbr", "5"]
  cbr:
  - ["-b:a", "64k"]
"#;

/// Video recipe whose single variation group overrides a default group.
pub const SAMPLE_VIDEO_RECIPE: &str = r#"
base:
  codec: "h264"
  container: "mp4"
  library: "libx264"
  medium: "video"
  tool: "ffmpeg"
  default_flags:
    encoder:
      ["-foo", "bar"]
    resolution:
      ["overwrite-me"]

variation:
  resolution:
  - ["-s", "18x32"]
"#;

/// Video recipe with two flag-sets in a group that replaces its default.
pub const SAMPLE_PARAM_RECIPE: &str = r#"
base:
  codec: "h264"
  container: "mp4"
  library: "libx264"
  medium: "video"
  tool: "ffmpeg"
  default_flags:
    audio:
      ["-an"]
    param:
      ["overwrite-me"]

variation:
  param:
  - ["flags-1"]
  - ["flags-2"]
"#;

/// Image recipe for ImageMagick.
pub const SAMPLE_IMAGE_RECIPE: &str = r#"
base:
  codec: "jpeg"
  container: "jpg"
  library: "imagemagick"
  medium: "image"
  tool: "imagemagick"

variation:
  quality:
  - ["-quality", "10"]
  - ["-quality", "90"]
"#;

// =========================================================================
// Mock tool runner
// =========================================================================

/// Records every command and writes a small output file to the command's
/// last argument, like an encoder would. The file content is the command
/// without its binary, input and output, so variations with identical
/// flags produce identical files.
pub struct MockRunner {
    commands: Mutex<Vec<Vec<String>>>,
    available: bool,
    fail_on: Option<usize>,
    interrupt_on: Option<usize>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            available: true,
            fail_on: None,
            interrupt_on: None,
        }
    }

    /// Fail the call with the given zero-based index.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::new()
        }
    }

    /// Act as if the call with the given index was killed by an interrupt.
    pub fn interrupted_on(call: usize) -> Self {
        Self {
            interrupt_on: Some(call),
            ..Self::new()
        }
    }

    /// Report every tool as missing from `PATH`.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner for MockRunner {
    fn run(&self, command: &[OsString]) -> Result<(), ToolError> {
        let mut commands = self.commands.lock().unwrap();
        let call = commands.len();
        commands.push(
            command
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        );
        if self.interrupt_on == Some(call) {
            return Err(ToolError::Interrupted {
                program: command[0].to_string_lossy().into_owned(),
            });
        }
        if self.fail_on == Some(call) {
            return Err(ToolError::Failed {
                program: command[0].to_string_lossy().into_owned(),
                status: "exit status: 1".into(),
                log: PathBuf::from("mock-log.txt"),
            });
        }
        let dest = Path::new(command.last().ok_or(ToolError::EmptyCommand)?);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, output_content(command))?;
        Ok(())
    }

    fn is_available(&self, _binary: &str) -> bool {
        self.available
    }
}

/// Flags of a tool command: everything after the input file up to the output.
fn output_content(command: &[OsString]) -> String {
    let inner = &command[1..command.len() - 1];
    let flags: Vec<OsString> = inner
        .iter()
        .filter(|arg| !Path::new(arg).is_absolute())
        .cloned()
        .collect();
    display_command(&flags)
}
