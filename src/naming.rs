//! Centralized naming rules for recipe identifiers and corpus files.
//!
//! Every identifier that ends up in an output filename (codec, container,
//! library, flag group names) must be filesystem safe: one or more ASCII
//! letters, digits or dashes. Corpus files are then named by joining the
//! identifying parts with a dash:
//!
//! ```text
//! <medium>-<codec>-<library>-<template>-<group>-<NN>.<container>
//! video-h264-libx264-noise-resolution-00.mp4
//! ```
//!
//! The two-digit index is the position of the flag-set inside its group,
//! which keeps the names collision-free for a single recipe/template pair.

/// Separator placed between the parts of a corpus filename.
pub const SEPARATOR: &str = "-";

/// Check whether `name` matches `[a-zA-Z0-9-]+`.
pub fn is_filesystem_safe(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Identifying parts of a single corpus file.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusName<'a> {
    pub medium: &'a str,
    pub codec: &'a str,
    pub library: &'a str,
    pub template: &'a str,
    pub group: &'a str,
    pub index: usize,
    pub container: &'a str,
}

impl CorpusName<'_> {
    /// Build the filename, e.g. `audio-mp3-libmp3lame-sine-vbr-03.mp3`.
    pub fn file_name(&self) -> String {
        [
            self.medium,
            self.codec,
            self.library,
            self.template,
            self.group,
            &format!("{:02}.{}", self.index, self.container),
        ]
        .join(SEPARATOR)
    }
}
