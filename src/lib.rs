//! # Corpus Replicator
//!
//! Generates parameterized corpora of media files for fuzzing and regression
//! testing. A declarative recipe names an encoder configuration and groups of
//! alternative flag-sets; every flag-set is applied to every template input by
//! running an external tool (FFmpeg or ImageMagick) once per combination.
//!
//! # Pipeline
//!
//! ```text
//! 1. Load        recipes/*.yml  →  Recipe        (parse + validate)
//! 2. Templates   lavfi pattern  →  Template      (synthesized inputs)
//! 3. Generate    Recipe × Template → dest/       (one tool run per variation)
//! 4. Clean up    dest/          →  dest/         (templates + duplicates removed)
//! ```
//!
//! Tool invocations are strictly sequential. Each one blocks until the tool
//! exits or its timeout elapses; combined output goes to a log file that is
//! kept only when the tool fails.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`recipe`] | Recipe parsing, validation, and variation expansion |
//! | [`builtin`] | Recipes embedded in the binary and recipe source resolution |
//! | [`template`] | Template inputs and their synthesis with FFmpeg |
//! | [`generate`] | `Tool` dispatch and `CorpusGenerator` (recipe × templates) |
//! | [`replicator`] | Full pipeline across many recipes and templates |
//! | [`dedup`] | Byte-exact duplicate removal in the output directory |
//! | [`process`] | `ToolRunner` trait and the subprocess implementation |
//! | [`naming`] | Corpus file naming and the filesystem-safe name rule |
//! | [`config`] | `replicator.toml` loading, merging, and validation |
//! | [`logging`] | `tracing` subscriber setup for the binary |
//! | [`output`] | CLI output formatting: recipe listing and run summary |
//!
//! # Design Decisions
//!
//! ## Tools Behind a Trait
//!
//! Nothing outside [`process`] spawns a process. Generators and template
//! synthesis take a [`process::ToolRunner`], so the whole pipeline runs in
//! tests against a recording mock without FFmpeg installed.
//!
//! ## Closed Tool Set
//!
//! The supported tools are a [`generate::Tool`] enum. A recipe naming another
//! tool fails validation; adding a tool means adding a variant and its
//! command layout.
//!
//! ## Deterministic Output
//!
//! Corpus file names are derived from the recipe and template only
//! (`medium-codec-library-template-group-NN.container`), and deduplication
//! visits files in name order, so the same inputs always produce the same
//! corpus.

pub mod builtin;
pub mod config;
pub mod dedup;
pub mod generate;
pub mod logging;
pub mod naming;
pub mod output;
pub mod process;
pub mod recipe;
pub mod replicator;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
