//! CLI output formatting.
//!
//! Progress goes through `tracing`; this module renders the things a user
//! asked to see on stdout: the built-in recipe listing and the summary printed
//! at the end of a run.
//!
//! # Output Format
//!
//! ## Recipe listing
//!
//! ```text
//! Built-in recipes
//! audio
//!     audio-mp3-libmp3lame.yml  libmp3lame/mp3/mp3 (13 variations)
//! video
//!     video-h264-libx264.yml    libx264/h264/mp4 (16 variations)
//! ```
//!
//! ## Run summary
//!
//! ```text
//! Corpus: generated-corpus
//!     Recipes: 2
//!     Templates: 3
//!     Generated: 90 of 90 file(s)
//!     Duplicates: 4 removed, 86 kept
//! ```
//!
//! # Architecture
//!
//! Each listing has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::builtin::BuiltinRecipe;
use crate::dedup::DedupStats;
use crate::recipe::Medium;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Recipe listing
// ============================================================================

/// Built-in recipes grouped by medium, names padded to a common width.
pub fn format_recipe_list(recipes: &[BuiltinRecipe]) -> Vec<String> {
    let mut lines = vec!["Built-in recipes".to_string()];
    let width = recipes.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let parsed: Vec<_> = recipes.iter().map(|r| (r, r.parse())).collect();

    for medium in Medium::ALL {
        let entries: Vec<String> = parsed
            .iter()
            .filter_map(|(builtin, recipe)| match recipe {
                Ok(recipe) if recipe.medium() == medium => Some(format!(
                    "{}{:<width$}  {}/{}/{} ({} variations)",
                    indent(1),
                    builtin.name,
                    recipe.library(),
                    recipe.codec(),
                    recipe.container(),
                    recipe.len(),
                )),
                _ => None,
            })
            .collect();
        if !entries.is_empty() {
            lines.push(medium.to_string());
            lines.extend(entries);
        }
    }

    let invalid: Vec<String> = parsed
        .iter()
        .filter_map(|(builtin, recipe)| {
            recipe
                .as_ref()
                .err()
                .map(|e| format!("{}{:<width$}  {}", indent(1), builtin.name, e))
        })
        .collect();
    if !invalid.is_empty() {
        lines.push("invalid".to_string());
        lines.extend(invalid);
    }
    lines
}

pub fn print_recipe_list(recipes: &[BuiltinRecipe]) {
    for line in format_recipe_list(recipes) {
        println!("{}", line);
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// What a `replicate` run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub recipes: usize,
    pub templates: usize,
    /// Files the run set out to generate.
    pub planned: usize,
    /// Files the tools actually wrote.
    pub generated: usize,
    pub dedup: DedupStats,
}

pub fn format_summary(dest: &Path, summary: &RunSummary) -> Vec<String> {
    vec![
        format!("Corpus: {}", dest.display()),
        format!("{}Recipes: {}", indent(1), summary.recipes),
        format!("{}Templates: {}", indent(1), summary.templates),
        format!(
            "{}Generated: {} of {} file(s)",
            indent(1),
            summary.generated,
            summary.planned
        ),
        format!(
            "{}Duplicates: {} removed, {} kept",
            indent(1),
            summary.dedup.removed,
            summary.dedup.kept()
        ),
    ]
}

pub fn print_summary(dest: &Path, summary: &RunSummary) {
    for line in format_summary(dest, summary) {
        println!("{}", line);
    }
}
