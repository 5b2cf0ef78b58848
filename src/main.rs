use clap::{Parser, Subcommand};
use corpus_replicator::builtin::{BUILTIN_RECIPES, RecipeSource};
use corpus_replicator::config::{self, Settings};
use corpus_replicator::generate::{Tool, load_generator};
use corpus_replicator::logging::{self, LogLevel};
use corpus_replicator::naming::is_filesystem_safe;
use corpus_replicator::output::{self, RunSummary};
use corpus_replicator::process::{ProcessRunner, ToolRunner};
use corpus_replicator::recipe::{Medium, Recipe};
use corpus_replicator::replicator::{Replicator, ReplicatorError};
use corpus_replicator::template::{self, Resolution, Template, TemplateOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Shared flags for commands that synthesize templates.
#[derive(clap::Args, Clone)]
struct TemplateArgs {
    /// Runtime in seconds (audio, video)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Number of frames (animation, video; 0 for no limit)
    #[arg(long)]
    frames: Option<u32>,

    /// Resolution as WIDTHxHEIGHT (image, video, animation)
    #[arg(short, long)]
    resolution: Option<Resolution>,
}

#[derive(Parser)]
#[command(name = "corpus-replicator")]
#[command(about = "Generate media corpora from recipes and templates")]
#[command(long_about = "\
Generate media corpora from recipes and templates

A recipe names an encoder configuration and groups of alternative flag-sets.
Every flag-set is applied to every template by running FFmpeg or ImageMagick
once per combination. Identical output files are removed afterwards.

Recipe structure:

  base:
    codec: \"h264\"                   # Used in output file names
    container: \"mp4\"                # Output file extension
    library: \"libx264\"
    medium: \"video\"                 # animation, audio, image or video
    tool: \"ffmpeg\"                  # ffmpeg or imagemagick
    default_flags:                  # Applied to every variation
      encoder: [\"-c:v\", \"libx264\"]
  variation:
    preset:                         # Group name, replaces a same-named default
    - [\"-preset\", \"ultrafast\"]
    - [\"-preset\", \"veryslow\"]

Output files are named medium-codec-library-template-group-NN.container.

Run 'corpus-replicator list-recipes' to see the built-in recipes and
'corpus-replicator gen-config' to generate a documented replicator.toml.")]
#[command(version)]
struct Cli {
    /// Output directory
    #[arg(short, long, default_value = "generated-corpus", global = true)]
    output: PathBuf,

    /// Console logging level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Config file (default: ./replicator.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: templates → corpus → remove duplicates
    Replicate {
        /// Type of files to generate: animation, audio, image or video
        medium: Medium,

        /// Recipe files or built-in recipe names
        #[arg(required = true)]
        recipes: Vec<String>,

        /// Templates to use ('all' for every template of the medium)
        #[arg(short, long, num_args = 1.., default_value = "all")]
        templates: Vec<String>,

        #[command(flatten)]
        template_args: TemplateArgs,
    },
    /// Run a single recipe against a template file
    Generate {
        /// Recipe file or built-in recipe name
        recipe: String,

        /// File to use as template
        template_file: PathBuf,

        /// Template name used when naming generated files
        #[arg(short = 'n', long, default_value = "custom")]
        template_name: String,
    },
    /// Synthesize a single template file
    Template {
        /// animation, audio, image or video
        medium: Medium,

        /// Template pattern, e.g. noise, solid, sine or test
        template: String,

        #[command(flatten)]
        template_args: TemplateArgs,
    },
    /// List the built-in recipes
    ListRecipes,
    /// Print a stock replicator.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(
            e.downcast_ref::<ReplicatorError>(),
            Some(ReplicatorError::Interrupted)
        ) => {
            warn!("Aborting...");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Replicate {
            medium,
            ref recipes,
            ref templates,
            ref template_args,
        } => {
            let settings = config::load_config(cli.config.as_deref())?;
            let runner = settings.runner();
            require_ffmpeg(&runner)?;
            let sources = recipes
                .iter()
                .map(|r| RecipeSource::resolve(r))
                .collect::<Result<Vec<_>, _>>()?;
            let templates = resolve_templates(medium, templates)?;
            let options = template_options(&settings, medium, template_args);

            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = interrupted.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;
            let aborted = interrupted.clone();
            let runner = runner.with_interrupt(interrupted.clone());

            let log_file = runner.log_file().to_path_buf();
            let result = replicate(
                medium,
                &cli.output,
                sources,
                &templates,
                &options,
                runner,
                interrupted,
            );
            report_tool_log(&log_file);
            // the tool sees the same Ctrl-C and usually fails first
            if result.is_err() && aborted.load(Ordering::SeqCst) {
                return Err(ReplicatorError::Interrupted.into());
            }
            result?;
            info!("Done.");
        }
        Command::Generate {
            ref recipe,
            ref template_file,
            ref template_name,
        } => {
            let source = RecipeSource::resolve(recipe)?;
            if !template_file.is_file() {
                return Err(format!(
                    "Template file does not exist: '{}'",
                    template_file.display()
                )
                .into());
            }
            if !is_filesystem_safe(template_name) {
                return Err(format!("Template name '{}' is invalid", template_name).into());
            }
            let settings = config::load_config(cli.config.as_deref())?;
            let runner = settings.runner();
            let recipe = source.load()?;
            let template = Template::new(template_name.as_str(), template_file.as_path());

            let result = generate_single(&recipe, &template, &cli.output, &runner);
            report_tool_log(runner.log_file());
            let count = result?;
            info!("Created {} file(s) in '{}'", count, cli.output.display());
        }
        Command::Template {
            medium,
            ref template,
            ref template_args,
        } => {
            let settings = config::load_config(cli.config.as_deref())?;
            let runner = settings.runner();
            require_ffmpeg(&runner)?;
            let options = template_options(&settings, medium, template_args);
            std::fs::create_dir_all(&cli.output)?;
            let result = template::synthesize(medium, template, &cli.output, &options, &runner);
            report_tool_log(runner.log_file());
            let created = result?;
            info!("Created '{}'", created.file().display());
        }
        Command::ListRecipes => {
            output::print_recipe_list(BUILTIN_RECIPES);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// The full pipeline. Templates are removed on every exit path by the
/// replicator's `Drop`.
fn replicate(
    medium: Medium,
    dest: &Path,
    sources: Vec<RecipeSource>,
    templates: &[&str],
    options: &TemplateOptions,
    runner: ProcessRunner,
    interrupted: Arc<AtomicBool>,
) -> Result<(), ReplicatorError> {
    let mut replicator =
        Replicator::new(medium, dest, sources, runner)?.with_interrupt(interrupted);

    info!("Generating templates...");
    replicator.generate_templates(templates, options)?;
    info!(
        "{} recipe(s) will be used with {} template(s) to create {} file(s).",
        replicator.recipes().len(),
        replicator.templates().len(),
        replicator.len()
    );
    let generated = replicator.generate_corpus()?;
    replicator.remove_templates();

    info!("Optimizing corpus, checking for duplicates...");
    let dedup = replicator.remove_duplicates()?;
    debug!("{}", dedup);

    output::print_summary(
        dest,
        &RunSummary {
            recipes: replicator.recipes().len(),
            templates: replicator.templates().len(),
            planned: replicator.len(),
            generated,
            dedup,
        },
    );
    Ok(())
}

fn generate_single(
    recipe: &Recipe,
    template: &Template,
    dest: &Path,
    runner: &ProcessRunner,
) -> Result<usize, ReplicatorError> {
    let mut generator = load_generator(recipe, dest, runner)?;
    generator.add_template(template);
    std::fs::create_dir_all(dest)?;
    info!(
        "Generating {} '{}' file(s) using template '{}'...",
        recipe.len(),
        generator.description(),
        template.name()
    );
    let mut count = 0;
    for file in generator.generate() {
        let file = file?;
        debug!("created '{}'", file.display());
        count += 1;
    }
    Ok(count)
}

fn require_ffmpeg(runner: &ProcessRunner) -> Result<(), String> {
    if runner.is_available(Tool::Ffmpeg.binary()) {
        Ok(())
    } else {
        Err("Please install FFmpeg.".to_string())
    }
}

/// Expand 'all' and check every name against the medium's patterns.
fn resolve_templates(medium: Medium, requested: &[String]) -> Result<Vec<&'static str>, String> {
    let available = template::template_names(medium);
    if requested.iter().any(|t| t == "all") {
        return Ok(available.to_vec());
    }
    requested
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|t| **t == name.as_str())
                .copied()
                .ok_or_else(|| {
                    format!(
                        "Unknown {} template '{}' (choose from: all, {})",
                        medium,
                        name,
                        available.join(", ")
                    )
                })
        })
        .collect()
}

/// Config values for `medium`, overridden by whichever flags were given.
fn template_options(settings: &Settings, medium: Medium, args: &TemplateArgs) -> TemplateOptions {
    let mut options = settings.template_options(medium);
    // animations are frame limited, audio and images have no frames
    if let Some(duration) = args.duration.filter(|_| medium != Medium::Animation) {
        options.duration = duration;
    }
    if let Some(frames) = args
        .frames
        .filter(|_| matches!(medium, Medium::Animation | Medium::Video))
    {
        options.frames = frames;
    }
    if let Some(resolution) = args.resolution {
        options.resolution = resolution;
    }
    options
}

fn report_tool_log(log_file: &Path) {
    if log_file.is_file() {
        let shown = std::fs::canonicalize(log_file).unwrap_or_else(|_| log_file.to_path_buf());
        warn!("A tool log is available '{}'.", shown.display());
    }
}
