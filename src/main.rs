use clap::{Parser, Subcommand};
use quire::{config, output, pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Content pipeline for a blog and talks page")]
#[command(long_about = "\
Content pipeline for a blog and talks page

Every markdown file under the content root is a document with a header block.
Quire validates headers, resolves every link and writes the ordered set of
published documents as JSON for the renderer.

Content structure:

  content/
  ├── config.toml                        # Site config (optional)
  ├── about.md                           # Page → /about/
  ├── talks.md                           # Talks index: year headings, one list item per talk
  └── posts/
      ├── 2016-01-01-gdb-internals.md    # Post → /posts/gdb-internals/
      └── 2016-06-01-simd.md             # draft: true → validated, not published

Header block (YAML between --- or TOML between +++):

  ---
  title: GDB internals        # required
  date: 2016-01-01            # required
  tags: [linux, debugging]    # optional
  draft: false                # optional
  ---

Link to another document with [text](post:posts/2016-01-01-gdb-internals).

Run 'quire gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Log pipeline progress (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate content and print the inventory
    Check,
    /// Validate content and write publication.json to the output directory
    Build,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let Some(site) = build(&cli.source)? else {
                return Ok(ExitCode::FAILURE);
            };
            output::print_check_output(&site, &cli.source);
            println!("==> Content is valid");
        }
        Command::Build => {
            println!("==> Building {}", cli.source.display());
            let Some(site) = build(&cli.source)? else {
                return Ok(ExitCode::FAILURE);
            };
            std::fs::create_dir_all(&cli.output)?;
            let path = cli.output.join("publication.json");
            let json = serde_json::to_string_pretty(&site)?;
            std::fs::write(&path, json)?;
            output::print_build_output(&site, &path);
            println!("==> Build complete: {}", cli.output.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Load config, size the thread pool, run the pipeline.
///
/// Returns `Ok(None)` after printing the errors of a failed build.
fn build(source: &std::path::Path) -> Result<Option<pipeline::Site>, config::ConfigError> {
    let site_config = config::load_config(source)?;
    init_thread_pool(&site_config.processing);
    match pipeline::build(source, &site_config) {
        Ok(site) => Ok(Some(site)),
        Err(failure) => {
            output::print_errors(&failure);
            Ok(None)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "quire=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the core count: config can lower it, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
