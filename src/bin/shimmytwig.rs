use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use shimmytwig::{Context, Engine, EngineConfig, FileSystemLoader};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shimmytwig", version, about = "Render Twig-like templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template file to stdout.
    Render {
        template: PathBuf,
        /// JSON object used as the render context.
        #[arg(long)]
        context: Option<PathBuf>,
        /// Directory `include` names are resolved against. Defaults to the
        /// template's directory.
        #[arg(long)]
        root: Option<PathBuf>,
        /// JSON engine configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        max_include_depth: Option<usize>,
        #[arg(long)]
        max_iterations: Option<usize>,
    },
    /// Print the syntax tree of an expression as a Graphviz digraph.
    Ast { expression: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Render {
            template,
            context,
            root,
            config,
            max_include_depth,
            max_iterations,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(depth) = max_include_depth {
                config.max_include_depth = depth;
            }
            if let Some(iterations) = max_iterations {
                config.max_iterations = iterations;
            }

            let ctx = match context {
                Some(path) => load_context(&path)?,
                None => Context::new(),
            };
            let text = fs::read_to_string(&template)
                .with_context(|| format!("reading template {}", template.display()))?;
            let root = root
                .or_else(|| template.parent().map(Path::to_path_buf))
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from("."));

            let engine = Engine::with_config(config).with_loader(FileSystemLoader::new(root));
            let out = engine
                .render(&text, &ctx)
                .with_context(|| format!("rendering {}", template.display()))?;
            print!("{out}");
        }
        Command::Ast { expression } => {
            let expr = shimmytwig::parse_expression(&expression, 1)?;
            print!("{}", expr.to_dot());
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    EngineConfig::from_json_str(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn load_context(path: &Path) -> Result<Context> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading context {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&json).with_context(|| format!("parsing context {}", path.display()))?;
    match Context::from_json(value) {
        Some(ctx) => Ok(ctx),
        None => bail!("context {} must be a JSON object", path.display()),
    }
}
