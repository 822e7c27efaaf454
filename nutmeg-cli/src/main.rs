use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nutmeg_core::codegen_slots::allocate_slots;
use nutmeg_core::extensions::read_source;
use nutmeg_core::interchange;
use nutmeg_core::optimizer::optimize;
use nutmeg_core::{Bundle, Codelet, Compiler, LabelCounter, Mishap, resolve};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

const STDIN_SOURCE: &str = "<stdin>.nutmeg";

/// Command-line front end for the Nutmeg toolchain.
///
/// Tree-to-tree subcommands read and write one code-tree per line.
#[derive(Parser, Debug)]
#[command(name = "nutmeg", version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Also print the debug form of any failure")]
    developer: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse source text into code-trees.
    Parse {
        #[command(flatten)]
        io: Io,

        #[arg(long, value_name = "NAME", help = "Unit name recorded in assertions")]
        unit: Option<String>,
    },
    /// Annotate code-trees with scopes and labels.
    Resolve {
        #[command(flatten)]
        io: Io,
    },
    /// Replace builtin references and fold constant conditionals.
    Optimize {
        #[command(flatten)]
        io: Io,
    },
    /// Allocate storage slots in resolved code-trees.
    Codegen {
        #[command(flatten)]
        io: Io,
    },
    /// Add resolved top-level bindings to a bundle file.
    Bundle {
        #[arg(short, long, help = "Read trees from this file instead of stdin")]
        input: Option<PathBuf>,

        #[arg(short, long, value_name = "PATH")]
        bundle: PathBuf,

        #[arg(short, long = "entry-point", value_name = "NAME")]
        entry_points: Vec<String>,
    },
    /// Recompute the dependencies of every entry point in a bundle file.
    Trace {
        #[arg(short, long, value_name = "PATH")]
        bundle: PathBuf,
    },
    /// Compile source files into a bundle.
    Compile {
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        #[arg(short, long, value_name = "PATH")]
        bundle: PathBuf,

        #[arg(short, long = "entry-point", value_name = "NAME")]
        entry_points: Vec<String>,

        #[arg(long, help = "Extend an existing bundle instead of starting fresh")]
        keep: bool,
    },
}

#[derive(Args, Debug)]
struct Io {
    #[arg(short, long, help = "Read from this file instead of stdin")]
    input: Option<PathBuf>,

    #[arg(short, long, help = "Write to this file instead of stdout")]
    output: Option<PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let developer = cli.developer;
    if let Err(err) = execute(cli) {
        report_failure(&err, developer);
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn report_failure(err: &anyhow::Error, developer: bool) {
    match err.downcast_ref::<Mishap>() {
        Some(mishap) => {
            eprint!("{}", mishap.report());
            if developer {
                eprintln!("{mishap:#?}");
            }
        }
        None => {
            eprintln!("error: {err:#}");
            if developer {
                eprintln!("{err:?}");
            }
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Parse { io, unit } => {
            let source = read_input(io.input.as_deref())?;
            let unit = unit.unwrap_or_else(|| unit_name(io.input.as_deref()));
            // stdin is always Nutmeg source
            let path = io
                .input
                .as_deref()
                .map_or_else(|| STDIN_SOURCE.to_string(), |path| path.display().to_string());
            let mut lines = String::new();
            for codelet in read_source(&path, &unit, &source)? {
                push_line(&mut lines, &codelet)?;
            }
            write_output(io.output.as_deref(), &lines)
        }
        Command::Resolve { io } => {
            let mut labels = LabelCounter::new();
            map_trees(&io, |tree| {
                let mut tree = tree;
                resolve(&mut tree, &mut labels)?;
                Ok(tree)
            })
        }
        Command::Optimize { io } => map_trees(&io, |tree| Ok(optimize(tree))),
        Command::Codegen { io } => map_trees(&io, |tree| {
            let mut tree = tree;
            allocate_slots(&mut tree)?;
            Ok(tree)
        }),
        Command::Bundle {
            input,
            bundle,
            entry_points,
        } => {
            let text = read_input(input.as_deref())?;
            let mut stored = read_bundle(&bundle)?;
            for tree in interchange::from_json_lines(&text)? {
                stored.add_binding(&tree)?;
            }
            for name in entry_points {
                stored.add_entry_point(name);
            }
            write_bundle(&bundle, &stored)
        }
        Command::Trace { bundle } => {
            let mut stored = read_bundle(&bundle)?;
            stored.trace()?;
            write_bundle(&bundle, &stored)
        }
        Command::Compile {
            files,
            bundle,
            entry_points,
            keep,
        } => compile(&files, &bundle, &entry_points, keep),
    }
}

fn map_trees(io: &Io, mut step: impl FnMut(Codelet) -> Result<Codelet, Mishap>) -> Result<()> {
    let text = read_input(io.input.as_deref())?;
    let mut lines = String::new();
    for tree in interchange::from_json_lines(&text)? {
        push_line(&mut lines, &step(tree)?)?;
    }
    write_output(io.output.as_deref(), &lines)
}

fn compile(
    files: &[PathBuf],
    bundle_path: &Path,
    entry_points: &[String],
    keep: bool,
) -> Result<()> {
    let mut compiler = if keep {
        debug!(bundle = %bundle_path.display(), "extending bundle");
        Compiler::with_bundle(read_bundle(bundle_path)?)?
    } else {
        Compiler::new()
    };

    for file in files {
        let source = fs::read_to_string(file)
            .with_context(|| format!("failed to read input file {}", file.display()))?;
        compiler.compile_file(&file.display().to_string(), &source)?;
    }
    for name in entry_points {
        compiler.add_entry_point(name.as_str());
    }

    write_bundle(bundle_path, &compiler.finish()?)
}

/// A missing bundle file reads as an empty bundle.
fn read_bundle(path: &Path) -> Result<Bundle> {
    if !path.exists() {
        return Ok(Bundle::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read bundle {}", path.display()))?;
    Ok(Bundle::from_json(&text)?)
}

fn write_bundle(path: &Path, bundle: &Bundle) -> Result<()> {
    write_output(Some(path), &bundle.to_json_pretty()?)?;
    info!(bundle = %path.display(), "wrote bundle");
    Ok(())
}

fn unit_name(input: Option<&Path>) -> String {
    input.map_or_else(|| "<stdin>".to_string(), |path| path.display().to_string())
}

fn push_line(lines: &mut String, tree: &Codelet) -> Result<(), Mishap> {
    lines.push_str(&interchange::to_json(tree)?);
    lines.push('\n');
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes()).context("failed to write stdout")?;
        return stdout.flush().context("failed to write stdout");
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, text).with_context(|| format!("failed to write output file {}", path.display()))
}
