//! Mica compiler CLI.
//!
//! Drives the front/mid-end and writes the textual IR listing to the output
//! path; object emission and linking belong to a separate backend.

use std::path::PathBuf;
use std::process;

use bumpalo::Bump;
use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use micac::config::{load_manifest, resolve_target};
use micac::{compile_file, parser, CompileOptions};

#[derive(ClapParser)]
#[command(name = "micac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mica compiler - typecheck .mica programs and emit IR", long_about = None)]
struct Cli {
    /// Input .mica source file
    input: Option<PathBuf>,

    /// Output path for the IR listing (defaults to the input with .ir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// CPU architecture to target
    #[arg(long, value_name = "x86|x64|wasm32")]
    arch: Option<String>,

    /// Operating system to target
    #[arg(long, value_name = "linux|windows|emscripten")]
    os: Option<String>,

    /// Toolchain to target
    #[arg(long, value_name = "gnu|msvc")]
    toolchain: Option<String>,

    /// Build configuration
    #[arg(long = "build-config", value_name = "debug|release")]
    build_config: Option<String>,

    /// Print the abstract syntax tree
    #[arg(long)]
    print_ast: bool,

    /// Print the intermediate representation
    #[arg(long)]
    print_ir: bool,

    /// Generate a shell completion script and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(&cli) {
        eprintln!("{error}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(shell) = cli.completions {
        generate(
            shell,
            &mut Cli::command(),
            "micac",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let Some(input) = &cli.input else {
        return Err("No source file provided".into());
    };

    let manifest_directory = input
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let manifest = load_manifest(&manifest_directory)?;

    let target = resolve_target(
        manifest.as_ref(),
        cli.arch.as_deref(),
        cli.os.as_deref(),
        cli.toolchain.as_deref(),
        cli.build_config.as_deref(),
    )?;

    if cli.print_ast {
        let arena = Bump::new();
        let source = std::fs::read_to_string(input)?;
        let path = arena.alloc_str(&input.to_string_lossy());
        let statements = parser::parse_source(&arena, path, &source)?;

        println!("{}:", input.display());
        for statement in statements {
            println!("{statement:#?}");
        }
    }

    let program = compile_file(input, &CompileOptions { target })?;

    if cli.print_ir {
        println!("{}", program.render_ir());
    }

    let output = match (&cli.output, manifest.as_ref()) {
        (Some(output), _) => output.clone(),
        (None, Some(manifest)) if manifest.build.output.is_some() => {
            manifest_directory.join(manifest.build.output.clone().unwrap_or_default())
        }
        _ => input.with_extension("ir"),
    };

    let mut listing = program.render_ir();
    listing.push('\n');
    listing.push_str(&format!("\n; entry point: {}\n", program.entry_symbol));
    if !program.libraries.is_empty() {
        listing.push_str(&format!("; libraries: {}\n", program.libraries.join(", ")));
    }

    std::fs::write(&output, listing)?;

    Ok(())
}
