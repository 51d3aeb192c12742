//! Punto de entrada ("driver").
//!
//! Este módulo orquesta la compilación de uno o varios documentos
//! y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};
use fsmc::{
    compile::{self, Options},
    output::{Commit, OutputOptions},
};

use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Sufijo de los documentos ya preprocesados.
const BUILD_SUFFIX: &str = "_build.puml";

/// Parámetros comunes a todos los archivos de una ejecución.
struct Job {
    options: Options,
    output: OutputOptions,
    tables: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = cli().get_matches();
    init_logging(args.is_present("verbose"));

    let job = job(&args);

    if let Some(directory) = args.value_of("directory") {
        return compile_directory(Path::new(directory), &job);
    }

    // clap exige INPUT en ausencia de --directory
    let input = match args.value_of("input") {
        Some(input) => Path::new(input),
        None => bail!("No input file given"),
    };

    let output = args.value_of("output").map(Path::new).unwrap_or(input);
    compile_file(input, output, &job)
}

fn cli() -> Command<'static> {
    Command::new("FSM table compiler")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required_unless_present("directory")
                .help("Preprocessed diagram (*_build.puml)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Updated diagram destination, defaults to INPUT"),
        )
        .arg(
            Arg::new("directory")
                .short('d')
                .long("directory")
                .takes_value(true)
                .value_name("DIR")
                .conflicts_with_all(&["input", "output"])
                .help("Compile every *_build.puml under DIR"),
        )
        .arg(
            Arg::new("tables")
                .short('C')
                .long("tables")
                .takes_value(true)
                .value_name("DIR")
                .help("Directory for generated .h/.c files, defaults to the diagram's"),
        )
        .arg(
            Arg::new("project")
                .short('p')
                .long("project")
                .takes_value(true)
                .value_name("NAME")
                .help("Project name, defaults to the diagram title"),
        )
        .arg(
            Arg::new("initial-marker")
                .long("initial-marker")
                .takes_value(true)
                .multiple_occurrences(true)
                .value_name("TEXT")
                .help("Description text marking the initial state (repeatable)"),
        )
        .arg(
            Arg::new("backup")
                .long("backup")
                .help("Keep a .backup copy of every overwritten file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every compilation step"),
        )
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn job(args: &ArgMatches) -> Job {
    let mut options = Options {
        project: args.value_of("project").map(String::from),
        ..Default::default()
    };

    if let Some(markers) = args.values_of("initial-marker") {
        options.initial_markers = markers.map(String::from).collect();
    }

    let mut output = OutputOptions::empty();
    if args.is_present("backup") {
        output |= OutputOptions::BACKUP;
    }

    Job {
        options,
        output,
        tables: args.value_of("tables").map(PathBuf::from),
    }
}

fn compile_file(input: &Path, output: &Path, job: &Job) -> anyhow::Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    if !input.to_string_lossy().ends_with(".puml") {
        info!(file = %input.display(), "input does not look like a .puml document");
    }

    let compilation = match compile::compile(&text, &input.display().to_string(), &job.options) {
        Ok(compilation) => compilation,
        Err(diagnostics) => bail!("{}", diagnostics),
    };

    let tables = match &job.tables {
        Some(tables) => tables.clone(),
        None => output.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let mut commit = Commit::new(job.output);
    commit.add(output, &compilation.diagram)?;
    commit.add(tables.join(compilation.header_name()), &compilation.header)?;
    commit.add(tables.join(compilation.source_name()), &compilation.source)?;

    commit
        .finish()
        .with_context(|| format!("Failed to write outputs for: {}", input.display()))?;

    Ok(())
}

fn compile_directory(directory: &Path, job: &Job) -> anyhow::Result<()> {
    let mut files = Vec::new();
    find_inputs(directory, &mut files)
        .with_context(|| format!("Failed to scan directory: {}", directory.display()))?;

    if files.is_empty() {
        info!(directory = %directory.display(), "no {} files found", BUILD_SUFFIX);
        return Ok(());
    }

    files.sort();

    let failed = files
        .par_iter()
        .filter(|file| match compile_file(file, file, job) {
            Ok(()) => false,
            Err(failure) => {
                error!(file = %file.display(), "{:#}", failure);
                true
            }
        })
        .count();

    let succeeded = files.len() - failed;
    info!(succeeded, failed, "directory compiled");

    if failed > 0 {
        bail!("{} of {} files failed to compile", failed, files.len());
    }

    Ok(())
}

/// Busca recursivamente documentos `*_build.puml`.
fn find_inputs(directory: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            find_inputs(&path, files)?;
        } else if path.to_string_lossy().ends_with(BUILD_SUFFIX) {
            files.push(path);
        }
    }

    Ok(())
}
