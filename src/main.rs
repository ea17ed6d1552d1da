//! graphload CLI - run import jobs against a graph database

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use walkdir::WalkDir;

use graphload::error::{FixSuggestion, ImportError};
use graphload::{
    CypherSink, HttpSink, Importer, JobConfig, NullSink, PropertiesStore, TargetConfig,
};

#[derive(Parser)]
#[command(name = "graphload")]
#[command(about = "graphload - import hierarchical data sources into a graph database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an import job
    Run {
        /// Path to the job .yaml file
        file: PathBuf,

        /// Submit the cleanup statement before the first graph
        #[arg(long)]
        clean: bool,

        /// Dry run: render everything, submit nothing, persist nothing
        #[arg(long)]
        debug: bool,

        /// Override the target transactional endpoint url
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Validate a job file (parse and check only)
    Validate {
        /// Path to the job .yaml file
        file: PathBuf,
    },

    /// List job files in a directory
    List {
        /// Directory to scan
        #[arg(default_value = "jobs")]
        dir: PathBuf,
    },
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            clean,
            debug,
            target,
        } => run_job(&file, clean, debug, target),
        Commands::Validate { file } => validate_job(&file),
        Commands::List { dir } => list_jobs(&dir),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn run_job(
    file: &Path,
    clean: bool,
    debug: bool,
    target_override: Option<String>,
) -> Result<(), ImportError> {
    let mut config = JobConfig::load(file)?;
    if let Some(url) = target_override {
        match &mut config.target {
            Some(target) => target.url = url,
            None => {
                config.target = Some(TargetConfig {
                    url,
                    username: None,
                    password: None,
                })
            }
        }
    }

    let sink: Box<dyn CypherSink> = if debug {
        Box::new(NullSink)
    } else {
        let target = config.target.clone().ok_or_else(|| {
            ImportError::Configuration(
                "no target endpoint: declare 'target:' in the job file or pass --target".into(),
            )
        })?;
        Box::new(HttpSink::new(&target)?)
    };

    let properties = PropertiesStore::for_job(file)?;

    println!(
        "{} Running {} | clean: {} | debug: {}",
        "→".cyan(),
        file.display().to_string().cyan().bold(),
        clean,
        debug
    );

    let mut importer = Importer::new(config, properties, sink, clean, debug)?;
    let report = importer.run()?;

    if debug {
        println!("{}", "Generated script:".cyan().bold());
        println!("{}", report.script);
    } else {
        println!(
            "{} {} batches, {} iterations",
            "✓".green(),
            report.batches,
            report.iterations
        );
        println!("  {}", report.stats);
    }

    Ok(())
}

fn validate_job(file: &Path) -> Result<(), ImportError> {
    let config = JobConfig::load(file)?;

    println!("{} Job '{}' is valid", "✓".green(), file.display());
    println!("  Datasources: {}", config.datasources.len());
    println!("  Graphs: {}", config.graphs.len());
    println!(
        "  Target: {}",
        config
            .target
            .as_ref()
            .map(|t| t.url.as_str())
            .unwrap_or("(none)")
    );

    Ok(())
}

fn list_jobs(dir: &Path) -> Result<(), ImportError> {
    let mut found = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        // Skip properties sidecars
        let is_sidecar = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".properties.yaml"));
        if path.is_file() && is_yaml && !is_sidecar {
            println!("{}", path.display());
            found += 1;
        }
    }
    if found == 0 {
        println!("No job files under {}", dir.display());
    }
    Ok(())
}
