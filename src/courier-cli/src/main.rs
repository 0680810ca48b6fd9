use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use courier_core::{init_logging, AppDirs, Config, ValidationError, WorkerConfig};
use courier_transport::AnalysisClient;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "courier", version, about = "Talk to a line-delimited JSON analysis worker")]
struct Cli {
    /// Worker runtime override (takes precedence over config)
    #[arg(long, global = true)]
    runtime: Option<PathBuf>,
    /// Worker script override (takes precedence over config)
    #[arg(long, global = true)]
    script: Option<PathBuf>,
    /// Seconds to wait for a reply
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the worker and print its version
    Version,
    /// Start a search and print the search id the worker assigns
    Search(SearchCommand),
    /// Show the config file location and worker settings
    Config,
}

#[derive(Debug, Parser, Clone)]
struct SearchCommand {
    /// What to search for
    #[arg(value_enum)]
    kind: SearchKind,
    /// Name or pattern to search
    query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SearchKind {
    TopLevel,
    MemberDeclarations,
    MemberReferences,
}

#[derive(Debug, Error)]
enum WorkerSelectionError {
    #[error("{0} (set it in config.toml or pass --runtime/--script)")]
    Incomplete(#[from] ValidationError),
}

/// Apply command-line overrides to the configured worker.
fn resolve_worker(
    config: &WorkerConfig,
    runtime: Option<&Path>,
    script: Option<&Path>,
) -> Result<WorkerConfig, WorkerSelectionError> {
    let mut worker = config.clone();
    if let Some(runtime) = runtime {
        worker.runtime_path = Some(runtime.to_path_buf());
    }
    if let Some(script) = script {
        worker.script_path = Some(script.to_path_buf());
    }
    worker.command_paths()?;
    Ok(worker)
}

impl SearchCommand {
    fn run(&self, client: &AnalysisClient, timeout: Duration) -> Result<Option<String>> {
        let query = self.query.as_str();
        let search_id = client.call::<Option<String>, _>(timeout, |client, done| match self.kind {
            SearchKind::TopLevel => client.find_top_level_declarations(query, done),
            SearchKind::MemberDeclarations => client.find_member_declarations(query, done),
            SearchKind::MemberReferences => client.find_member_references(query, done),
        })?;
        Ok(search_id)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    if let Command::Config = cli.command {
        print_config(&config, &dirs);
        return Ok(());
    }

    let worker = resolve_worker(&config.worker, cli.runtime.as_deref(), cli.script.as_deref())?;
    let timeout = Duration::from_secs(cli.timeout);
    let client = AnalysisClient::start(&worker)?;

    let outcome = run(&cli.command, &client, timeout);

    if let Err(err) = client.shutdown() {
        tracing::warn!(error = %err, "could not ask worker to shut down");
    }
    outcome
}

fn run(command: &Command, client: &AnalysisClient, timeout: Duration) -> Result<()> {
    match command {
        Command::Version => {
            let version = client.version(timeout)?;
            tracing::info!(%version, "worker version");
            println!("{version}");
        }
        Command::Search(search) => {
            let search_id = search.run(client, timeout)?;
            println!("{}", search_id.as_deref().unwrap_or("(none)"));
        }
        Command::Config => {}
    }
    Ok(())
}

fn print_config(config: &Config, dirs: &AppDirs) {
    println!("Config file: {}", Config::config_path(dirs).display());
    println!("Log dir: {}", dirs.log_dir().display());

    let worker = &config.worker;
    let show = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    };
    println!("Worker runtime: {}", show(&worker.runtime_path));
    println!("Worker script: {}", show(&worker.script_path));
    if !worker.args.is_empty() {
        println!("  args: {}", worker.args.join(" "));
    }
    println!(
        "  handshake: {:?} (event '{}', {} ms)",
        worker.handshake, worker.handshake_event, worker.handshake_timeout_ms
    );
    match worker.request_timeout_ms {
        Some(ms) => println!("  request timeout: {ms} ms"),
        None => println!("  request timeout: none"),
    }
    println!("  mismatch policy: {:?}", worker.mismatch_policy);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_worker() -> WorkerConfig {
        WorkerConfig {
            runtime_path: Some(PathBuf::from("dart")),
            script_path: Some(PathBuf::from("analysis_server.dart")),
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn configured_paths_are_used_without_overrides() {
        let worker = resolve_worker(&configured_worker(), None, None).expect("paths configured");
        assert_eq!(worker.runtime_path, Some(PathBuf::from("dart")));
        assert_eq!(worker.script_path, Some(PathBuf::from("analysis_server.dart")));
    }

    #[test]
    fn overrides_take_precedence() {
        let worker = resolve_worker(
            &configured_worker(),
            Some(Path::new("/opt/dart/bin/dart")),
            Some(Path::new("server.dart")),
        )
        .expect("overrides are valid");
        assert_eq!(worker.runtime_path, Some(PathBuf::from("/opt/dart/bin/dart")));
        assert_eq!(worker.script_path, Some(PathBuf::from("server.dart")));
    }

    #[test]
    fn missing_script_is_reported() {
        let err = resolve_worker(&WorkerConfig::default(), Some(Path::new("dart")), None)
            .expect_err("script path required");
        assert!(matches!(
            err,
            WorkerSelectionError::Incomplete(ValidationError::MissingWorkerPath {
                field: "script_path"
            })
        ));
        assert!(err.to_string().contains("--runtime/--script"));
    }

    #[test]
    fn search_kinds_parse_from_kebab_case() {
        let cli = Cli::try_parse_from(["courier", "search", "member-references", "toString"])
            .expect("valid arguments");
        match cli.command {
            Command::Search(search) => {
                assert_eq!(search.kind, SearchKind::MemberReferences);
                assert_eq!(search.query, "toString");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.timeout, 30);
    }
}
