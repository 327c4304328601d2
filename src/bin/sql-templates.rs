use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sql_templates::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render and run named SQL templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the templates in a file.
    List { templates: PathBuf },
    /// Print a template with its parameters substituted.
    Render {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_enum, default_value = "sqlite")]
        dialect: EscapeDialect,
        /// Fail instead of leaving unmatched placeholders in place.
        #[arg(long)]
        strict: bool,
    },
    /// Run a template and print the rows as JSON lines.
    Run {
        #[command(flatten)]
        target: Target,
        /// JSON engine configuration; overrides --db.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, required_unless_present = "config")]
        db: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long)]
        stats_dir: Option<PathBuf>,
        /// Deliver rows one at a time instead of buffering the result.
        #[arg(long)]
        stream: bool,
        /// Unacknowledged rows allowed while streaming.
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

#[derive(Args, Debug)]
struct Target {
    templates: PathBuf,
    name: String,
    /// JSON array of positional parameters.
    #[arg(long, default_value = "[]")]
    params: String,
}

impl Target {
    fn params(&self) -> Result<Vec<Param>, SqlTemplateError> {
        let json = serde_json::from_str(&self.params)
            .map_err(|e| SqlTemplateError::ParameterError(format!("--params is not JSON: {e}")))?;
        params_from_json(json)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(Cli::parse().command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), SqlTemplateError> {
    match command {
        Command::List { templates } => {
            let registry = TemplateRegistry::load(&templates)?;
            for template in registry.iter() {
                println!("{}", template.name());
            }
            Ok(())
        }
        Command::Render {
            target,
            dialect,
            strict,
        } => {
            let registry = TemplateRegistry::load(&target.templates)?;
            let params = target.params()?;
            let template = registry.require(&target.name)?;
            let underflow = if strict {
                UnderflowPolicy::Error
            } else {
                UnderflowPolicy::Passthrough
            };
            let options = ResolveOptions::default()
                .with_dialect(dialect)
                .with_underflow(underflow);
            println!("{}", resolve(template.sql(), &params, options)?);
            Ok(())
        }
        Command::Run {
            target,
            config,
            db,
            mode,
            stats_dir,
            stream,
            concurrency,
        } => {
            let mut engine_config = match (config, db) {
                (Some(path), _) => EngineConfig::from_file(&path)?,
                (None, Some(db)) => EngineConfig::new(SqliteOptions::new(db)),
                (None, None) => {
                    return Err(SqlTemplateError::ConfigError(
                        "either --config or --db is required".into(),
                    ));
                }
            };
            if let Some(mode) = mode {
                engine_config = engine_config.with_mode(mode);
            }
            if let Some(dir) = stats_dir {
                engine_config = engine_config.with_stats_dir(dir);
            }

            let params = target.params()?;
            let engine = SqlEngine::open(engine_config).await?;
            let outcome = execute(&engine, &target, &params, stream, concurrency).await;

            // Reports are written whether or not the run failed.
            let written = engine.close();
            outcome?;
            for path in written? {
                tracing::info!(path = %path.display(), "statistics written");
            }
            Ok(())
        }
    }
}

async fn execute(
    engine: &SqlEngine,
    target: &Target,
    params: &[Param],
    stream: bool,
    concurrency: usize,
) -> Result<(), SqlTemplateError> {
    let registry = engine.load_templates(&target.templates)?;
    let template = registry.require(&target.name)?;

    if stream {
        let mut print = |row: CustomDbRow, ack: RowAck| {
            println!("{}", row.to_json());
            ack.ack();
        };
        let options = StreamOptions::default().with_max_concurrency(concurrency);
        let summary = engine
            .query_streaming(template, params, &mut print, options)
            .await?;
        tracing::info!(
            rows = summary.rows_delivered,
            pauses = summary.pauses,
            "stream finished"
        );
    } else {
        let result = engine.query_buffered(template, params).await?;
        if result.get_column_names().is_none() {
            println!("{} row(s) affected", result.rows_affected);
        }
        for row in &result {
            println!("{}", row.to_json());
        }
    }
    Ok(())
}
