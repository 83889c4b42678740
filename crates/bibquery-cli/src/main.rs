//! bibquery CLI: ask the bibliographic index questions in plain language.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::filter::LevelFilter;

use bibquery_index::{build_sql, ExecutionError};
use bibquery_plan::schema::plan_json_schema;
use bibquery_service::{CompilerBackend, QueryRequest, QueryService, ServiceConfig, ServiceError};

mod render;

#[derive(Parser)]
#[command(name = "bibquery")]
#[command(author, version, about = "Natural-language queries over a bibliographic index")]
struct Cli {
    /// More logging on stderr (`-v` debug, `-vv` trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Index file (overrides BIBQUERY_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Compiler backend: `heuristic` or `llm` (overrides BIBQUERY_COMPILER)
    #[arg(long, global = true)]
    compiler: Option<CompilerBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct QuestionArgs {
    /// The question, e.g. "books printed in Venice in the 16th century"
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,

    /// Maximum number of results
    #[arg(long)]
    limit: Option<usize>,
}

impl QuestionArgs {
    fn text(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a question against the index.
    Query {
        #[command(flatten)]
        question: QuestionArgs,

        /// Aggregate place/publisher/language/decade/century facets
        #[arg(long)]
        facets: bool,

        /// Print the executed SQL and its parameters
        #[arg(long)]
        show_sql: bool,

        /// Emit the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a question and print the plan without running it.
    Compile {
        #[command(flatten)]
        question: QuestionArgs,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a question and print the SQL it translates to.
    Sql {
        #[command(flatten)]
        question: QuestionArgs,
    },

    /// Print the JSON schema of the plan wire format.
    Schema,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_service(cli: &Cli) -> Result<QueryService> {
    let mut config = ServiceConfig::from_env().context("reading BIBQUERY_* configuration")?;
    if let Some(index) = &cli.index {
        config.index_path = index.clone();
    }
    if let Some(compiler) = cli.compiler {
        config.compiler = compiler;
    }
    Ok(QueryService::from_config(&config)?)
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Query {
            question,
            facets,
            show_sql,
            json,
        } => {
            let service = build_service(cli)?;
            let request = QueryRequest::new(question.text())
                .with_limit(question.limit)
                .with_facets(*facets);
            let result = service.query(&request)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                render::print_result(&result, service.backend(), *show_sql);
            }
        }
        Commands::Compile { question, json } => {
            let service = build_service(cli)?;
            let plan = service.compile(&question.text(), question.limit)?;
            if *json {
                println!("{}", plan.to_json_pretty()?);
            } else {
                println!("{} {}", "plan".green().bold(), format!("({})", service.backend()).dimmed());
                render::print_plan(&plan);
            }
        }
        Commands::Sql { question } => {
            let service = build_service(cli)?;
            let plan = service.compile(&question.text(), question.limit)?;
            let query = build_sql(&plan)
                .map_err(ExecutionError::from)
                .map_err(ServiceError::from)?;
            render::print_sql(&query);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&plan_json_schema())?);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli) {
        match err.downcast_ref::<ServiceError>() {
            Some(service_err) => {
                eprintln!("{} {}", "error:".red().bold(), service_err.user_message().trim_end());
            }
            None => eprintln!("{} {err:#}", "error:".red().bold()),
        }
        std::process::exit(1);
    }
}
