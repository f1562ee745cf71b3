//! Tapline CLI - connection introspection and data streaming from a shell

mod config;
mod output;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tapline_core::{RequestContext, RunLocator, TaplineError};
use tapline_service::{
    ConnectionDataService, GenerateDataRequest, InitStatementOptions, LiveBackends,
    SchemaOptions, StreamRequest,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::CliConfig;
use crate::output::{print_json, JsonLinesSink};
use crate::registry::{FileRegistry, LocalAuthorizer};

#[derive(Parser)]
#[command(name = "tapline")]
#[command(about = "Introspect and stream data from Postgres, MySQL and S3 job-run connections")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Connections file (overrides TAPLINE_CONNECTIONS_FILE)
    #[arg(long, global = true)]
    connections_file: Option<PathBuf>,

    /// Account the local user belongs to (overrides TAPLINE_ACCOUNT_ID)
    #[arg(long, global = true)]
    account: Option<String>,

    /// User id recorded on the request
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the columns of every table of a connection
    Schema {
        connection: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Print the key constraints of a SQL connection
    Constraints {
        connection: String,

        #[arg(short, long, value_enum, default_value = "table")]
        kind: ConstraintKind,

        /// Merge each table's unique constraints into one column list
        #[arg(long)]
        flatten: bool,
    },

    /// Print CREATE and TRUNCATE statements for every table
    InitStatements {
        connection: String,

        #[arg(long)]
        init_schema: bool,

        #[arg(long)]
        truncate_before_insert: bool,

        #[arg(long)]
        truncate_cascade: bool,
    },

    /// Count the rows of a table
    RowCount {
        connection: String,
        schema: String,
        table: String,

        /// Filter appended verbatim as a WHERE clause
        #[arg(long = "where")]
        where_clause: Option<String>,
    },

    /// Stream a table as JSON lines on stdout
    Stream {
        connection: String,
        schema: String,
        table: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Generate example records for a table with a model connection
    Generate {
        ai_connection: String,
        data_connection: String,
        schema: String,
        table: String,

        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value_t = 10)]
        count: u32,

        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConstraintKind {
    Foreign,
    Primary,
    Unique,
    Table,
}

/// Job-run selection for object-store connections.
#[derive(Args)]
struct RunArgs {
    /// Use the newest run of this job that has data
    #[arg(long)]
    job_id: Option<String>,

    /// Use this run
    #[arg(long)]
    job_run_id: Option<String>,
}

impl RunArgs {
    fn locator(&self) -> Result<Option<RunLocator>> {
        if self.job_id.is_none() && self.job_run_id.is_none() {
            return Ok(None);
        }
        let locator = RunLocator::from_parts(self.job_id.as_deref(), self.job_run_id.as_deref())
            .map_err(failed)?;
        Ok(Some(locator))
    }
}

fn failed(e: TaplineError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {}", e.code(), e)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CliConfig::from_env()?;
    let path = cli.connections_file.unwrap_or(config.connections_file);
    let registry = Arc::new(FileRegistry::load(&path)?);
    let account = cli
        .account
        .or(config.account_id)
        .unwrap_or_else(|| registry.account_id().to_string());
    info!("Using {:?} as account '{}'", path, account);

    let service = ConnectionDataService::new(
        registry.clone(),
        Arc::new(LocalAuthorizer::new(account)),
        registry,
        Arc::new(LiveBackends),
        config.service,
    );

    let ctx = RequestContext::new(cli.user);
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    run(&service, &ctx, cli.command).await
}

async fn run(service: &ConnectionDataService, ctx: &RequestContext, command: Commands) -> Result<()> {
    match command {
        Commands::Schema { connection, run } => {
            let options = SchemaOptions { run: run.locator()? };
            let columns = service
                .get_connection_schema(ctx, &connection, &options)
                .await
                .map_err(failed)?;
            print_json(&columns)?;
        }
        Commands::Constraints {
            connection,
            kind,
            flatten,
        } => match kind {
            ConstraintKind::Foreign => print_json(
                &service
                    .get_connection_foreign_constraints(ctx, &connection)
                    .await
                    .map_err(failed)?,
            )?,
            ConstraintKind::Primary => print_json(
                &service
                    .get_connection_primary_constraints(ctx, &connection)
                    .await
                    .map_err(failed)?,
            )?,
            ConstraintKind::Unique => {
                let response = service
                    .get_connection_unique_constraints(ctx, &connection)
                    .await
                    .map_err(failed)?;
                if flatten {
                    print_json(&response.flattened())?;
                } else {
                    print_json(&response)?;
                }
            }
            ConstraintKind::Table => print_json(
                &service
                    .get_connection_table_constraints(ctx, &connection)
                    .await
                    .map_err(failed)?,
            )?,
        },
        Commands::InitStatements {
            connection,
            init_schema,
            truncate_before_insert,
            truncate_cascade,
        } => {
            let options = InitStatementOptions {
                init_schema,
                truncate_before_insert,
                truncate_cascade,
            };
            let statements = service
                .get_connection_init_statements(ctx, &connection, &options)
                .await
                .map_err(failed)?;
            print_json(&statements)?;
        }
        Commands::RowCount {
            connection,
            schema,
            table,
            where_clause,
        } => {
            let count = service
                .get_table_row_count(ctx, &connection, &schema, &table, where_clause.as_deref())
                .await
                .map_err(failed)?;
            println!("{}", count);
        }
        Commands::Stream {
            connection,
            schema,
            table,
            run,
        } => {
            let request = StreamRequest {
                connection_id: connection,
                schema,
                table,
                run: run.locator()?,
            };
            let mut sink = JsonLinesSink::new(tokio::io::stdout());
            let result = service.stream_connection_data(ctx, &request, &mut sink).await;
            sink.finish().await?;
            let count = result.map_err(failed)?;
            info!("Streamed {} rows", count);
        }
        Commands::Generate {
            ai_connection,
            data_connection,
            schema,
            table,
            prompt,
            count,
            model,
        } => {
            let request = GenerateDataRequest {
                ai_connection_id: ai_connection,
                data_connection_id: data_connection,
                schema,
                table,
                prompt,
                count,
                model_name: model,
            };
            let records = service
                .get_ai_generated_data(ctx, &request)
                .await
                .map_err(failed)?;
            print_json(&records)?;
        }
    }

    Ok(())
}
