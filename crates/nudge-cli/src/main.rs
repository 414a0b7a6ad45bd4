use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod commands;
mod context;

use cli_args::{CliArgs, Commands};
use commands::emit;
use nudge_client::NudgeClient;
use nudge_service::ServerLock;

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Port priority: explicit flag, then the PID file of a live server, then
/// the default.
fn resolve_port(flag: Option<u16>) -> u16 {
    flag.or_else(|| ServerLock::new().running_port())
        .unwrap_or(nudge_service::DEFAULT_PORT)
}

async fn run(args: CliArgs) -> Result<()> {
    let json_mode = args.json;
    let command = match args.command {
        Commands::Serve { port } => return nudge_service::serve(port).await,
        Commands::Status => return emit(&commands::cmd_status(), json_mode),
        Commands::Stop => return emit(&commands::cmd_stop()?, json_mode),
        command => command,
    };

    let client = NudgeClient::new(resolve_port(args.port));
    match command {
        Commands::Set {
            component,
            key,
            value,
            tags,
            priority,
            confidence,
            ttl,
            scope_cwd_glob,
            scope_branch,
            scope_os,
            allow_secret,
        } => {
            let output = commands::cmd_set(
                &client,
                component,
                key,
                value,
                tags,
                priority,
                confidence,
                ttl,
                scope_cwd_glob,
                scope_branch,
                scope_os,
                allow_secret,
            )
            .await?;
            emit(&output, json_mode)
        }
        Commands::Get {
            component,
            key,
            cwd,
            branch,
            os,
        } => {
            let output = commands::cmd_get(&client, component, key, cwd, branch, os).await?;
            emit(&output, json_mode)
        }
        Commands::Query {
            component,
            tags,
            limit,
        } => {
            let output = commands::cmd_query(&client, component, tags, limit).await?;
            emit(&output, json_mode)
        }
        Commands::Delete { component, key } => {
            let output = commands::cmd_delete(&client, component, key).await?;
            emit(&output, json_mode)
        }
        Commands::Bump {
            component,
            key,
            delta,
        } => {
            let output = commands::cmd_bump(&client, component, key, delta).await?;
            emit(&output, json_mode)
        }
        Commands::ListComponents { component } => {
            let output = commands::cmd_list_components(&client, component).await?;
            emit(&output, json_mode)
        }
        Commands::Export { format } => {
            let output = commands::cmd_export(&client, format).await?;
            emit(&output, json_mode)
        }
        Commands::Import { file, mode } => {
            let output = commands::cmd_import(&client, file, mode).await?;
            emit(&output, json_mode)
        }
        Commands::Serve { .. } | Commands::Status | Commands::Stop => unreachable!(),
    }
}

#[tokio::main]
async fn main() {
    setup_logging();
    let args = CliArgs::parse();
    let json_mode = args.json;

    if let Err(err) = run(args).await {
        if json_mode {
            println!("{}", json!({"error": err.to_string()}));
        } else {
            eprintln!("Error: {err}");
        }
        std::process::exit(1);
    }
}
