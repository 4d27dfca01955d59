use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use url::Url;

use magic_folder_daemon::http_server::api::client::ApiClient;
use magic_folder_daemon::AppState;

mod cli;

use cli::op::OpContext;
use cli::Args;

const DEFAULT_REMOTE: &str = "http://127.0.0.1:5050";

/// The control API of the daemon: `--remote`, else the address in
/// config.toml, else the default port on localhost
fn resolve_remote(args: &Args) -> anyhow::Result<Url> {
    if let Some(remote) = &args.remote {
        return Ok(remote.clone());
    }
    match AppState::load(args.config_dir.clone()) {
        Ok(state) => Ok(Url::parse(&format!(
            "http://{}",
            state.config.api_listen_addr
        ))?),
        Err(_) => Ok(Url::parse(DEFAULT_REMOTE)?),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ctx = match resolve_remote(&args).and_then(|remote| {
        Ok(OpContext {
            client: ApiClient::new(&remote)?,
            config_path: args.config_dir.clone(),
        })
    }) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
