use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chanlog")]
#[command(version, about = "Serve recent Discord channel messages over HTTP", long_about = None)]
struct Cli {
    /// Discord bot auth token (default: DISCORD_BOT_TOKEN or discord.token in the config file)
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Config file path (default: CHANLOG_CONFIG_PATH or ~/.chanlog/config.json)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// HTTP port (default from config or 8080)
    #[arg(long, short)]
    port: Option<u16>,

    /// HTTP bind address (default from config or 0.0.0.0)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(cli.config)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = cli.port {
        config.server.port = p;
    }
    if let Some(b) = cli.bind {
        config.server.bind = b;
    }

    let token = lib::config::resolve_discord_token(cli.token.as_deref(), &config)
        .ok_or_else(|| anyhow::anyhow!("missing token"))?;

    lib::http::run(config, token).await
}
