use clap::Parser;
use surfstore::config::DEFAULT_SERVER_ADDR;
use surfstore::{logging, server};

#[derive(Parser, Debug)]
#[command(name = "surfstore-server", version)]
struct Cli {
    /// Address to listen on (host:port)
    #[arg(default_value = DEFAULT_SERVER_ADDR)]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = logging::init_default_log_file("surfstore-server")?;
    logging::info_kv(
        "surfstore-server starting",
        &[("addr", &cli.addr), ("log_file", &log_path.display().to_string())],
    );

    if let Err(e) = server::serve(&cli.addr).await {
        logging::error(format!("server exited with error: {e:#}"));
        return Err(e);
    }
    Ok(())
}
