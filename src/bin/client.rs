use std::path::PathBuf;

use clap::Parser;
use surfstore::rpc_client::RpcClient;
use surfstore::{logging, sync};

#[derive(Parser, Debug)]
#[command(name = "surfstore-client", version)]
struct Cli {
    /// host:port of the server
    hostport: String,

    /// The base directory to synchronize
    basedir: PathBuf,

    /// Block size, in bytes
    blocksize: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = logging::init_default_log_file("surfstore-client")?;
    logging::info_kv(
        "surfstore-client starting",
        &[
            ("hostport", cli.hostport.as_str()),
            ("basedir", &cli.basedir.display().to_string()),
            ("blocksize", &cli.blocksize.to_string()),
            ("log_file", &log_path.display().to_string()),
        ],
    );

    let client = RpcClient::new(&format!("http://{}", cli.hostport))?;
    client.ping().await?;
    logging::info("ping() successful");

    logging::info("start synchronization");
    sync::sync_once(&client, &cli.basedir, cli.blocksize).await?;
    logging::info("synchronization complete");

    Ok(())
}
