use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use time_server::{logging, Config, TimeServer, DEFAULT_INTERVAL};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Local IP the service listens on
    #[arg(short, long, default_value_t = Config::default().bind.ip())]
    bind: IpAddr,

    /// UDP port devices send 'Get time' to
    #[arg(short, long, default_value_t = Config::default().bind.port())]
    port: u16,

    /// how many milliseconds between two timestamps
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL.as_millis() as u64)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let Args {
        bind,
        port,
        interval,
    } = Args::parse();
    let config = Config {
        bind: SocketAddr::new(bind, port),
        interval: Duration::from_millis(interval),
    };

    let server = TimeServer::bind(config.clone())
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        "listening on {}, pushing every {:?}",
        server.local_addr()?,
        config.interval
    );

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    info!("terminated");
    Ok(())
}
