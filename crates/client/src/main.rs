use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use log::{info, warn};
use tokio::{
    net::UdpSocket,
    time::{self, Instant},
};

use time_server::{
    logging,
    protocol::{self, Command, MAX_DATAGRAM},
    DEFAULT_PORT,
};

/// Plays the device side: asks for the time, prints what arrives, then acknowledges.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Time server's IP
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// The port the time server listens on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// how many timestamps to receive before sending 'Get OK'
    #[arg(short, long, default_value_t = 3)]
    count: u32,

    /// how many times we resend 'Get time' after a timeout
    #[arg(short, long, default_value_t = 5)]
    retry: u8,

    /// how long second we wait for each timestamp
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

/// Renders a received timestamp next to the local clock.
fn describe(received: DateTime<Utc>, local_now: DateTime<Utc>) -> String {
    let offset = (received - local_now).num_milliseconds();
    format!(
        "{} (offset {offset:+}ms)",
        received
            .with_timezone(&Local)
            .naive_local()
            .format("%Y-%m-%d %H:%M:%S%.3f")
    )
}

/// Asks for the time, collects `count` timestamps, then acknowledges with `Get OK`.
///
/// Each timestamp has `timeout` to arrive. A window that ends empty resends
/// `Get time`; more than `retry` empty windows in a row is an error. Receive
/// errors, such as a refused port while the server is down, wait out the rest
/// of the window instead of ending it early.
async fn exchange(
    udp: &UdpSocket,
    count: u32,
    retry: u8,
    timeout: Duration,
) -> anyhow::Result<Vec<DateTime<Utc>>> {
    udp.send(Command::GetTime.as_bytes()).await?;

    let mut buf = [0u8; MAX_DATAGRAM];
    let mut timestamps = Vec::with_capacity(count as usize);
    let mut count_retry = 0;
    let mut deadline = Instant::now() + timeout;
    while timestamps.len() < count as usize {
        let read = time::timeout_at(deadline, udp.recv(&mut buf)).await;
        match read {
            Ok(Ok(size)) => {
                let Some(timestamp) = protocol::decode_timestamp(&buf[..size]) else {
                    warn!(
                        "unexpected reply: {:?}",
                        String::from_utf8_lossy(&buf[..size])
                    );
                    continue;
                };
                count_retry = 0;
                deadline = Instant::now() + timeout;
                timestamps.push(timestamp);
                info!(
                    "timestamp {}/{count}: {}",
                    timestamps.len(),
                    describe(timestamp, Utc::now())
                );
                continue;
            }
            Ok(Err(e)) => {
                warn!("receive error: {e}");
                time::sleep_until(deadline).await;
            }
            Err(_elapsed) => {}
        }

        count_retry += 1;
        if count_retry > retry {
            bail!("no timestamp within {retry} retries");
        }
        warn!("no timestamp within {timeout:?}, resending 'Get time'");
        if let Err(e) = udp.send(Command::GetTime.as_bytes()).await {
            warn!("failed to resend 'Get time': {e}");
        }
        deadline = Instant::now() + timeout;
    }

    udp.send(Command::GetOk.as_bytes()).await?;
    info!("sent 'Get OK'");
    Ok(timestamps)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let Args {
        server,
        port,
        count,
        retry,
        timeout: time_out_seconds,
    } = Args::parse();

    let udp = UdpSocket::bind("0.0.0.0:0").await?;
    udp.connect(format!("{server}:{port}"))
        .await
        .with_context(|| format!("failed to reach {server}:{port}"))?;
    info!("asking {server}:{port} for the time");
    exchange(&udp, count, retry, Duration::from_secs(time_out_seconds))
        .await
        .with_context(|| format!("time exchange with {server}:{port} failed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use time_server::{Config, TimeServer};

    #[test]
    fn describes_positive_and_negative_offsets() {
        let now = Utc.timestamp_opt(1_729_339_200, 0).unwrap();
        let ahead = now + chrono::Duration::milliseconds(250);
        let behind = now - chrono::Duration::milliseconds(1500);
        assert!(describe(ahead, now).ends_with("(offset +250ms)"));
        assert!(describe(behind, now).ends_with("(offset -1500ms)"));
    }

    #[test]
    fn args_default_to_local_server() {
        let args = Args::parse_from(["time-client"]);
        assert_eq!(args.server, "127.0.0.1");
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.count, 3);
    }

    #[test]
    fn args_accept_overrides() {
        let args = Args::parse_from([
            "time-client", "-s", "192.168.4.1", "-p", "9000", "-c", "10", "--timeout", "1",
        ]);
        assert_eq!(args.server, "192.168.4.1");
        assert_eq!(args.port, 9000);
        assert_eq!(args.count, 10);
        assert_eq!(args.timeout, 1);
        assert_eq!(args.retry, 5);
    }

    async fn server(
        interval: Duration,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>) {
        let server = TimeServer::bind(Config {
            bind: "127.0.0.1:0".parse().unwrap(),
            interval,
        })
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        (addr, tokio::spawn(server.run(std::future::pending())))
    }

    async fn device(peer: std::net::SocketAddr) -> UdpSocket {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        udp.connect(peer).await.unwrap();
        udp
    }

    #[tokio::test]
    async fn exchange_collects_count_timestamps_then_stops_the_stream() {
        let (addr, handle) = server(Duration::from_millis(50)).await;
        let udp = device(addr).await;

        let timestamps = exchange(&udp, 3, 2, Duration::from_secs(2)).await.unwrap();
        assert_eq!(timestamps.len(), 3);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        for ts in &timestamps {
            assert!((Utc::now() - *ts).num_milliseconds().abs() < 5_000);
        }

        // anything already in flight lands first, then the server goes quiet
        time::sleep(Duration::from_millis(100)).await;
        let mut buf = [0u8; 64];
        while udp.try_recv(&mut buf).is_ok() {}
        assert!(time::timeout(Duration::from_millis(300), udp.recv(&mut buf))
            .await
            .is_err());
        handle.abort();
    }

    #[tokio::test]
    async fn exchange_gives_up_after_retry_silent_windows() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp = device(silent.local_addr().unwrap()).await;

        let started = Instant::now();
        let result = exchange(&udp, 1, 2, Duration::from_millis(100)).await;
        assert!(result.is_err());
        // one initial window plus two retries
        assert!(started.elapsed() >= Duration::from_millis(280));

        let mut buf = [0u8; 64];
        let mut requests = 0;
        while let Ok(size) = silent.try_recv(&mut buf) {
            assert_eq!(&buf[..size], Command::GetTime.as_bytes());
            requests += 1;
        }
        assert_eq!(requests, 3);
    }

    #[tokio::test]
    async fn refused_port_still_waits_out_each_window() {
        let closed = {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket.local_addr().unwrap()
        };
        let udp = device(closed).await;

        let started = Instant::now();
        let result = exchange(&udp, 1, 2, Duration::from_millis(100)).await;
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(280));
    }

    #[tokio::test]
    async fn junk_replies_do_not_refill_the_retry_budget() {
        let chatty = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp = device(chatty.local_addr().unwrap()).await;
        let client = udp.local_addr().unwrap();
        let noise = tokio::spawn(async move {
            loop {
                let _ = chatty.send_to(b"hello", client).await;
                time::sleep(Duration::from_millis(20)).await;
            }
        });

        let result = time::timeout(
            Duration::from_secs(2),
            exchange(&udp, 1, 1, Duration::from_millis(100)),
        )
        .await
        .expect("exchange kept retrying on junk");
        assert!(result.is_err());
        noise.abort();
    }
}
