use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    net::UdpSocket,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

use crate::protocol::{self, Command, MAX_DATAGRAM};
use crate::session::{Session, Transition};

pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the service socket binds to.
    pub bind: SocketAddr,
    /// Delay between two timestamps pushed to the target.
    pub interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            interval: DEFAULT_INTERVAL,
        }
    }
}

struct Request {
    command: Command,
    from: SocketAddr,
}

pub struct TimeServer {
    socket: Arc<UdpSocket>,
    config: Config,
}

impl TimeServer {
    pub async fn bind(config: Config) -> io::Result<Self> {
        if config.interval.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "push interval must be greater than zero",
            ));
        }
        let socket = UdpSocket::bind(config.bind).await?;
        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// A reader task forwards every recognised command to this task, which owns
    /// the session and the push ticker. Only one stream exists at a time.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (sender, mut receiver) = mpsc::channel::<Request>(200);
        let reader = tokio::spawn(receive_loop(self.socket.clone(), sender));

        let mut session = Session::new();
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                request = receiver.recv() => {
                    let Some(Request { command, from }) = request else {
                        break;
                    };
                    match session.handle(command, from) {
                        Transition::Started => {
                            info!("received 'Get time' request from {from}");
                            ticker.reset_immediately();
                        }
                        Transition::Retargeted { previous } => {
                            info!("received 'Get time' request from {from}, replacing {previous}");
                            ticker.reset_immediately();
                        }
                        Transition::Stopped => {
                            info!("received 'Get OK' from {from}, stop sending");
                        }
                        Transition::Ignored => {
                            debug!("ignoring {command:?} from {from}");
                        }
                    }
                }
                _ = ticker.tick(), if session.is_sending() => {
                    if let Some(target) = session.target() {
                        self.push_timestamp(target).await;
                    }
                }
            }
        }
        reader.abort();
        Ok(())
    }

    async fn push_timestamp(&self, target: SocketAddr) {
        let timestamp = protocol::encode_timestamp(Utc::now());
        match self.socket.send_to(timestamp.as_bytes(), target).await {
            Ok(_) => debug!("sent timestamp {timestamp} to {target}"),
            Err(e) => warn!("failed to send timestamp to {target}: {e}"),
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, sender: mpsc::Sender<Request>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (size, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // e.g. ICMP port unreachable surfacing from an earlier send
                warn!("receive error: {e}");
                continue;
            }
        };
        let Some(command) = Command::parse(&buf[..size]) else {
            debug!(
                "ignoring {size} byte datagram from {from}: {:?}",
                String::from_utf8_lossy(&buf[..size])
            );
            continue;
        };
        if sender.send(Request { command, from }).await.is_err() {
            break;
        }
    }
}
