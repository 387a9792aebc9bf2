use std::net::SocketAddr;

use crate::protocol::Command;

/// What a command did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Retargeted { previous: SocketAddr },
    Stopped,
    Ignored,
}

/// Who we push timestamps to, and whether we are currently pushing.
#[derive(Debug, Default)]
pub struct Session {
    target: Option<SocketAddr>,
    sending: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, command: Command, from: SocketAddr) -> Transition {
        match command {
            Command::GetTime => {
                let previous = self.target.replace(from);
                if self.sending {
                    // newest requester takes over the stream
                    Transition::Retargeted {
                        previous: previous.unwrap_or(from),
                    }
                } else {
                    self.sending = true;
                    Transition::Started
                }
            }
            Command::GetOk => {
                if self.sending && self.target == Some(from) {
                    self.sending = false;
                    Transition::Stopped
                } else {
                    Transition::Ignored
                }
            }
        }
    }

    /// Address to push to, `None` while idle.
    pub fn target(&self) -> Option<SocketAddr> {
        if self.sending {
            self.target
        } else {
            None
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }
}
