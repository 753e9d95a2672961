//! Minimal, Linux-only signal handling: SIGINT/SIGTERM trigger shutdown,
//! SIGHUP triggers a policy reload. The daemon only ever runs as an
//! `exec_gate`/`egress_gate`-attaching service on Linux, so unlike the
//! workspace's other platform-split modules this one has no stub sibling.

use anyhow::Result;
use tokio::signal::unix::{signal, Signal, SignalKind};

pub struct Terminate {
    sigint: Signal,
    sigterm: Signal,
}

impl Terminate {
    pub fn new() -> Result<Self> {
        let sigint = signal(SignalKind::interrupt())?;
        let sigterm = signal(SignalKind::terminate())?;

        Ok(Self { sigint, sigterm })
    }

    /// Waits for SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv() => {}
            _ = self.sigterm.recv() => {}
        }
    }
}

pub struct Hangup {
    sighup: Signal,
}

impl Hangup {
    pub fn new() -> Result<Self> {
        let sighup = signal(SignalKind::hangup())?;

        Ok(Self { sighup })
    }

    /// Waits for SIGHUP.
    pub async fn recv(&mut self) {
        self.sighup.recv().await;
    }
}
