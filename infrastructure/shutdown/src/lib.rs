// Copyright 2025, The Embedtor Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A convenient shutdown signal. [Shutdown] is the owning trigger; any number of cloneable
//! [ShutdownSignal]s can be handed out to tasks which `wait()` on it, typically inside a
//! `tokio::select!` loop.

use tokio::sync::watch;

/// The owning side of a shutdown signal. Dropping a `Shutdown` triggers it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    signal: ShutdownSignal,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx,
            signal: ShutdownSignal { rx },
        }
    }

    /// Trigger the shutdown. Idempotent.
    pub fn trigger(&mut self) {
        // Receivers may all have been dropped; that is not an error.
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.trigger();
    }
}

/// The receiving side of a [Shutdown]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until the shutdown is triggered. Returns immediately if it already was.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // Err means the sender was dropped, which also triggers shutdown.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn trigger_releases_all_signals() {
        let mut shutdown = Shutdown::new();
        let mut s1 = shutdown.to_signal();
        let mut s2 = shutdown.to_signal();
        assert!(!s1.is_triggered());

        shutdown.trigger();
        // Should not hang
        s1.wait().await;
        s2.wait().await;
        assert!(shutdown.is_triggered());
        assert!(s2.is_triggered());
        // Triggering again is a no-op
        shutdown.trigger();
    }

    #[tokio::test]
    async fn drop_triggers() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.to_signal();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_pre_triggered() {
        let mut shutdown = Shutdown::new();
        shutdown.trigger();
        let mut signal = shutdown.to_signal();
        signal.wait().await;
    }
}
