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

/// Collect `take` items from a tokio channel receiver, panicking if the
/// channel stalls past `timeout` or closes early.
///
/// Works with both `mpsc` receivers (whose `recv` yields `Option`) and
/// `broadcast` receivers (whose `recv` yields `Result`): each received value
/// is unwrapped before it is collected.
#[macro_export]
macro_rules! collect_recv {
    ($rx:expr, take = $take:expr, timeout = $timeout:expr $(,)?) => {{
        // Borrow once so the receiver expression is not re-evaluated per item
        let rx = &mut $rx;
        let mut collected = Vec::new();
        while collected.len() < $take {
            let received = tokio::time::timeout($timeout, rx.recv())
                .await
                .unwrap_or_else(|_| {
                    panic!(
                        "channel produced {}/{} item(s) before the timeout",
                        collected.len(),
                        $take
                    )
                });
            collected.push(received.expect("channel closed before enough items arrived"));
        }
        collected
    }};
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::sync::{broadcast, mpsc};

    #[tokio::test]
    async fn collects_from_mpsc_and_broadcast_receivers() {
        let (tx, mut rx) = mpsc::channel(8);
        for n in 0..3 {
            tx.send(n).await.unwrap();
        }
        let items: Vec<i32> = crate::collect_recv!(rx, take = 3, timeout = Duration::from_secs(1));
        assert_eq!(items, vec![0, 1, 2]);

        let (tx, mut rx) = broadcast::channel(8);
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        let items = crate::collect_recv!(rx, take = 2, timeout = Duration::from_secs(1));
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    #[should_panic(expected = "before the timeout")]
    async fn panics_when_the_channel_stalls() {
        let (_tx, mut rx) = mpsc::channel::<u8>(1);
        let _ = crate::collect_recv!(rx, take = 1, timeout = Duration::from_millis(50));
    }
}
