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

//! Pattern matching over tor's stdout/stderr lines. Lines carry a timestamp
//! and severity prefix, so everything matches by substring.

/// `... Bootstrapped 80% (ap_conn): Connecting to a relay ...` -> `80`
pub(crate) fn parse_bootstrap(line: &str) -> Option<u8> {
    let idx = line.find("Bootstrapped ")?;
    let rest = &line[idx + "Bootstrapped ".len()..];
    let percent = rest.find('%')?;
    rest[..percent].parse().ok()
}

/// `... Opened Socks listener connection (ready) on 127.0.0.1:9050` ->
/// `("Socks", "127.0.0.1:9050")`
pub(crate) fn parse_listener_opened(line: &str) -> Option<(String, String)> {
    let idx = line.find("Opened ")?;
    let rest = &line[idx + "Opened ".len()..];
    let kind_end = rest.find(" listener")?;
    let kind = &rest[..kind_end];
    let on = rest.find(" on ")?;
    let address = rest[on + " on ".len()..].trim();
    if address.is_empty() {
        return None;
    }
    Some((kind.to_string(), address.to_string()))
}

/// `... Closing no-longer-configured Socks listener on 127.0.0.1:9050` ->
/// `("Socks", "127.0.0.1:9050")`. Also matches the partially-constructed form.
pub(crate) fn parse_listener_closed(line: &str) -> Option<(String, String)> {
    let rest = ["Closing no-longer-configured ", "Closing partially-constructed "]
        .iter()
        .find_map(|prefix| line.find(prefix).map(|idx| &line[idx + prefix.len()..]))?;
    let kind_end = rest.find(" listener")?;
    let kind = &rest[..kind_end];
    let on = rest.find(" on ")?;
    let address = rest[on + " on ".len()..].trim();
    if address.is_empty() {
        return None;
    }
    Some((kind.to_string(), address.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_bootstrap_progress() {
        assert_eq!(
            parse_bootstrap("Dec 06 21:08:17.000 [notice] Bootstrapped 0% (starting): Starting"),
            Some(0)
        );
        assert_eq!(
            parse_bootstrap("Dec 06 21:08:29.000 [notice] Bootstrapped 80% (ap_conn): Connecting to a relay"),
            Some(80)
        );
        assert_eq!(
            parse_bootstrap("Dec 06 21:08:34.000 [notice] Bootstrapped 100% (done): Done"),
            Some(100)
        );
        assert_eq!(parse_bootstrap("Bootstrapped NaN% (x)"), None);
        assert_eq!(parse_bootstrap("[notice] Opening Socks listener"), None);
    }

    #[test]
    fn parses_listener_opened() {
        assert_eq!(
            parse_listener_opened(
                "Dec 06 21:08:17.000 [notice] Opened Socks listener connection (ready) on 127.0.0.1:9050"
            ),
            Some(("Socks".to_string(), "127.0.0.1:9050".to_string()))
        );
        assert_eq!(
            parse_listener_opened("[notice] Opened Control listener connection (ready) on /run/tor/control.sock"),
            Some(("Control".to_string(), "/run/tor/control.sock".to_string()))
        );
        assert_eq!(parse_listener_opened("[notice] Opened something else"), None);
    }

    #[test]
    fn parses_listener_closed() {
        assert_eq!(
            parse_listener_closed("[notice] Closing no-longer-configured Socks listener on 127.0.0.1:9050"),
            Some(("Socks".to_string(), "127.0.0.1:9050".to_string()))
        );
        assert_eq!(
            parse_listener_closed("[notice] Closing partially-constructed DNS listener on 127.0.0.1:5353"),
            Some(("DNS".to_string(), "127.0.0.1:5353".to_string()))
        );
        assert_eq!(
            parse_listener_closed("[notice] Closing old Socks listener on 127.0.0.1:9050"),
            None
        );
    }
}
