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

//! Onion address and key value types. Construction validates length and
//! alphabet; key material never appears in `Debug` output.

use std::{fmt, str::FromStr};

use data_encoding::{BASE32_NOPAD, BASE64_NOPAD};
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

const ONION_V3_ADDRESS_LEN: usize = 56;
const ONION_V3_RAW_LEN: usize = 35;
const ONION_V3_VERSION_BYTE: u8 = 3;

/// A v3 onion service address: 56 base32 characters encoding the 32-byte
/// ed25519 public key, a 2-byte checksum and the version byte.
///
/// Stored normalized to lowercase without the `.onion` suffix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnionAddressV3 {
    onion: String,
}

impl OnionAddressV3 {
    /// The normalized base32 form, without the `.onion` suffix.
    pub fn as_str(&self) -> &str {
        &self.onion
    }

    pub fn to_onion_string(&self) -> String {
        format!("{}.onion", self.onion)
    }

    /// The 32-byte ed25519 service public key embedded in the address.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        let raw = BASE32_NOPAD
            .decode(self.onion.to_ascii_uppercase().as_bytes())
            .expect("validated at construction");
        let mut key = [0u8; 32];
        key.copy_from_slice(&raw[..32]);
        key
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519V3
    }
}

impl FromStr for OnionAddressV3 {
    type Err = KeyError;

    /// Accepts the bare base32 form or a full `<addr>.onion` domain, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix(".onion").unwrap_or(s);
        if s.len() != ONION_V3_ADDRESS_LEN {
            return Err(KeyError::InvalidLength {
                expected: ONION_V3_ADDRESS_LEN,
                actual: s.len(),
            });
        }
        let normalized = s.to_ascii_lowercase();
        let raw = BASE32_NOPAD
            .decode(normalized.to_ascii_uppercase().as_bytes())
            .map_err(|_| KeyError::InvalidEncoding("base32"))?;
        debug_assert_eq!(raw.len(), ONION_V3_RAW_LEN);
        let version = raw[ONION_V3_RAW_LEN - 1];
        if version != ONION_V3_VERSION_BYTE {
            return Err(KeyError::UnsupportedOnionVersion(version));
        }
        Ok(Self { onion: normalized })
    }
}

impl fmt::Display for OnionAddressV3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for OnionAddressV3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OnionAddressV3({})", self.onion)
    }
}

/// Key algorithms used by onion services and their client authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Ed25519V3,
    X25519,
}

impl KeyAlgorithm {
    pub fn as_tor_repr(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519V3 => "ED25519-V3",
            KeyAlgorithm::X25519 => "x25519",
        }
    }
}

/// A hidden service identity private key, tagged by algorithm.
///
/// The ed25519 blob is kept opaque exactly as tor hands it out from
/// `ADD_ONION ... Flags=...` replies; it is written back verbatim when
/// re-creating the service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HsPrivateKey {
    Ed25519V3(String),
}

impl HsPrivateKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            HsPrivateKey::Ed25519V3(_) => KeyAlgorithm::Ed25519V3,
        }
    }

    /// The `<type>:<blob>` form used by ADD_ONION.
    pub fn to_key_blob(&self) -> String {
        match self {
            HsPrivateKey::Ed25519V3(blob) => format!("ED25519-V3:{}", blob),
        }
    }

    /// Parse the `<type>:<blob>` form returned in an ADD_ONION reply.
    pub fn from_key_blob(s: &str) -> Result<Self, KeyError> {
        match s.split_once(':') {
            Some(("ED25519-V3", blob)) if !blob.is_empty() => Ok(HsPrivateKey::Ed25519V3(blob.to_string())),
            _ => Err(KeyError::InvalidEncoding("ED25519-V3 key blob")),
        }
    }

    /// Whether this key can have produced the given address.
    pub fn matches_address(&self, address: &OnionAddressV3) -> Result<(), KeyError> {
        match (self.algorithm(), address.algorithm()) {
            (KeyAlgorithm::Ed25519V3, KeyAlgorithm::Ed25519V3) => Ok(()),
            (private, public) => Err(KeyError::AlgorithmMismatch {
                public: public.as_tor_repr(),
                private: private.as_tor_repr(),
            }),
        }
    }
}

impl fmt::Debug for HsPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HsPrivateKey::Ed25519V3(_) => f.write_str("HsPrivateKey::Ed25519V3(<redacted>)"),
        }
    }
}

/// A 32-byte ed25519 seed.
#[derive(Clone, PartialEq, Eq)]
pub struct Ed25519Seed {
    bytes: [u8; 32],
}

impl Ed25519Seed {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        Ok(Self { bytes: seed })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for Ed25519Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ed25519Seed(<redacted>)")
    }
}

/// An x25519 client authorization public key: 52 base32 or 43 base64 characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct X25519PublicKey {
    bytes: [u8; 32],
}

/// An x25519 client authorization private key: 52 base32 or 43 base64 characters.
#[derive(Clone, PartialEq, Eq)]
pub struct X25519PrivateKey {
    bytes: [u8; 32],
}

macro_rules! x25519_codec {
    ($ty:ty) => {
        impl $ty {
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
                if bytes.len() != 32 {
                    return Err(KeyError::InvalidLength {
                        expected: 32,
                        actual: bytes.len(),
                    });
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                Ok(Self { bytes: key })
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.bytes
            }

            /// Canonical base32 form: 52 uppercase characters, no padding.
            pub fn to_base32(&self) -> String {
                BASE32_NOPAD.encode(&self.bytes)
            }

            /// Base64 form: 43 characters, no padding.
            pub fn to_base64(&self) -> String {
                BASE64_NOPAD.encode(&self.bytes)
            }
        }

        impl FromStr for $ty {
            type Err = KeyError;

            /// Accepts the 52-char base32 form (any case, padding stripped) or the
            /// 43-char base64 form.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim_end_matches('=');
                match s.len() {
                    52 => {
                        let raw = BASE32_NOPAD
                            .decode(s.to_ascii_uppercase().as_bytes())
                            .map_err(|_| KeyError::InvalidEncoding("base32"))?;
                        Self::from_bytes(&raw)
                    },
                    43 => {
                        let raw = BASE64_NOPAD
                            .decode(s.as_bytes())
                            .map_err(|_| KeyError::InvalidEncoding("base64"))?;
                        Self::from_bytes(&raw)
                    },
                    other => Err(KeyError::InvalidLength {
                        expected: 52,
                        actual: other,
                    }),
                }
            }
        }
    };
}

x25519_codec!(X25519PublicKey);
x25519_codec!(X25519PrivateKey);

impl fmt::Display for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519PublicKey({})", self.to_base32())
    }
}

impl fmt::Debug for X25519PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("X25519PrivateKey(<redacted>)")
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    const ADDR: &str = "hnpsuboubaf2k3p7ioio2gfj22j2xhqdzjbseboaodsw4ujgwgydxyad";

    #[test]
    fn onion_address_round_trips_and_normalizes() {
        let addr = ADDR.parse::<OnionAddressV3>().unwrap();
        assert_eq!(addr.as_str(), ADDR);
        assert_eq!(addr.to_onion_string(), format!("{}.onion", ADDR));

        let upper = ADDR.to_ascii_uppercase().parse::<OnionAddressV3>().unwrap();
        assert_eq!(upper, addr);

        let suffixed = format!("{}.onion", ADDR).parse::<OnionAddressV3>().unwrap();
        assert_eq!(suffixed, addr);
        assert_eq!(addr.public_key_bytes().len(), 32);
    }

    #[test]
    fn onion_address_rejects_bad_input() {
        let err = "tooshort".parse::<OnionAddressV3>().unwrap_err();
        unpack_enum!(KeyError::InvalidLength { expected, actual } = err);
        assert_eq!(expected, 56);
        assert_eq!(actual, 8);

        // '1' and '8' are not in the base32 alphabet
        let bad = "1".repeat(56);
        let err = bad.parse::<OnionAddressV3>().unwrap_err();
        unpack_enum!(KeyError::InvalidEncoding(_e) = err);
    }

    #[test]
    fn hs_private_key_blob_round_trips() {
        let key = HsPrivateKey::from_key_blob("ED25519-V3:H5eXizS97RduOZ3g4v7K").unwrap();
        assert_eq!(key.to_key_blob(), "ED25519-V3:H5eXizS97RduOZ3g4v7K");
        HsPrivateKey::from_key_blob("RSA1024:abc").unwrap_err();
        HsPrivateKey::from_key_blob("ED25519-V3:").unwrap_err();
    }

    #[test]
    fn hs_private_key_debug_is_redacted() {
        let key = HsPrivateKey::Ed25519V3("secret-material".to_string());
        let debug = format!("{:?}", key);
        assert!(!debug.contains("secret-material"));
    }

    #[test]
    fn x25519_parses_base32_and_base64() {
        let bytes = [7u8; 32];
        let key = X25519PublicKey::from_bytes(&bytes).unwrap();

        let b32 = key.to_base32();
        assert_eq!(b32.len(), 52);
        let reparsed = b32.to_ascii_lowercase().parse::<X25519PublicKey>().unwrap();
        assert_eq!(reparsed, key);
        assert_eq!(reparsed.to_base32(), b32);

        let b64 = key.to_base64();
        assert_eq!(b64.len(), 43);
        let reparsed = format!("{}=", b64).parse::<X25519PublicKey>().unwrap();
        assert_eq!(reparsed.to_base64(), b64);

        "short".parse::<X25519PrivateKey>().unwrap_err();
    }

    #[test]
    fn key_and_address_algorithms_must_match() {
        let addr = ADDR.parse::<OnionAddressV3>().unwrap();
        let key = HsPrivateKey::Ed25519V3("blob".to_string());
        key.matches_address(&addr).unwrap();
    }
}
