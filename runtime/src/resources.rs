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

//! The seam through which a tor executable and its resource files reach the
//! runtime. Binary extraction and installation live entirely behind this trait.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::RuntimeError;

/// The files needed to launch a tor process.
#[derive(Debug, Clone)]
pub struct TorResources {
    pub tor_executable: PathBuf,
    pub geoip_file: Option<PathBuf>,
    pub geoip6_file: Option<PathBuf>,
}

impl TorResources {
    pub fn new<P: Into<PathBuf>>(tor_executable: P) -> Self {
        Self {
            tor_executable: tor_executable.into(),
            geoip_file: None,
            geoip6_file: None,
        }
    }

    pub fn with_geoip<P: Into<PathBuf>>(mut self, geoip: P, geoip6: P) -> Self {
        self.geoip_file = Some(geoip.into());
        self.geoip6_file = Some(geoip6.into());
        self
    }
}

/// Delivers the tor executable and resource files. Implementations may extract
/// bundled binaries, download them, or simply point at an installed tor.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn resources(&self) -> Result<TorResources, RuntimeError>;
}

/// A provider for a tor binary already present on the host.
pub struct StaticResourceProvider {
    resources: TorResources,
}

impl StaticResourceProvider {
    pub fn new(resources: TorResources) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ResourceProvider for StaticResourceProvider {
    async fn resources(&self) -> Result<TorResources, RuntimeError> {
        Ok(self.resources.clone())
    }
}
