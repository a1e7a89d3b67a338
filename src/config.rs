// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listen address, e.g. "127.0.0.1:9100"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub multipart: MultipartConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store: StoreConfig::default(),
            upload: UploadConfig::default(),
            hierarchy: HierarchyConfig::default(),
            multipart: MultipartConfig::default(),
        }
    }
}

/// Where objects live and how URLs for them are produced.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Bucket every node is written to
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Base URL of the store, used for presigned URLs
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_access_key")]
    pub access_key: String,
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    /// Optional public/CDN base; upload results carry `<base>/<key>` when set
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Entries per listing page for the in-memory store
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    /// Lifetime of presigned URLs in seconds
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: default_endpoint(),
            access_key: default_access_key(),
            secret_key: default_secret_key(),
            public_base_url: None,
            list_page_size: default_list_page_size(),
            signed_url_ttl_secs: default_signed_url_ttl_secs(),
        }
    }
}

impl StoreConfig {
    /// Public URL for `key`, if a public base is configured.
    pub fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }
}

/// Defaults for the upload naming policy; requests may override both flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadConfig {
    /// Keep the caller's file name in the key instead of a generated token
    #[serde(default)]
    pub use_original_name: bool,
    /// Overwrite a same-named file in place instead of disambiguating
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyConfig {
    /// Ancestor walks deeper than this are treated as a corrupt (cyclic) index
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultipartConfig {
    /// Delete the placeholder node when an upload is aborted
    #[serde(default)]
    pub delete_placeholder_on_abort: bool,
}

impl Config {
    pub fn from_path(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let s = std::fs::read_to_string(path)?;
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let cfg: Config = toml::from_str(s)?;
        Ok(cfg)
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9100".to_string()
}

fn default_bucket() -> String {
    "files".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_access_key() -> String {
    "s3tree".to_string()
}

fn default_secret_key() -> String {
    "s3tree-secret".to_string()
}

fn default_list_page_size() -> usize {
    1000
}

fn default_signed_url_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_depth() -> usize {
    256
}
