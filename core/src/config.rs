/*
    spotify-export-rs | Rust CLI tool to export playlists and Liked Songs to CSV.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::features::FEATURES_BATCH_SIZE;
use crate::retry::{Backoff, RequestExecutor, DEFAULT_MAX_RETRIES};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/callback";
pub const DEFAULT_SCOPES: [&str; 3] = [
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-library-read",
];
pub const DEFAULT_SECRETS_FILE: &str = ".api_secrets";
pub const DEFAULT_OUTPUT_DIR: &str = "data";
/// `added_by` value of liked songs when no identity label is given.
pub const DEFAULT_ACTING_USER: &str = "me";

const CLIENT_ID_KEY: &str = "SPOTIFY_CLIENT_ID";
const CLIENT_SECRET_KEY: &str = "SPOTIFY_CLIENT_SECRET";
const TOKEN_CACHE_STEM: &str = ".spotify_token_cache";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Spotify Client ID and Client Secret are required. \
         Provide them as arguments or in the {0} file."
    )]
    MissingCredentials(String),
    #[error("Failed to read secrets file: {0}")]
    Secrets(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Reads `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET` from a key=value file.
///
/// A missing file, or a file that lacks either value, yields `None`.
pub fn load_secrets(path: &Path) -> Result<Option<ClientCredentials>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut client_id = None;
    let mut client_secret = None;
    for entry in dotenvy::from_path_iter(path)? {
        let (key, value) = entry?;
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            CLIENT_ID_KEY => client_id = Some(value.to_string()),
            CLIENT_SECRET_KEY => client_secret = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(client_id
        .zip(client_secret)
        .map(|(client_id, client_secret)| ClientCredentials {
            client_id,
            client_secret,
        }))
}

/// Explicit values win; the secrets file fills whatever is missing.
pub fn resolve_credentials(
    client_id: Option<String>,
    client_secret: Option<String>,
    secrets_path: &Path,
) -> Result<ClientCredentials, ConfigError> {
    let mut client_id = client_id.filter(|v| !v.is_empty());
    let mut client_secret = client_secret.filter(|v| !v.is_empty());

    if client_id.is_none() || client_secret.is_none() {
        if let Some(file) = load_secrets(secrets_path)? {
            client_id.get_or_insert(file.client_id);
            client_secret.get_or_insert(file.client_secret);
        }
    }

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(ClientCredentials {
            client_id,
            client_secret,
        }),
        _ => Err(ConfigError::MissingCredentials(
            secrets_path.display().to_string(),
        )),
    }
}

/// Keeps alphanumerics, `-` and `_` so a label can be part of a file name.
pub fn safe_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// Token cache file, one per identity so sessions never overwrite each other.
pub fn token_cache_path(label: Option<&str>) -> PathBuf {
    match label {
        Some(label) => PathBuf::from(format!("{}_{}.json", TOKEN_CACHE_STEM, safe_label(label))),
        None => PathBuf::from(format!("{}.json", TOKEN_CACHE_STEM)),
    }
}

/// Everything needed to build an authenticated client.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub credentials: ClientCredentials,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_cache_path: PathBuf,
}

impl AuthSettings {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            credentials,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            token_cache_path: token_cache_path(None),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Uses a token cache of its own for `label`.
    pub fn for_identity(mut self, label: &str) -> Self {
        self.token_cache_path = token_cache_path(Some(label));
        self
    }
}

/// How exports are fetched and where they land.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub fetch_features: bool,
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Written as `added_by` for liked songs.
    pub acting_user: String,
    /// Prepended as `<prefix>__` to every file name.
    pub file_prefix: Option<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            fetch_features: true,
            batch_size: FEATURES_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            acting_user: DEFAULT_ACTING_USER.to_string(),
            file_prefix: None,
        }
    }
}

impl ExportSettings {
    /// Settings for one of several identities exported side by side.
    ///
    /// The prefix is the sanitized label, so files stay inside `output_dir`.
    pub fn for_identity(mut self, label: &str, prefixed: bool) -> Self {
        self.acting_user = label.to_string();
        self.file_prefix = Some(safe_label(label)).filter(|prefix| prefixed && !prefix.is_empty());
        self
    }

    pub fn executor(&self) -> RequestExecutor {
        RequestExecutor::new(self.max_retries, self.backoff)
    }
}

/// One account a command runs for.
#[derive(Debug, Clone)]
pub struct IdentityPlan {
    pub label: Option<String>,
    pub auth: AuthSettings,
    pub export: ExportSettings,
}

impl IdentityPlan {
    pub fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("default")
    }
}

/// One plan per label, or a single unlabelled plan when there are none.
///
/// Every label gets its own token cache and `added_by` value. File names are
/// only prefixed when several accounts share the output directory.
pub fn plan_identities(
    labels: &[String],
    auth: AuthSettings,
    export: ExportSettings,
) -> Vec<IdentityPlan> {
    if labels.is_empty() {
        return vec![IdentityPlan {
            label: None,
            auth,
            export,
        }];
    }

    let prefixed = labels.len() > 1;
    labels
        .iter()
        .map(|label| IdentityPlan {
            label: Some(label.clone()),
            auth: auth.clone().for_identity(label),
            export: export.clone().for_identity(label, prefixed),
        })
        .collect()
}
