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

use crate::config::AuthSettings;
use rspotify::{prelude::*, AuthCodeSpotify, Config, Credentials, OAuth};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to initialize Spotify client: {0}")]
    ClientConfig(String),
    #[error("Spotify authentication failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
}

/// Builds and authenticates a Spotify client using the Authorization Code Flow.
///
/// The token is cached at `settings.token_cache_path` and refreshed
/// automatically. Without a valid cached token the user is asked (via stdout)
/// to visit a URL to authorize the application.
pub async fn get_spotify_client(settings: &AuthSettings) -> Result<AuthCodeSpotify, AuthError> {
    if settings.redirect_uri.is_empty() {
        return Err(AuthError::ClientConfig("Redirect URI is empty".to_string()));
    }

    let creds = Credentials::new(
        &settings.credentials.client_id,
        &settings.credentials.client_secret,
    );

    // Read-only scopes: playlists (private and collaborative) and Liked Songs.
    let oauth = OAuth {
        redirect_uri: settings.redirect_uri.clone(),
        scopes: settings.scopes.iter().cloned().collect(),
        ..Default::default()
    };

    let config = Config {
        token_cached: true,
        token_refreshing: true,
        cache_path: settings.token_cache_path.clone(),
        ..Default::default()
    };

    let spotify = AuthCodeSpotify::with_config(creds, oauth, config);

    let url = spotify.get_authorize_url(false)?;

    // Uses the cached token when there is one; otherwise opens the browser
    // (or prints the URL) and waits for the redirect to be pasted back.
    spotify.prompt_for_token(&url).await?;

    Ok(spotify)
}
