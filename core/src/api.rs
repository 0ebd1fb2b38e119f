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

use crate::models::{
    AlbumRef, ArtistRef, Cursor, ItemKind, Page, PlaylistRef, RawItem, TrackFeatures,
    TrackPayload, UserRef,
};
use async_trait::async_trait;
use rspotify::{
    http::HttpError,
    model::{AudioFeatures, FullTrack, Market, PlayableItem, PlaylistId, TrackId},
    prelude::*,
    AuthCodeSpotify, ClientError,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const PLAYLISTS_PAGE_SIZE: u32 = 50;
const PLAYLIST_ITEMS_PAGE_SIZE: u32 = 100;

/// Failure of a single remote call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// Raw `Retry-After` header, if the response carried one.
        retry_after: Option<String>,
        message: String,
    },
    /// Anything that went wrong without a status: network, decoding, token refresh.
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid Spotify id: {0}")]
    InvalidId(String),
    #[error("invalid page cursor: {0}")]
    InvalidCursor(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<&str> {
        match self {
            ApiError::Status { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        if let ClientError::Http(http) = &err {
            if let HttpError::StatusCode(response) = http.as_ref() {
                let status = response.status();
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                return ApiError::Status {
                    status: status.as_u16(),
                    retry_after,
                    message: status.to_string(),
                };
            }
        }
        ApiError::Transport(err.to_string())
    }
}

/// The slice of the streaming service the exporter talks to.
///
/// Every method is a single remote call; retrying is the caller's business.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// One page of the current user's playlists.
    async fn playlists_page(&self, cursor: Option<Cursor>) -> Result<Page<PlaylistRef>, ApiError>;

    /// One page of entries of a playlist.
    async fn playlist_items_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<RawItem>, ApiError>;

    /// One page of the user's saved ("liked") tracks.
    async fn saved_tracks_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<Page<RawItem>, ApiError>;

    /// Audio features for up to 100 ids, positionally aligned with `ids`.
    /// Ids the service knows nothing about map to `None`.
    async fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<TrackFeatures>>, ApiError>;

    async fn current_user(&self) -> Result<UserRef, ApiError>;
}

/// `LibraryApi` backed by an authenticated rspotify client.
pub struct SpotifyLibrary {
    spotify: Arc<AuthCodeSpotify>,
}

impl SpotifyLibrary {
    pub fn new(spotify: AuthCodeSpotify) -> Self {
        Self {
            spotify: Arc::new(spotify),
        }
    }
}

#[async_trait]
impl LibraryApi for SpotifyLibrary {
    async fn playlists_page(&self, cursor: Option<Cursor>) -> Result<Page<PlaylistRef>, ApiError> {
        let offset = offset_from(cursor)?;
        let page = self
            .spotify
            .current_user_playlists_manual(Some(PLAYLISTS_PAGE_SIZE), Some(offset))
            .await?;
        let next = next_cursor(&page);

        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|pl| PlaylistRef {
                    id: pl.id.id().to_string(),
                    name: pl.name,
                    total_tracks: pl.tracks.total,
                })
                .collect(),
            next,
            total: Some(page.total),
        })
    }

    async fn playlist_items_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<RawItem>, ApiError> {
        let id = PlaylistId::from_id(playlist_id)
            .map_err(|_| ApiError::InvalidId(playlist_id.to_string()))?;
        let offset = offset_from(cursor)?;
        let page = self
            .spotify
            .playlist_items_manual(
                id,
                None,
                Some(Market::FromToken),
                Some(PLAYLIST_ITEMS_PAGE_SIZE),
                Some(offset),
            )
            .await?;
        let next = next_cursor(&page);

        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|item| RawItem {
                    track: item.track.map(playable_payload),
                    added_at: item.added_at.map(|at| at.format(TIMESTAMP_FORMAT).to_string()),
                    added_by: item.added_by.map(|user| user.id.id().to_string()),
                })
                .collect(),
            next,
            total: Some(page.total),
        })
    }

    async fn saved_tracks_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<Page<RawItem>, ApiError> {
        let offset = offset_from(cursor)?;
        let page = self
            .spotify
            .current_user_saved_tracks_manual(None, Some(limit), Some(offset))
            .await?;
        let next = next_cursor(&page);

        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|saved| RawItem {
                    added_at: Some(saved.added_at.format(TIMESTAMP_FORMAT).to_string()),
                    track: Some(track_payload(saved.track)),
                    added_by: None,
                })
                .collect(),
            next,
            total: Some(page.total),
        })
    }

    async fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<TrackFeatures>>, ApiError> {
        // Malformed ids are never sent; they come back as `None` like unknown ones.
        let track_ids: Vec<TrackId<'static>> = ids
            .iter()
            .filter_map(|id| TrackId::from_id(id.clone()).ok())
            .collect();
        if track_ids.is_empty() {
            return Ok(vec![None; ids.len()]);
        }

        let fetched = self
            .spotify
            .tracks_features(track_ids)
            .await?
            .unwrap_or_default();
        let by_id: HashMap<String, TrackFeatures> = fetched
            .iter()
            .map(|features| (features.id.id().to_string(), features_from(features)))
            .collect();

        Ok(ids.iter().map(|id| by_id.get(id).copied()).collect())
    }

    async fn current_user(&self) -> Result<UserRef, ApiError> {
        let user = self.spotify.current_user().await?;
        Ok(UserRef {
            id: user.id.id().to_string(),
            display_name: user.display_name,
        })
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn offset_from(cursor: Option<Cursor>) -> Result<u32, ApiError> {
    match cursor {
        None => Ok(0),
        Some(cursor) => cursor
            .as_str()
            .parse()
            .map_err(|_| ApiError::InvalidCursor(cursor.as_str().to_string())),
    }
}

/// The service links the next page by offset; the offset becomes the cursor.
fn next_cursor<T>(page: &rspotify::model::Page<T>) -> Option<Cursor> {
    page.next
        .as_ref()
        .map(|_| Cursor::new((page.offset + page.limit).to_string()))
}

fn playable_payload(playable: PlayableItem) -> TrackPayload {
    match playable {
        PlayableItem::Track(track) => track_payload(track),
        PlayableItem::Episode(episode) => TrackPayload {
            id: Some(episode.id.id().to_string()),
            kind: ItemKind::Episode,
            name: Some(episode.name),
            ..Default::default()
        },
    }
}

fn track_payload(track: FullTrack) -> TrackPayload {
    let id = track.id.as_ref().map(|id| id.id().to_string());
    let spotify_url = track.external_urls.get("spotify").cloned();

    TrackPayload {
        id,
        is_local: track.is_local,
        kind: ItemKind::Track,
        name: Some(track.name),
        artists: track
            .artists
            .into_iter()
            .map(|artist| ArtistRef {
                name: Some(artist.name),
            })
            .collect(),
        album: Some(AlbumRef {
            name: Some(track.album.name),
            album_type: track.album.album_type,
            release_date: track.album.release_date,
        }),
        duration_ms: u64::try_from(track.duration.num_milliseconds()).ok(),
        popularity: Some(track.popularity),
        explicit: Some(track.explicit),
        track_number: Some(track.track_number),
        disc_number: Some(track.disc_number),
        spotify_url,
        preview_url: track.preview_url,
    }
}

fn features_from(features: &AudioFeatures) -> TrackFeatures {
    TrackFeatures {
        danceability: features.danceability,
        energy: features.energy,
        key: features.key,
        loudness: features.loudness,
        mode: features.mode as i32,
        speechiness: features.speechiness,
        acousticness: features.acousticness,
        instrumentalness: features.instrumentalness,
        liveness: features.liveness,
        valence: features.valence,
        tempo: features.tempo,
        time_signature: features.time_signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_from_cursor() {
        assert_eq!(offset_from(None).unwrap(), 0);
        assert_eq!(offset_from(Some(Cursor::new("150"))).unwrap(), 150);
        assert!(matches!(
            offset_from(Some(Cursor::new("next-page"))),
            Err(ApiError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_status_accessors() {
        let err = ApiError::Status {
            status: 429,
            retry_after: Some("3".to_string()),
            message: "429 Too Many Requests".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some("3"));

        let err = ApiError::Transport("connection reset".to_string());
        assert_eq!(err.status(), None);
        assert_eq!(err.retry_after(), None);
    }
}
