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

//! In-memory `LibraryApi` used by the unit tests.

use crate::api::{ApiError, LibraryApi};
use crate::models::{
    AlbumRef, ArtistRef, Cursor, ItemKind, Page, PlaylistRef, RawItem, TrackFeatures,
    TrackPayload, UserRef,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

type FeatureResponse = Result<Vec<Option<TrackFeatures>>, ApiError>;

pub struct FakeLibrary {
    pub page_size: usize,
    pub playlists: Vec<PlaylistRef>,
    pub playlist_items: HashMap<String, Vec<RawItem>>,
    pub saved: Vec<RawItem>,
    pub features: HashMap<String, TrackFeatures>,
    pub user: UserRef,
    /// Playlist ids whose item listing always fails with the given status.
    pub failing_playlists: HashMap<String, u16>,
    /// Scripted feature answers, consumed before falling back to `features`.
    pub feature_responses: Mutex<VecDeque<FeatureResponse>>,
    pub feature_batches: Mutex<Vec<Vec<String>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            playlists: Vec::new(),
            playlist_items: HashMap::new(),
            saved: Vec::new(),
            features: HashMap::new(),
            user: UserRef {
                id: "alice".to_string(),
                display_name: Some("Alice".to_string()),
            },
            failing_playlists: HashMap::new(),
            feature_responses: Mutex::new(VecDeque::new()),
            feature_batches: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_playlist(mut self, id: &str, name: &str, items: Vec<RawItem>) -> Self {
        self.playlists.push(PlaylistRef {
            id: id.to_string(),
            name: name.to_string(),
            total_tracks: items.len() as u32,
        });
        self.playlist_items.insert(id.to_string(), items);
        self
    }

    pub fn with_saved(mut self, items: Vec<RawItem>) -> Self {
        self.saved = items;
        self
    }

    pub fn with_features(mut self, id: &str, features: TrackFeatures) -> Self {
        self.features.insert(id.to_string(), features);
        self
    }

    pub fn with_feature_responses(self, responses: Vec<FeatureResponse>) -> Self {
        *self.feature_responses.lock().unwrap() = responses.into();
        self
    }

    pub fn failing_playlist(mut self, id: &str, status: u16) -> Self {
        self.failing_playlists.insert(id.to_string(), status);
        self
    }

    pub fn feature_batches(&self) -> Vec<Vec<String>> {
        self.feature_batches.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn page_of<T: Clone>(&self, all: &[T], cursor: Option<Cursor>, size: usize) -> Page<T> {
        let offset: usize = cursor.map(|c| c.as_str().parse().unwrap()).unwrap_or(0);
        let end = (offset + size).min(all.len());
        let next = (end < all.len()).then(|| Cursor::new(end.to_string()));
        Page {
            items: all[offset.min(end)..end].to_vec(),
            next,
            total: Some(all.len() as u32),
        }
    }
}

pub fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        retry_after: None,
        message: format!("HTTP status {}", status),
    }
}

#[async_trait]
impl LibraryApi for FakeLibrary {
    async fn playlists_page(&self, cursor: Option<Cursor>) -> Result<Page<PlaylistRef>, ApiError> {
        self.record("playlists".to_string());
        Ok(self.page_of(&self.playlists, cursor, self.page_size))
    }

    async fn playlist_items_page(
        &self,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<RawItem>, ApiError> {
        self.record(format!("playlist_items:{}", playlist_id));
        if let Some(status) = self.failing_playlists.get(playlist_id) {
            return Err(status_error(*status));
        }
        let items = self
            .playlist_items
            .get(playlist_id)
            .ok_or_else(|| status_error(404))?;
        Ok(self.page_of(items, cursor, self.page_size))
    }

    async fn saved_tracks_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<Page<RawItem>, ApiError> {
        self.record(format!("saved_tracks:{}", limit));
        Ok(self.page_of(&self.saved, cursor, (limit as usize).min(self.page_size)))
    }

    async fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<TrackFeatures>>, ApiError> {
        self.record("audio_features".to_string());
        self.feature_batches.lock().unwrap().push(ids.to_vec());
        if let Some(response) = self.feature_responses.lock().unwrap().pop_front() {
            return response;
        }
        Ok(ids.iter().map(|id| self.features.get(id).copied()).collect())
    }

    async fn current_user(&self) -> Result<UserRef, ApiError> {
        self.record("current_user".to_string());
        Ok(self.user.clone())
    }
}

/// A well-formed playlist entry for track `id`.
pub fn track_item(id: &str, name: &str, artists: &[&str]) -> RawItem {
    RawItem {
        track: Some(TrackPayload {
            id: Some(id.to_string()),
            is_local: false,
            kind: ItemKind::Track,
            name: Some(name.to_string()),
            artists: artists
                .iter()
                .map(|artist| ArtistRef {
                    name: Some(artist.to_string()),
                })
                .collect(),
            album: Some(AlbumRef {
                name: Some("Greatest Hits".to_string()),
                album_type: Some("compilation".to_string()),
                release_date: Some("2001-05-14".to_string()),
            }),
            duration_ms: Some(200_000),
            popularity: Some(64),
            explicit: Some(false),
            track_number: Some(3),
            disc_number: Some(1),
            spotify_url: Some(format!("https://open.spotify.com/track/{}", id)),
            preview_url: None,
        }),
        added_at: Some("2024-02-10T08:30:00Z".to_string()),
        added_by: Some("curator".to_string()),
    }
}

pub fn sample_features(energy: f32) -> TrackFeatures {
    TrackFeatures {
        danceability: 0.7,
        energy,
        key: 5,
        loudness: -6.5,
        mode: 1,
        speechiness: 0.04,
        acousticness: 0.12,
        instrumentalness: 0.0,
        liveness: 0.1,
        valence: 0.8,
        tempo: 120.0,
        time_signature: 4,
    }
}
