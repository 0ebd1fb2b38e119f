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

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Display and file name used for the liked-songs special collection.
pub const LIKED_SONGS_NAME: &str = "Liked Songs";

/// Names that address the liked-songs collection instead of a playlist.
pub const LIKED_SONGS_ALIASES: [&str; 4] = ["liked songs", "liked", "saved songs", "saved"];

/// Opaque continuation token handed out by a paged listing.
///
/// Only the remote adapter that produced it knows what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
    /// Total size of the listing, when the service reports it.
    pub total: Option<u32>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemKind {
    #[default]
    Track,
    Episode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumRef {
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
}

/// The playable object inside a collection entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackPayload {
    pub id: Option<String>,
    pub is_local: bool,
    pub kind: ItemKind,
    pub name: Option<String>,
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    pub duration_ms: Option<u64>,
    pub popularity: Option<u32>,
    pub explicit: Option<bool>,
    pub track_number: Option<u32>,
    pub disc_number: Option<i32>,
    pub spotify_url: Option<String>,
    pub preview_url: Option<String>,
}

/// A collection entry as returned by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    /// `None` when the entry was removed or is unavailable.
    pub track: Option<TrackPayload>,
    pub added_at: Option<String>,
    /// Id of the user who added the entry (playlists only).
    pub added_by: Option<String>,
}

/// Audio features of a single track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackFeatures {
    pub danceability: f32,
    pub energy: f32,
    pub key: i32,
    pub loudness: f32,
    pub mode: i32,
    pub speechiness: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
    pub liveness: f32,
    pub valence: f32,
    pub tempo: f32,
    pub time_signature: i32,
}

/// Summary of a playlist for listing and lookup purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    pub total_tracks: u32,
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} tracks)", self.name, self.total_tracks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Playlist,
    LikedSongs,
}

/// A source of tracks: a playlist or the liked-songs special collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionRef {
    LikedSongs,
    Playlist(PlaylistRef),
}

impl CollectionRef {
    pub fn name(&self) -> &str {
        match self {
            CollectionRef::LikedSongs => LIKED_SONGS_NAME,
            CollectionRef::Playlist(playlist) => &playlist.name,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            CollectionRef::LikedSongs => CollectionKind::LikedSongs,
            CollectionRef::Playlist(_) => CollectionKind::Playlist,
        }
    }

    /// Returns the liked-songs collection when `name` is one of its aliases.
    pub fn liked_songs_alias(name: &str) -> Option<Self> {
        let lowered = name.trim().to_lowercase();
        LIKED_SONGS_ALIASES
            .contains(&lowered.as_str())
            .then_some(CollectionRef::LikedSongs)
    }
}

/// Everything the user can export, as shown by the `list` command.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CollectionListing {
    pub liked_songs_count: u32,
    pub playlists: Vec<PlaylistRef>,
}

/// Result of exporting one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Written { path: PathBuf, tracks: usize },
    /// Nothing exportable; no file was written.
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFailure {
    pub name: String,
    pub error: String,
}

/// Report for an "export everything" run.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExportSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub written: Vec<PathBuf>,
    pub failures: Vec<CollectionFailure>,
}

impl ExportSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_written(&mut self, path: PathBuf) {
        self.succeeded += 1;
        self.written.push(path);
    }

    pub fn add_failure(&mut self, name: &str, error: impl fmt::Display) {
        self.failures.push(CollectionFailure {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    /// Something failed and nothing was written.
    pub fn nothing_exported(&self) -> bool {
        self.succeeded == 0 && !self.failures.is_empty()
    }
}

/// Report for a merge run.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MergeSummary {
    pub source_files: Vec<String>,
    pub unique_tracks: usize,
    pub output: PathBuf,
}

/// The account a client is authenticated as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub display_name: Option<String>,
}

/// Outcome of comparing the authenticated account with the requested label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityCheck {
    pub label: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub matches: bool,
}
