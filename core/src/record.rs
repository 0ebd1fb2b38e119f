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

use crate::models::{CollectionKind, ItemKind, RawItem, TrackFeatures, TrackPayload};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

pub const FIELD_COUNT: usize = 28;
pub const FEATURE_FIELD_COUNT: usize = 12;

/// Column layout of every export file and of the merged list.
pub const FIELDNAMES: [&str; FIELD_COUNT] = [
    "track_name",
    "artist_names",
    "album_name",
    "album_type",
    "release_date",
    "duration_ms",
    "duration_min_sec",
    "popularity",
    "explicit",
    "track_number",
    "disc_number",
    "spotify_id",
    "spotify_url",
    "preview_url",
    "added_at",
    "added_by",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "time_signature",
];

pub const TRACK_NAME_FIELD: &str = "track_name";
pub const ARTIST_NAMES_FIELD: &str = "artist_names";

/// The audio-feature columns, always present, empty when unavailable.
pub fn feature_fields() -> &'static [&'static str] {
    &FIELDNAMES[FIELD_COUNT - FEATURE_FIELD_COUNT..]
}

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub track_name: String,
    pub artist_names: String,
    pub album_name: String,
    pub album_type: String,
    pub release_date: String,
    pub duration_ms: u64,
    pub popularity: Option<u32>,
    pub explicit: Option<bool>,
    pub track_number: Option<u32>,
    pub disc_number: Option<i32>,
    pub spotify_id: String,
    pub spotify_url: String,
    pub preview_url: String,
    pub added_at: String,
    pub added_by: String,
    pub features: Option<TrackFeatures>,
}

impl ExportRecord {
    pub fn duration_min_sec(&self) -> String {
        format_duration(self.duration_ms)
    }

    /// Values in [`FIELDNAMES`] order.
    pub fn to_row(&self) -> [String; FIELD_COUNT] {
        let [
            danceability,
            energy,
            key,
            loudness,
            mode,
            speechiness,
            acousticness,
            instrumentalness,
            liveness,
            valence,
            tempo,
            time_signature,
        ] = feature_values(self.features.as_ref());

        [
            self.track_name.clone(),
            self.artist_names.clone(),
            self.album_name.clone(),
            self.album_type.clone(),
            self.release_date.clone(),
            self.duration_ms.to_string(),
            self.duration_min_sec(),
            optional(self.popularity),
            optional(self.explicit),
            optional(self.track_number),
            optional(self.disc_number),
            self.spotify_id.clone(),
            self.spotify_url.clone(),
            self.preview_url.clone(),
            self.added_at.clone(),
            self.added_by.clone(),
            danceability,
            energy,
            key,
            loudness,
            mode,
            speechiness,
            acousticness,
            instrumentalness,
            liveness,
            valence,
            tempo,
            time_signature,
        ]
    }

    /// `(column, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, String)> {
        FIELDNAMES.into_iter().zip(self.to_row())
    }
}

fn optional<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn feature_values(features: Option<&TrackFeatures>) -> [String; FEATURE_FIELD_COUNT] {
    match features {
        Some(f) => [
            f.danceability.to_string(),
            f.energy.to_string(),
            f.key.to_string(),
            f.loudness.to_string(),
            f.mode.to_string(),
            f.speechiness.to_string(),
            f.acousticness.to_string(),
            f.instrumentalness.to_string(),
            f.liveness.to_string(),
            f.valence.to_string(),
            f.tempo.to_string(),
            f.time_signature.to_string(),
        ],
        None => Default::default(),
    }
}

/// `m:ss` with floor division, e.g. 200000 -> "3:20".
pub fn format_duration(duration_ms: u64) -> String {
    format!("{}:{:02}", duration_ms / 60_000, (duration_ms % 60_000) / 1_000)
}

/// Returns the track of an entry that belongs in an export.
///
/// Removed entries, local files and entries without an id are dropped.
/// Playlists can also hold episodes, so they must be tracks; saved-track
/// entries always are.
pub fn exportable_track(item: &RawItem, kind: CollectionKind) -> Option<&TrackPayload> {
    let track = item.track.as_ref()?;
    if track.is_local {
        return None;
    }
    if kind == CollectionKind::Playlist && track.kind != ItemKind::Track {
        return None;
    }
    if track.id.as_deref().map_or(true, str::is_empty) {
        return None;
    }
    Some(track)
}

/// Ids of the exportable tracks, in listing order.
pub fn exportable_ids(items: &[RawItem], kind: CollectionKind) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| exportable_track(item, kind))
        .filter_map(|track| track.id.clone())
        .collect()
}

/// Flattens one entry into an output row.
///
/// Liked-songs entries carry no adder, so `acting_user` is used instead.
pub fn project(
    item: &RawItem,
    track: &TrackPayload,
    features: Option<&TrackFeatures>,
    kind: CollectionKind,
    acting_user: &str,
) -> ExportRecord {
    let album = track.album.clone().unwrap_or_default();
    let added_by = match kind {
        CollectionKind::LikedSongs => acting_user.to_string(),
        CollectionKind::Playlist => item.added_by.clone().unwrap_or_default(),
    };

    ExportRecord {
        track_name: track.name.clone().unwrap_or_default(),
        artist_names: track
            .artists
            .iter()
            .filter_map(|artist| artist.name.as_deref())
            .filter(|name| !name.is_empty())
            .collect::<Vec<&str>>()
            .join(", "),
        album_name: album.name.unwrap_or_default(),
        album_type: album.album_type.unwrap_or_default(),
        release_date: album.release_date.unwrap_or_default(),
        duration_ms: track.duration_ms.unwrap_or(0),
        popularity: track.popularity,
        explicit: track.explicit,
        track_number: track.track_number,
        disc_number: track.disc_number,
        spotify_id: track.id.clone().unwrap_or_default(),
        spotify_url: track.spotify_url.clone().unwrap_or_default(),
        preview_url: track.preview_url.clone().unwrap_or_default(),
        added_at: item.added_at.clone().unwrap_or_default(),
        added_by,
        features: features.copied(),
    }
}

/// Filters `items` and projects the survivors, keeping listing order.
pub fn project_items(
    items: &[RawItem],
    features: &HashMap<String, Option<TrackFeatures>>,
    kind: CollectionKind,
    acting_user: &str,
) -> Vec<ExportRecord> {
    items
        .iter()
        .filter_map(|item| {
            let track = exportable_track(item, kind)?;
            let enrichment = track
                .id
                .as_ref()
                .and_then(|id| features.get(id))
                .and_then(Option::as_ref);
            Some(project(item, track, enrichment, kind, acting_user))
        })
        .collect()
}

/// Keeps alphanumerics, spaces, `-` and `_`, then makes sure of a `.csv` suffix.
pub fn safe_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let kept = kept.trim_end();
    if kept.ends_with(".csv") {
        kept.to_string()
    } else {
        format!("{}.csv", kept)
    }
}

/// Namespaces a file name per identity as `<label>__<file>`.
pub fn prefixed_filename(prefix: Option<&str>, file_name: &str) -> String {
    match prefix {
        Some(label) => format!("{}__{}", label, file_name),
        None => file_name.to_string(),
    }
}

/// Writes a header row and one row per record, creating parent directories.
pub fn write_records(path: &Path, records: &[ExportRecord]) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(FIELDNAMES)?;
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtistRef;
    use crate::test_helpers::{sample_features, track_item};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(200_000), "3:20");
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(3_661_000), "61:01");
        assert_eq!(format_duration(59_999), "0:59");
        assert_eq!(format_duration(60_000), "1:00");
    }

    #[test]
    fn test_format_duration_matches_formula() {
        for d_ms in (0..7_300_000u64).step_by(997) {
            let expected = format!("{}:{:02}", d_ms / 60000, (d_ms % 60000) / 1000);
            assert_eq!(format_duration(d_ms), expected);
        }
    }

    #[test]
    fn test_feature_fields_are_the_last_twelve() {
        assert_eq!(feature_fields().len(), 12);
        assert_eq!(feature_fields()[0], "danceability");
        assert_eq!(feature_fields()[11], "time_signature");
    }

    #[test]
    fn test_artist_names_skip_missing_entries() {
        let mut item = track_item("t1", "Song", &["A"]);
        let track = item.track.as_mut().unwrap();
        track.artists = vec![
            ArtistRef { name: Some("First".to_string()) },
            ArtistRef { name: None },
            ArtistRef { name: Some(String::new()) },
            ArtistRef { name: Some("Second".to_string()) },
        ];
        let track = item.track.clone().unwrap();

        let record = project(&item, &track, None, CollectionKind::Playlist, "me");

        assert_eq!(record.artist_names, "First, Second");
    }

    #[test]
    fn test_filter_drops_local_episode_missing_id_and_removed() {
        let good = track_item("good", "Keep", &["A"]);

        let mut local = track_item("local", "Local", &["A"]);
        local.track.as_mut().unwrap().is_local = true;

        let mut episode = track_item("ep", "Podcast", &["A"]);
        episode.track.as_mut().unwrap().kind = ItemKind::Episode;

        let mut no_id = track_item("x", "No id", &["A"]);
        no_id.track.as_mut().unwrap().id = None;

        let removed = RawItem {
            track: None,
            ..track_item("gone", "Gone", &["A"])
        };

        let items = vec![good, local, episode, no_id, removed];
        let mut features = HashMap::new();
        for id in ["good", "local", "ep", "x"] {
            features.insert(id.to_string(), Some(sample_features(0.5)));
        }

        let records = project_items(&items, &features, CollectionKind::Playlist, "me");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spotify_id, "good");
        assert_eq!(exportable_ids(&items, CollectionKind::Playlist), vec!["good"]);

        let records = project_items(&items, &HashMap::new(), CollectionKind::Playlist, "me");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_liked_songs_skip_the_type_check() {
        let mut odd = track_item("odd", "Odd", &["A"]);
        odd.track.as_mut().unwrap().kind = ItemKind::Episode;
        let mut local = track_item("local", "Local", &["A"]);
        local.track.as_mut().unwrap().is_local = true;

        let ids = exportable_ids(&[odd, local], CollectionKind::LikedSongs);

        assert_eq!(ids, vec!["odd"]);
    }

    #[test]
    fn test_added_by_for_liked_songs_is_the_acting_user() {
        let item = track_item("t1", "Song", &["A"]);
        let track = item.track.clone().unwrap();

        let liked = project(&item, &track, None, CollectionKind::LikedSongs, "alice");
        let playlist = project(&item, &track, None, CollectionKind::Playlist, "alice");

        assert_eq!(liked.added_by, "alice");
        assert_eq!(playlist.added_by, "curator");
    }

    #[test]
    fn test_projection_renders_every_column() {
        let item = track_item("4uLU6hMCjMI75M1A2tKUQC", "Never Gonna", &["Rick Astley"]);
        let track = item.track.clone().unwrap();
        let features = sample_features(0.9);

        let record = project(&item, &track, Some(&features), CollectionKind::Playlist, "me");
        let row: HashMap<&str, String> = record.fields().collect();

        assert_eq!(row["track_name"], "Never Gonna");
        assert_eq!(row["artist_names"], "Rick Astley");
        assert_eq!(row["album_name"], "Greatest Hits");
        assert_eq!(row["album_type"], "compilation");
        assert_eq!(row["release_date"], "2001-05-14");
        assert_eq!(row["duration_ms"], "200000");
        assert_eq!(row["duration_min_sec"], "3:20");
        assert_eq!(row["popularity"], "64");
        assert_eq!(row["explicit"], "false");
        assert_eq!(row["track_number"], "3");
        assert_eq!(row["disc_number"], "1");
        assert_eq!(row["spotify_id"], "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(
            row["spotify_url"],
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"
        );
        assert_eq!(row["preview_url"], "");
        assert_eq!(row["added_at"], "2024-02-10T08:30:00Z");
        assert_eq!(row["energy"], "0.9");
        assert_eq!(row["key"], "5");
        assert_eq!(row["loudness"], "-6.5");
        assert_eq!(row["tempo"], "120");
        assert_eq!(row["time_signature"], "4");
    }

    #[test]
    fn test_feature_columns_present_with_and_without_enrichment() {
        let item = track_item("t1", "Song", &["A"]);
        let track = item.track.clone().unwrap();
        let features = sample_features(0.4);

        let enriched = project(&item, &track, Some(&features), CollectionKind::Playlist, "me");
        let bare = project(&item, &track, None, CollectionKind::Playlist, "me");

        let enriched: Vec<(&str, String)> = enriched.fields().collect();
        let bare: Vec<(&str, String)> = bare.fields().collect();

        let enriched_keys: Vec<&str> = enriched.iter().map(|(k, _)| *k).collect();
        let bare_keys: Vec<&str> = bare.iter().map(|(k, _)| *k).collect();
        assert_eq!(enriched_keys, FIELDNAMES.to_vec());
        assert_eq!(bare_keys, FIELDNAMES.to_vec());

        for field in feature_fields() {
            let value = &bare.iter().find(|(k, _)| k == field).unwrap().1;
            assert_eq!(value, "", "{field} should be empty without features");
            let value = &enriched.iter().find(|(k, _)| k == field).unwrap().1;
            assert!(!value.is_empty(), "{field} should be filled with features");
        }
    }

    #[test]
    fn test_missing_optional_values_render_empty() {
        let item = RawItem {
            track: Some(TrackPayload {
                id: Some("bare".to_string()),
                ..Default::default()
            }),
            added_at: None,
            added_by: None,
        };
        let track = item.track.clone().unwrap();

        let record = project(&item, &track, None, CollectionKind::Playlist, "me");
        let row = record.to_row();

        assert_eq!(row[0], "");
        assert_eq!(row[5], "0");
        assert_eq!(row[6], "0:00");
        assert_eq!(row[7], "");
        assert_eq!(row[8], "");
        assert_eq!(row[11], "bare");
        assert_eq!(row[15], "");
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("Road Trip"), "Road Trip.csv");
        assert_eq!(safe_filename("Rock/Metal: 90's!"), "RockMetal 90s.csv");
        assert_eq!(safe_filename("chill-out_mix  "), "chill-out_mix.csv");
        assert_eq!(safe_filename("Café del Mar"), "Café del Mar.csv");
        assert_eq!(safe_filename("list.csv"), "listcsv.csv");
    }

    #[test]
    fn test_prefixed_filename() {
        assert_eq!(prefixed_filename(None, "Road Trip.csv"), "Road Trip.csv");
        assert_eq!(
            prefixed_filename(Some("bob"), "Road Trip.csv"),
            "bob__Road Trip.csv"
        );
    }

    #[test]
    fn test_write_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("Mix.csv");
        let item = track_item("t1", "Song, with comma", &["A", "B"]);
        let track = item.track.clone().unwrap();
        let records = vec![project(&item, &track, None, CollectionKind::Playlist, "me")];

        write_records(&path, &records).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, FIELDNAMES.to_vec());
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "Song, with comma");
        assert_eq!(&rows[0][1], "A, B");
        assert_eq!(rows[0].len(), FIELD_COUNT);
    }
}
