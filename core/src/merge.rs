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

use crate::models::MergeSummary;
use crate::record::{ARTIST_NAMES_FIELD, FIELDNAMES, TRACK_NAME_FIELD};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File the merged list is written to, inside the data directory.
pub const MERGED_FILE_NAME: &str = "total_list.csv";

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Data directory '{0}' not found")]
    MissingDirectory(PathBuf),
    #[error("No CSV files found in '{0}'")]
    NoSourceFiles(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// `(track_name, artist_names)`: what makes two rows the same track.
pub type DedupKey = (String, String);

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: DedupKey,
    /// Values aligned with [`MergedList::header`].
    pub values: Vec<String>,
}

impl MergedRow {
    pub fn track_name(&self) -> &str {
        &self.key.0
    }
}

/// Deduplicated rows, sorted by track name.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedList {
    pub header: Vec<String>,
    pub rows: Vec<MergedRow>,
}

impl MergedList {
    pub fn write(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(&row.values)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Export files in `dir` eligible for merging, in file-name order.
///
/// The merged output itself is never an input.
pub fn source_files(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    if !dir.is_dir() {
        return Err(MergeError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.ends_with(".csv") && name != MERGED_FILE_NAME {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(MergeError::NoSourceFiles(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Merges export files; the first row seen for a key wins.
///
/// The output header is the header of the first file read (or the default
/// export layout when no file could be read). Rows of later files are mapped
/// onto it by column name. Files that cannot be opened, or that lack the key
/// columns, are skipped.
pub fn merge_files(paths: &[PathBuf]) -> Result<MergedList, MergeError> {
    let mut header: Option<Vec<String>> = None;
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut rows: Vec<MergedRow> = Vec::new();

    for path in paths {
        let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Skipping '{}': {}", path.display(), e);
                continue;
            }
        };

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let position = |name: &str| columns.iter().position(|c| c == name);
        let (Some(name_col), Some(artist_col)) =
            (position(TRACK_NAME_FIELD), position(ARTIST_NAMES_FIELD))
        else {
            warn!(
                "Skipping '{}': missing '{}' or '{}' column",
                path.display(),
                TRACK_NAME_FIELD,
                ARTIST_NAMES_FIELD
            );
            continue;
        };

        let output = header.get_or_insert_with(|| columns.clone());
        let mapping: Vec<Option<usize>> = output.iter().map(|name| position(name)).collect();

        debug!("Processing {}", path.display());
        let before = rows.len();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or_default().to_string();
            let key = (field(name_col), field(artist_col));
            if !seen.insert(key.clone()) {
                continue;
            }
            let values = mapping
                .iter()
                .map(|col| col.map(|i| field(i)).unwrap_or_default())
                .collect();
            rows.push(MergedRow { key, values });
        }
        debug!("{} new tracks from {}", rows.len() - before, path.display());
    }

    // Stable: ties on the name keep first-seen order.
    rows.sort_by(|a, b| a.track_name().cmp(b.track_name()));

    Ok(MergedList {
        header: header.unwrap_or_else(|| FIELDNAMES.iter().map(|f| f.to_string()).collect()),
        rows,
    })
}

/// Merges every export in `dir` into `dir/total_list.csv`.
///
/// Sources that cannot be opened, or lack the key columns, are skipped. An
/// existing `total_list.csv` is replaced, with a header-only file when no
/// source had rows. Nothing is written when `dir` holds no source files or a
/// source fails mid-read.
pub fn merge_directory(dir: &Path) -> Result<MergeSummary, MergeError> {
    let files = source_files(dir)?;
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    info!("Found {} CSV files to merge: {}", files.len(), names.join(", "));

    let merged = merge_files(&files)?;
    let output = dir.join(MERGED_FILE_NAME);
    info!("Writing {} unique tracks to {}", merged.rows.len(), output.display());
    merged.write(&output)?;

    Ok(MergeSummary {
        source_files: names,
        unique_tracks: merged.rows.len(),
        output,
    })
}
