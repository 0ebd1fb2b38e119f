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

use crate::api::{ApiError, LibraryApi};
use crate::config::ExportSettings;
use crate::features::fetch_enrichment;
use crate::models::{
    CollectionListing, CollectionRef, ExportOutcome, ExportSummary, IdentityCheck, PlaylistRef,
    RawItem, LIKED_SONGS_NAME,
};
use crate::paging::collect_all;
use crate::record::{
    exportable_ids, prefixed_filename, project_items, safe_filename, write_records, ExportRecord,
};
use crate::retry::RequestExecutor;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SAVED_TRACKS_PAGE_SIZE: u32 = 50;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Spotify API error: {0}")]
    Api(#[from] ApiError),
    #[error("Playlist '{name}' not found")]
    CollectionNotFound { name: String, available: Vec<String> },
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Progress of an "export everything" run, for whoever is watching.
#[derive(Debug)]
pub enum ExportEvent<'a> {
    Started {
        index: usize,
        total: usize,
        name: &'a str,
    },
    Written {
        name: &'a str,
        path: &'a Path,
        tracks: usize,
    },
    Empty {
        name: &'a str,
    },
    Failed {
        name: &'a str,
        error: &'a ExportError,
    },
}

pub struct Exporter<A> {
    api: A,
    executor: RequestExecutor,
    settings: ExportSettings,
}

impl<A: LibraryApi> Exporter<A> {
    pub fn new(api: A, settings: ExportSettings) -> Self {
        Self {
            api,
            executor: settings.executor(),
            settings,
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub async fn get_user_playlists(&self) -> Result<Vec<PlaylistRef>, ExportError> {
        let playlists = collect_all(&self.executor, |cursor| self.api.playlists_page(cursor)).await?;
        Ok(playlists)
    }

    pub async fn liked_songs_count(&self) -> Result<u32, ExportError> {
        let page = self
            .executor
            .execute(|| self.api.saved_tracks_page(None, 1))
            .await?;
        Ok(page.total.unwrap_or(page.items.len() as u32))
    }

    pub async fn list_collections(&self) -> Result<CollectionListing, ExportError> {
        let playlists = self.get_user_playlists().await?;
        let liked_songs_count = self.liked_songs_count().await?;
        Ok(CollectionListing {
            liked_songs_count,
            playlists,
        })
    }

    /// Looks a collection up by name, case-insensitively.
    ///
    /// Liked-songs aliases are recognised without asking the service.
    pub async fn find_collection(&self, name: &str) -> Result<Option<CollectionRef>, ExportError> {
        if let Some(liked) = CollectionRef::liked_songs_alias(name) {
            return Ok(Some(liked));
        }

        let wanted = name.to_lowercase();
        Ok(self
            .get_user_playlists()
            .await?
            .into_iter()
            .find(|playlist| playlist.name.to_lowercase() == wanted)
            .map(CollectionRef::Playlist))
    }

    async fn fetch_raw_items(&self, collection: &CollectionRef) -> Result<Vec<RawItem>, ApiError> {
        match collection {
            CollectionRef::LikedSongs => {
                collect_all(&self.executor, |cursor| {
                    self.api.saved_tracks_page(cursor, SAVED_TRACKS_PAGE_SIZE)
                })
                .await
            }
            CollectionRef::Playlist(playlist) => {
                collect_all(&self.executor, |cursor| {
                    self.api.playlist_items_page(&playlist.id, cursor)
                })
                .await
            }
        }
    }

    /// Every exportable track of `collection` as an output row.
    pub async fn fetch_records(
        &self,
        collection: &CollectionRef,
    ) -> Result<Vec<ExportRecord>, ExportError> {
        let kind = collection.kind();
        let items = self.fetch_raw_items(collection).await?;
        debug!("'{}': {} entries", collection.name(), items.len());

        let ids = exportable_ids(&items, kind);
        let features = if self.settings.fetch_features && !ids.is_empty() {
            info!("Fetching audio features for {} tracks", ids.len());
            fetch_enrichment(&self.api, &self.executor, &ids, self.settings.batch_size).await?
        } else {
            HashMap::new()
        };

        Ok(project_items(
            &items,
            &features,
            kind,
            &self.settings.acting_user,
        ))
    }

    /// Where `collection` is written: `outfile` or its sanitized name, prefixed
    /// per identity, inside the output directory.
    pub fn output_path(&self, collection: &CollectionRef, outfile: Option<&str>) -> PathBuf {
        let file_name = outfile
            .map(str::to_string)
            .unwrap_or_else(|| safe_filename(collection.name()));
        self.settings
            .output_dir
            .join(prefixed_filename(self.settings.file_prefix.as_deref(), &file_name))
    }

    async fn export_resolved(
        &self,
        collection: &CollectionRef,
        outfile: Option<&str>,
    ) -> Result<ExportOutcome, ExportError> {
        let records = self.fetch_records(collection).await?;
        if records.is_empty() {
            info!("No exportable tracks in '{}'", collection.name());
            return Ok(ExportOutcome::Empty);
        }

        let path = self.output_path(collection, outfile);
        info!("Writing {} tracks to {}", records.len(), path.display());
        write_records(&path, &records)?;

        Ok(ExportOutcome::Written {
            path,
            tracks: records.len(),
        })
    }

    /// Exports one playlist, or Liked Songs, by name.
    pub async fn export_collection(
        &self,
        name: &str,
        outfile: Option<&str>,
    ) -> Result<ExportOutcome, ExportError> {
        let Some(collection) = self.find_collection(name).await? else {
            let mut available = vec![LIKED_SONGS_NAME.to_string()];
            available.extend(
                self.get_user_playlists()
                    .await?
                    .into_iter()
                    .map(|playlist| playlist.name),
            );
            return Err(ExportError::CollectionNotFound {
                name: name.to_string(),
                available,
            });
        };

        self.export_resolved(&collection, outfile).await
    }

    /// Exports Liked Songs (optionally) and then every playlist.
    ///
    /// A collection that fails is recorded and skipped; only failing to list
    /// the playlists aborts the run.
    pub async fn export_all<F>(
        &self,
        include_liked: bool,
        mut on_event: F,
    ) -> Result<ExportSummary, ExportError>
    where
        F: FnMut(ExportEvent<'_>),
    {
        let playlists = self.get_user_playlists().await?;

        let mut collections = Vec::with_capacity(playlists.len() + 1);
        if include_liked {
            collections.push(CollectionRef::LikedSongs);
        }
        collections.extend(playlists.into_iter().map(CollectionRef::Playlist));

        let mut summary = ExportSummary::new();
        summary.attempted = collections.len();

        for (i, collection) in collections.iter().enumerate() {
            let name = collection.name();
            on_event(ExportEvent::Started {
                index: i + 1,
                total: collections.len(),
                name,
            });

            match self.export_resolved(collection, None).await {
                Ok(ExportOutcome::Written { path, tracks }) => {
                    on_event(ExportEvent::Written {
                        name,
                        path: &path,
                        tracks,
                    });
                    summary.add_written(path);
                }
                Ok(ExportOutcome::Empty) => on_event(ExportEvent::Empty { name }),
                Err(e) => {
                    error!("Failed to export '{}': {}", name, e);
                    on_event(ExportEvent::Failed { name, error: &e });
                    summary.add_failure(name, &e);
                }
            }
        }

        info!(
            "Exported {}/{} collections",
            summary.succeeded, summary.attempted
        );
        Ok(summary)
    }

    /// Compares the authenticated account with the label it was requested as.
    ///
    /// A mismatch is only reported, never fatal.
    pub async fn check_identity(&self, label: &str) -> Result<IdentityCheck, ExportError> {
        let user = self.executor.execute(|| self.api.current_user()).await?;

        let wanted = label.to_lowercase();
        let matches = user.id.to_lowercase() == wanted
            || user
                .display_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase() == wanted);
        if !matches {
            warn!(
                "Requested identity '{}' but authenticated as '{}'",
                label, user.id
            );
        }

        Ok(IdentityCheck {
            label: label.to_string(),
            user_id: user.id,
            display_name: user.display_name,
            matches,
        })
    }
}
