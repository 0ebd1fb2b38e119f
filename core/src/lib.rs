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

pub mod api;
pub mod auth;
pub mod config;
pub mod exporter;
pub mod features;
pub mod merge;
pub mod models;
pub mod paging;
pub mod record;
pub mod retry;

#[cfg(test)]
mod test_helpers;

// Re-export key items for convenience
pub use api::{ApiError, LibraryApi, SpotifyLibrary};
pub use auth::get_spotify_client;
pub use config::{resolve_credentials, AuthSettings, ClientCredentials, ExportSettings};
pub use exporter::{ExportError, ExportEvent, Exporter};
pub use merge::{merge_directory, MergeError};
pub use models::{CollectionListing, ExportOutcome, ExportSummary, IdentityCheck, MergeSummary};
