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
use crate::models::TrackFeatures;
use crate::retry::RequestExecutor;
use log::{debug, warn};
use std::collections::HashMap;

/// Most ids the audio-features endpoint accepts per call.
pub const FEATURES_BATCH_SIZE: usize = 100;

/// A whole-batch 403 means "no feature data for these ids", not a failure.
pub const FEATURES_SWALLOWED_STATUSES: [u16; 1] = [403];

/// Fetches audio features for `ids` in contiguous batches of `batch_size`.
///
/// Every requested id ends up as a key. Ids without data, including every id
/// of a batch the service refused with 403, map to `None`. Only an error the
/// executor gives up on is returned.
pub async fn fetch_enrichment<A>(
    api: &A,
    executor: &RequestExecutor,
    ids: &[String],
    batch_size: usize,
) -> Result<HashMap<String, Option<TrackFeatures>>, ApiError>
where
    A: LibraryApi + ?Sized,
{
    let mut features_by_id = HashMap::with_capacity(ids.len());

    for (index, batch) in ids.chunks(batch_size.max(1)).enumerate() {
        let fetched = executor
            .execute_or_swallow(|| api.audio_features(batch), &FEATURES_SWALLOWED_STATUSES)
            .await?;

        match fetched {
            Some(list) => {
                debug!("Feature batch {} returned {} entries", index, list.len());
                let mut list = list.into_iter();
                for id in batch {
                    features_by_id.insert(id.clone(), list.next().flatten());
                }
            }
            None => {
                warn!(
                    "No audio features available for batch {} ({} tracks)",
                    index,
                    batch.len()
                );
                for id in batch {
                    features_by_id.insert(id.clone(), None);
                }
            }
        }
    }

    Ok(features_by_id)
}
