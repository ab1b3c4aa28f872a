// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Compound batch download with an on-disk gzip cache.
//!
//! The response body is parsed straight off the network while a
//! [`StreamTee`] copies every byte into a gzip file. The cache always ends
//! up holding the complete body, whether or not the parse succeeded.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use fingerid_types::{CompoundBatch, CompoundRecord, paths};
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::TryStreamExt;
use stream_tee::StreamTee;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, warn};

use crate::client::FingerIdClient;
use crate::error::ClientError;

impl FingerIdClient {
    /// Download the compounds for `formula` from the bio (`bio = true`) or
    /// full structure database, caching the raw body gzipped at `cache_file`.
    ///
    /// `cache_file` is created or truncated. On a parse error it still holds
    /// the complete, valid gzip of what the service sent.
    pub async fn compounds_for(
        &self,
        formula: &str,
        bio: bool,
        cache_file: &Path,
    ) -> Result<Vec<CompoundRecord>, ClientError> {
        let path = paths::compounds(formula, bio);
        let url = self.endpoint(&path)?;

        let client = self.transport().lease().await?;
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(formula, bio, status = %status, "Compound download failed");
            return Err(ClientError::Status {
                endpoint: "compounds",
                status: status.as_u16(),
            });
        }

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let reader = SyncIoBridge::new(StreamReader::new(body));
        let cache_path = cache_file.to_path_buf();
        let records =
            tokio::task::spawn_blocking(move || parse_and_cache(reader, &cache_path)).await??;
        drop(client);

        debug!(formula, bio, records = records.len(), "Compounds downloaded");
        Ok(records)
    }
}

/// Parse `source` as a compound batch while tee-ing it into a gzip file.
///
/// The tee is always closed and the gzip trailer written before the parse
/// result is looked at.
fn parse_and_cache<R: Read>(source: R, cache_path: &Path) -> Result<Vec<CompoundRecord>, ClientError> {
    let file = File::create(cache_path)?;
    let mut tee = StreamTee::new(source, GzEncoder::new(file, Compression::default()));

    let parsed = serde_json::from_reader::<_, CompoundBatch>(&mut tee);

    let file = tee.close()?.finish()?;
    file.sync_all()?;

    let batch = parsed.map_err(|e| ClientError::malformed("compounds", e))?;
    Ok(batch.into_records())
}
