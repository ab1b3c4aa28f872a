// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prediction payload codec.
//!
//! A finished job returns its fingerprint as base64 over a packed sequence
//! of little-endian `f64`s. The number of values is implied by the length.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

const VALUE_WIDTH: usize = std::mem::size_of::<f64>();

#[derive(Debug, Error)]
pub enum PredictionDecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("{len} decoded bytes leave {trailing} bytes after the last whole value")]
    TrailingBytes { len: usize, trailing: usize },
}

/// Decode a base64 prediction blob into probabilities, in wire order.
///
/// Embedded whitespace (line-wrapped base64) is ignored.
pub fn decode_prediction(encoded: &str) -> Result<Vec<f64>, PredictionDecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;

    let chunks = bytes.chunks_exact(VALUE_WIDTH);
    if !chunks.remainder().is_empty() {
        return Err(PredictionDecodeError::TrailingBytes {
            len: bytes.len(),
            trailing: chunks.remainder().len(),
        });
    }

    Ok(chunks
        .map(|chunk| {
            let mut raw = [0u8; VALUE_WIDTH];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Inverse of [`decode_prediction`]
pub fn encode_prediction(values: &[f64]) -> String {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}
