use actix_multipart::{Field, Multipart};
use futures_util::StreamExt;

use crate::error::PredictError;

pub const FILE_FIELD: &str = "file";
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// The file part of a `/predict` form.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Streams the multipart body until the first part named `file` that carries a
/// filename, then validates the name and buffers it. Every part read counts
/// toward `limit`, not just the file.
pub async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, PredictError> {
    let mut consumed = 0usize;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| PredictError::UnreadableForm(e.to_string()))?;

        let disposition = field.content_disposition();
        let filename = match (disposition.get_name(), disposition.get_filename()) {
            (Some(FILE_FIELD), Some(name)) => Some(name.to_owned()),
            _ => None,
        };

        let filename = match filename {
            Some(filename) => filename,
            None => {
                drain_field(&mut field, &mut consumed, limit).await?;
                continue;
            }
        };

        if filename.is_empty() {
            return Err(PredictError::EmptyFilename);
        }
        if !allowed_file(&filename) {
            return Err(PredictError::UnsupportedType);
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| PredictError::UnreadableForm(e.to_string()))?;
            charge(&mut consumed, data.len(), limit)?;
            bytes.extend_from_slice(&data);
        }

        return Ok(Upload { filename, bytes });
    }

    Err(PredictError::MissingFile)
}

async fn drain_field(
    field: &mut Field,
    consumed: &mut usize,
    limit: usize,
) -> Result<(), PredictError> {
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| PredictError::UnreadableForm(e.to_string()))?;
        charge(consumed, data.len(), limit)?;
    }
    Ok(())
}

fn charge(consumed: &mut usize, len: usize, limit: usize) -> Result<(), PredictError> {
    *consumed += len;
    if *consumed > limit {
        return Err(PredictError::TooLarge { limit });
    }
    Ok(())
}
