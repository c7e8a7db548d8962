/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Configuration folder upload.
//!
//! A folder is uploaded file by file through the client-streaming
//! `SystemService.UploadFile` call.  Each stream starts with a
//! [`FileDescription`] (destination path + SHA-256 of the content) followed
//! by the content in chunks of at most [`UPLOAD_CHUNK_SIZE`] bytes.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use crate::proto::broker_v1::file_upload_request::Data;
use crate::proto::broker_v1::{FileDescription, FileUploadRequest};

pub const UPLOAD_CHUNK_SIZE: usize = 1_000_000;

/// Every regular file below `folder`, recursively, in path order.
///
/// # Errors
/// Fails if `folder` cannot be read or contains no files.
pub fn collect_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut dirs = vec![folder.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Cannot read configuration folder: {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("Cannot read configuration folder: {}", dir.display()))?
                .path();
            if path.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        bail!("Configuration folder {} is empty", folder.display());
    }
    files.sort();
    Ok(files)
}

/// Broker-side path of `file`: relative to `folder`, `/`-separated, with a
/// leading `/`.
pub fn destination_path(folder: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(folder).with_context(|| {
        format!("{} is not inside {}", file.display(), folder.display())
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("/{}", parts.join("/")))
}

/// Lower-case hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// The full request stream for one file.
pub fn upload_requests(destination: &str, content: &[u8]) -> Vec<FileUploadRequest> {
    let description = FileUploadRequest {
        data: Some(Data::FileDescription(FileDescription {
            sha256: sha256_hex(content),
            path: destination.to_string(),
        })),
    };

    std::iter::once(description)
        .chain(content.chunks(UPLOAD_CHUNK_SIZE).map(|chunk| FileUploadRequest {
            data: Some(Data::Chunk(chunk.to_vec())),
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn files_are_collected_recursively_in_order() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("can")).unwrap();
        fs::write(dir.path().join("interfaces.json"), "{}").unwrap();
        fs::write(dir.path().join("can").join("body.dbc"), "VERSION \"\"").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let destinations: Vec<String> = files
            .iter()
            .map(|f| destination_path(dir.path(), f).unwrap())
            .collect();
        assert_eq!(destinations, vec!["/can/body.dbc", "/interfaces.json"]);
    }

    #[test]
    fn empty_or_missing_folder_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(collect_files(dir.path()).is_err());
        assert!(collect_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn file_outside_folder_has_no_destination() {
        assert!(destination_path(Path::new("/a/config"), Path::new("/b/x.json")).is_err());
    }

    #[test]
    fn sha256_is_lower_case_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn description_comes_first_then_chunks() {
        let content = vec![7u8; 2 * UPLOAD_CHUNK_SIZE + 10];
        let requests = upload_requests("/big.bin", &content);
        assert_eq!(requests.len(), 4);

        match &requests[0].data {
            Some(Data::FileDescription(d)) => {
                assert_eq!(d.path, "/big.bin");
                assert_eq!(d.sha256, sha256_hex(&content));
            }
            other => panic!("expected file description, got {other:?}"),
        }

        let mut joined = Vec::new();
        for r in &requests[1..] {
            match &r.data {
                Some(Data::Chunk(c)) => {
                    assert!(c.len() <= UPLOAD_CHUNK_SIZE);
                    joined.extend_from_slice(c);
                }
                other => panic!("expected chunk, got {other:?}"),
            }
        }
        assert_eq!(joined, content);
    }

    #[test]
    fn empty_file_is_only_a_description() {
        let requests = upload_requests("/empty", b"");
        assert_eq!(requests.len(), 1);
    }
}
