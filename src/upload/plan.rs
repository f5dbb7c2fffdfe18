use serde::Deserialize;
use std::{cmp::min, collections::BTreeMap, iter::Iterator, ops::Range};

/// Presigned URL the API assigned to a part number
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartUrl {
    pub part_number: u16,
    pub url: String,
}

impl PartUrl {
    #[must_use]
    pub fn new(part_number: u16, url: &str) -> Self {
        Self {
            part_number,
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("{total_size} bytes in chunks of {chunk_size} need {expected} parts, got {actual} part URLs")]
    PartCountMismatch {
        total_size: u64,
        chunk_size: u64,
        expected: u64,
        actual: usize,
    },

    #[error("{0} parts exceed the maximum part number 65535")]
    TooManyParts(u64),

    #[error("part numbers must be contiguous from 1, expected {expected} found {found}")]
    UnexpectedPartNumber { expected: u16, found: u16 },
}

/// Yields `(number, seek, chunk)` for every part of a file
pub struct PartIterator {
    seek: u64,
    chunk_size: u64,
    file_size: u64,
    number: u16,
}

impl PartIterator {
    #[must_use]
    pub const fn new(file_size: u64, chunk_size: u64) -> Self {
        Self {
            seek: 0,
            chunk_size,
            file_size,
            number: 1,
        }
    }
}

impl Iterator for PartIterator {
    type Item = (u16, u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.seek >= self.file_size || self.chunk_size == 0 {
            return None;
        }

        let chunk = min(self.chunk_size, self.file_size - self.seek);

        let result = Some((self.number, self.seek, chunk));

        self.seek += chunk;
        self.number = self.number.saturating_add(1);

        result
    }
}

/// One part of the upload, the byte range `[seek, seek + chunk)` goes to `url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSlot {
    number: u16,
    url: String,
    seek: u64,
    chunk: u64,
}

impl PartSlot {
    #[must_use]
    pub fn new(number: u16, url: &str, seek: u64, chunk: u64) -> Self {
        Self {
            number,
            url: url.to_string(),
            seek,
            chunk,
        }
    }

    #[must_use]
    pub const fn get_number(&self) -> u16 {
        self.number
    }

    #[must_use]
    pub fn get_url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn get_seek(&self) -> u64 {
        self.seek
    }

    #[must_use]
    pub const fn get_chunk(&self) -> u64 {
        self.chunk
    }

    #[must_use]
    pub const fn range(&self) -> Range<u64> {
        self.seek..self.seek + self.chunk
    }
}

/// Split `total_size` bytes into the parts the API handed out URLs for.
///
/// The URLs may come in any order, the slots are returned sorted by part
/// number and their ranges cover `[0, total_size)` without gaps or overlap.
///
/// # Errors
///
/// Will return `Err` if `chunk_size` is zero or the URLs don't match the
/// number of parts, one per part number from 1 to n.
pub fn plan_parts(
    total_size: u64,
    chunk_size: u64,
    part_urls: &[PartUrl],
) -> Result<Vec<PartSlot>, PlanError> {
    if chunk_size == 0 {
        return Err(PlanError::ZeroChunkSize);
    }

    let expected = total_size.div_ceil(chunk_size);

    if expected > u64::from(u16::MAX) {
        return Err(PlanError::TooManyParts(expected));
    }

    if expected != part_urls.len() as u64 {
        return Err(PlanError::PartCountMismatch {
            total_size,
            chunk_size,
            expected,
            actual: part_urls.len(),
        });
    }

    let mut urls: Vec<&PartUrl> = part_urls.iter().collect();
    urls.sort_by_key(|u| u.part_number);

    PartIterator::new(total_size, chunk_size)
        .zip(urls)
        .map(|((number, seek, chunk), url)| {
            if url.part_number == number {
                Ok(PartSlot::new(number, &url.url, seek, chunk))
            } else {
                Err(PlanError::UnexpectedPartNumber {
                    expected: number,
                    found: url.part_number,
                })
            }
        })
        .collect()
}

/// Everything needed to upload the parts of one file, built once per upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    total_size: u64,
    chunk_size: u64,
    parts: Vec<PartSlot>,
    completion_token: String,
    headers: BTreeMap<String, String>,
}

impl UploadDescriptor {
    /// # Errors
    ///
    /// Will return `Err` if the parts can not be planned, see [`plan_parts`]
    pub fn new(
        total_size: u64,
        chunk_size: u64,
        part_urls: &[PartUrl],
        completion_token: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, PlanError> {
        let parts = plan_parts(total_size, chunk_size, part_urls)?;

        log::debug!(
            "planned {} parts of {chunk_size} bytes for {total_size} bytes",
            parts.len()
        );

        Ok(Self {
            total_size,
            chunk_size,
            parts,
            completion_token: completion_token.to_string(),
            headers,
        })
    }

    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    #[must_use]
    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    #[must_use]
    pub fn parts(&self) -> &[PartSlot] {
        &self.parts
    }

    #[must_use]
    pub fn completion_token(&self) -> &str {
        &self.completion_token
    }

    /// Opaque headers sent with every part
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}
