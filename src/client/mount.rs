//! Mount point candidates
//!
//! The resolver walks an ordered list of mount paths. A `404` from the
//! server moves it to the next candidate; running off the end is terminal.

use crate::error::RelayError;
use crate::protocol::constants::DEFAULT_MOUNTS;

/// Ordered, deduplicated list of mount points with a cursor
#[derive(Debug, Clone)]
pub struct MountResolver {
    mounts: Vec<String>,
    index: usize,
}

impl MountResolver {
    /// Build from candidates in trial order.
    ///
    /// Paths are normalized to start with `/` and duplicates keep their first
    /// position. An empty list falls back to [`DEFAULT_MOUNTS`].
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mounts: Vec<String> = Vec::new();
        for candidate in candidates {
            let Some(mount) = normalize(candidate.as_ref()) else {
                continue;
            };
            if !mounts.contains(&mount) {
                mounts.push(mount);
            }
        }

        if mounts.is_empty() {
            mounts = DEFAULT_MOUNTS.iter().map(|m| m.to_string()).collect();
        }

        Self { mounts, index: 0 }
    }

    /// Try `preferred` first, then the configured list
    pub fn with_preferred(preferred: Option<&str>, configured: &[String]) -> Self {
        let configured = configured.iter().map(String::as_str);
        Self::new(preferred.into_iter().chain(configured))
    }

    /// Mount currently being attempted
    pub fn current(&self) -> &str {
        &self.mounts[self.index]
    }

    /// Position of the current mount in the candidate list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Move to the next candidate.
    ///
    /// Past the last candidate this fails with `MountsExhausted` and the
    /// cursor stays where it was.
    pub fn advance(&mut self) -> Result<&str, RelayError> {
        if self.index + 1 >= self.mounts.len() {
            return Err(RelayError::MountsExhausted {
                tried: self.mounts.clone(),
            });
        }
        self.index += 1;
        Ok(self.current())
    }

    /// All candidates in trial order
    pub fn candidates(&self) -> &[String] {
        &self.mounts
    }

    /// Candidates attempted so far, including the current one
    pub fn tried(&self) -> &[String] {
        &self.mounts[..=self.index]
    }
}

fn normalize(mount: &str) -> Option<String> {
    let mount = mount.trim();
    if mount.is_empty() {
        None
    } else if mount.starts_with('/') {
        Some(mount.to_string())
    } else {
        Some(format!("/{}", mount))
    }
}

impl Default for MountResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNTS)
    }
}
