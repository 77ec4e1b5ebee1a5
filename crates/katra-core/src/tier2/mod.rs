//! Tier-2 digest store
//!
//! Append-only newline-delimited digest files bucketed by period type
//! (`weekly/<period_id>.jsonl`, `monthly/<period_id>.jsonl`) with a
//! secondary SQLite index for fast query. The index is an accelerator,
//! not the source of truth: when it is unavailable the store degrades to
//! scanning the bucket directories.

mod index;

pub use index::{DigestFilter, DigestIndex, DigestLocation};

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KatraError, Result};
use crate::record::{Digest, PeriodType};

/// Index database location under the tier-2 root
pub const INDEX_DB: &str = "index/digests.db";

// ============================================================================
// DIGEST STORE
// ============================================================================

/// Bucketed digest store with a secondary index
pub struct DigestStore {
    root: PathBuf,
    index: Option<DigestIndex>,
    max_file_bytes: u64,
}

impl DigestStore {
    /// Open under `root` (e.g. `<home>/memory/tier2`).
    ///
    /// An index that fails to open is logged and left off; every query then
    /// takes the directory-scan path.
    pub fn open(root: &Path, max_file_size_mb: u64) -> Result<Self> {
        std::fs::create_dir_all(root.join(PeriodType::Weekly.dir_name()))?;
        std::fs::create_dir_all(root.join(PeriodType::Monthly.dir_name()))?;

        let index = match DigestIndex::open(&root.join(INDEX_DB)) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("Tier-2 index unavailable, falling back to scans: {}", e);
                None
            }
        };

        Ok(Self {
            root: root.to_path_buf(),
            index,
            max_file_bytes: max_file_size_mb * 1024 * 1024,
        })
    }

    fn bucket_path(&self, period_type: PeriodType, period_id: &str) -> PathBuf {
        self.root
            .join(period_type.dir_name())
            .join(format!("{period_id}.jsonl"))
    }

    /// Whether the secondary index is live
    pub fn index_available(&self) -> bool {
        self.index.is_some()
    }

    // ========================================================================
    // WRITE
    // ========================================================================

    /// Append a digest to its bucket and register it in the index.
    ///
    /// Refuses with `BucketFull` when the bucket file is already at or over
    /// the size cap; a file one byte under still accepts the append.
    pub fn store_digest(&self, digest: &Digest) -> Result<()> {
        if digest.ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }
        let path = self.bucket_path(digest.period_type, &digest.period_id);

        let offset = match std::fs::metadata(&path) {
            Ok(meta) => {
                if meta.len() >= self.max_file_bytes {
                    return Err(KatraError::BucketFull {
                        path: path.to_string_lossy().into_owned(),
                    });
                }
                meta.len()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let line = digest.to_wire_line()?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        if let Some(index) = &self.index {
            index.insert(digest, &path, offset)?;
        }
        Ok(())
    }

    /// Flip the archived flag. The bucket line keeps its written state; the
    /// index carries the overlay.
    pub fn set_archived(&self, digest_id: &str, archived: bool) -> Result<()> {
        let index = self
            .index
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("tier2 index"))?;
        if !index.set_archived(digest_id, archived)? {
            return Err(KatraError::NotFound(format!("digest {digest_id}")));
        }
        Ok(())
    }

    // ========================================================================
    // READ
    // ========================================================================

    fn read_at(&self, location: &DigestLocation) -> Result<Digest> {
        let mut file = File::open(&location.file_path)?;
        file.seek(SeekFrom::Start(location.byte_offset))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let mut digest = Digest::from_wire_line(line.trim_end())?;
        digest.archived = location.archived;
        Ok(digest)
    }

    /// Query digests. Uses the index when available, otherwise scans both
    /// bucket directories and filters in memory.
    pub fn query(&self, filter: &DigestFilter) -> Result<Vec<Digest>> {
        if let Some(index) = &self.index {
            let mut digests = Vec::new();
            for location in index.query(filter)? {
                match self.read_at(&location) {
                    Ok(digest) => digests.push(digest),
                    Err(e) => {
                        tracing::warn!(
                            "Indexed digest {} unreadable at offset {}: {}",
                            location.digest_id,
                            location.byte_offset,
                            e
                        );
                    }
                }
            }
            return Ok(digests);
        }
        self.scan(filter)
    }

    /// Fetch one digest by id
    pub fn get_by_id(&self, digest_id: &str) -> Result<Option<Digest>> {
        if let Some(index) = &self.index {
            return match index.get(digest_id)? {
                Some(location) => Ok(Some(self.read_at(&location)?)),
                None => Ok(None),
            };
        }
        for digest in self.scan_all()? {
            if digest.digest_id == digest_id {
                return Ok(Some(digest));
            }
        }
        Ok(None)
    }

    fn scan_all(&self) -> Result<Vec<Digest>> {
        let mut digests = Vec::new();
        for period_type in [PeriodType::Weekly, PeriodType::Monthly] {
            let dir = self.root.join(period_type.dir_name());
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.extension().is_none_or(|ext| ext != "jsonl") {
                    continue;
                }
                let reader = BufReader::new(File::open(&path)?);
                for (line_no, line) in reader.lines().enumerate() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Digest::from_wire_line(&line) {
                        Ok(digest) => digests.push(digest),
                        Err(e) => tracing::warn!(
                            "Skipping corrupt digest line {} in {}: {}",
                            line_no + 1,
                            path.display(),
                            e
                        ),
                    }
                }
            }
        }
        Ok(digests)
    }

    fn scan(&self, filter: &DigestFilter) -> Result<Vec<Digest>> {
        if filter.ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }
        let mut digests: Vec<Digest> = self
            .scan_all()?
            .into_iter()
            .filter(|d| d.ci_id == filter.ci_id)
            .filter(|d| filter.start_ts.is_none_or(|start| d.timestamp >= start))
            .filter(|d| filter.end_ts.is_none_or(|end| d.timestamp <= end))
            .filter(|d| filter.period_type.is_none_or(|pt| d.period_type == pt))
            .filter(|d| filter.digest_type.is_none_or(|dt| d.digest_type == dt))
            .filter(|d| {
                filter.theme.as_ref().is_none_or(|needle| {
                    let needle = needle.to_lowercase();
                    d.themes.iter().any(|t| t.to_lowercase().contains(&needle))
                })
            })
            .filter(|d| {
                filter.keyword.as_ref().is_none_or(|needle| {
                    let needle = needle.to_lowercase();
                    d.keywords.iter().any(|k| k.to_lowercase().contains(&needle))
                })
            })
            .collect();
        digests.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.digest_id.cmp(&b.digest_id))
        });
        if let Some(limit) = filter.limit {
            digests.truncate(limit);
        }
        Ok(digests)
    }

    // ========================================================================
    // REBUILD
    // ========================================================================

    /// Clear the index and re-register every digest by scanning the bucket
    /// files with their byte offsets. Returns the number registered.
    pub fn rebuild_index(&self) -> Result<usize> {
        let index = self
            .index
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("tier2 index"))?;
        index.clear()?;

        let mut registered = 0;
        for period_type in [PeriodType::Weekly, PeriodType::Monthly] {
            let dir = self.root.join(period_type.dir_name());
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.extension().is_none_or(|ext| ext != "jsonl") {
                    continue;
                }
                let mut offset: u64 = 0;
                let reader = BufReader::new(File::open(&path)?);
                for line in reader.lines() {
                    let line = line?;
                    let line_len = line.len() as u64 + 1;
                    if !line.trim().is_empty() {
                        match Digest::from_wire_line(&line) {
                            Ok(digest) => {
                                index.insert(&digest, &path, offset)?;
                                registered += 1;
                            }
                            Err(e) => tracing::warn!(
                                "Skipping corrupt digest line in {}: {}",
                                path.display(),
                                e
                            ),
                        }
                    }
                    offset += line_len;
                }
            }
        }
        Ok(registered)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DigestType;
    use tempfile::TempDir;

    fn store() -> (DigestStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::open(dir.path(), 64).unwrap();
        (store, dir)
    }

    fn digest(ci: &str, period_id: &str) -> Digest {
        let mut d = Digest::new(ci, PeriodType::Weekly, period_id);
        d.source_record_count = 3;
        d.themes = vec!["deploys".into()];
        d.keywords = vec!["staging".into()];
        d.summary = format!("summary for {period_id}");
        d
    }

    #[test]
    fn test_store_and_query_roundtrip() {
        let (store, _dir) = store();
        let d = digest("alice", "2025-W43");
        store.store_digest(&d).unwrap();

        let results = store.query(&DigestFilter::for_agent("alice")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], d);
    }

    #[test]
    fn test_get_by_id_preserves_fields() {
        let (store, _dir) = store();
        let mut d = digest("alice", "2025-W43");
        d.key_insights = vec!["canary first".into()];
        d.decisions_made = vec!["adopt canary".into()];
        store.store_digest(&d).unwrap();

        let back = store.get_by_id(&d.digest_id).unwrap().unwrap();
        assert_eq!(back, d);
        assert!(store.get_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_buckets_split_by_period_type() {
        let (store, dir) = store();
        store.store_digest(&digest("alice", "2025-W43")).unwrap();
        let mut monthly = digest("alice", "2025-10");
        monthly.period_type = PeriodType::Monthly;
        store.store_digest(&monthly).unwrap();

        assert!(dir.path().join("weekly/2025-W43.jsonl").exists());
        assert!(dir.path().join("monthly/2025-10.jsonl").exists());
    }

    #[test]
    fn test_query_predicates() {
        let (store, _dir) = store();
        let mut learning = digest("alice", "2025-W43");
        learning.digest_type = DigestType::Learning;
        learning.themes = vec!["testing".into()];
        store.store_digest(&learning).unwrap();
        store.store_digest(&digest("alice", "2025-W44")).unwrap();
        store.store_digest(&digest("bob", "2025-W43")).unwrap();

        let mut filter = DigestFilter::for_agent("alice");
        filter.digest_type = Some(DigestType::Learning);
        assert_eq!(store.query(&filter).unwrap().len(), 1);

        let mut filter = DigestFilter::for_agent("alice");
        filter.theme = Some("test".into());
        let results = store.query(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].digest_id, learning.digest_id);

        let mut filter = DigestFilter::for_agent("alice");
        filter.keyword = Some("staging".into());
        assert_eq!(store.query(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_bucket_size_cap() {
        let dir = TempDir::new().unwrap();
        // 1 MB cap
        let store = DigestStore::open(dir.path(), 1).unwrap();
        let mut d = digest("alice", "2025-W43");
        d.summary = "x".repeat(512 * 1024);
        store.store_digest(&d).unwrap();

        let mut d2 = digest("alice", "2025-W43");
        d2.summary = "y".repeat(600 * 1024);
        store.store_digest(&d2).unwrap();

        // The bucket is now past the cap; the next append is refused
        let err = store.store_digest(&digest("alice", "2025-W43")).unwrap_err();
        assert!(matches!(err, KatraError::BucketFull { .. }));

        // A different bucket still accepts
        store.store_digest(&digest("alice", "2025-W44")).unwrap();
    }

    #[test]
    fn test_scan_fallback_matches_index_path() {
        let dir = TempDir::new().unwrap();
        let store = DigestStore::open(dir.path(), 64).unwrap();
        store.store_digest(&digest("alice", "2025-W43")).unwrap();
        store.store_digest(&digest("alice", "2025-W44")).unwrap();

        let indexed = store.query(&DigestFilter::for_agent("alice")).unwrap();
        let scanned = store.scan(&DigestFilter::for_agent("alice")).unwrap();
        assert_eq!(indexed.len(), scanned.len());
        let mut indexed_ids: Vec<_> = indexed.iter().map(|d| &d.digest_id).collect();
        let mut scanned_ids: Vec<_> = scanned.iter().map(|d| &d.digest_id).collect();
        indexed_ids.sort();
        scanned_ids.sort();
        assert_eq!(indexed_ids, scanned_ids);
    }

    #[test]
    fn test_rebuild_index_recovers_offsets() {
        let (store, _dir) = store();
        let d1 = digest("alice", "2025-W43");
        let d2 = digest("alice", "2025-W43");
        store.store_digest(&d1).unwrap();
        store.store_digest(&d2).unwrap();

        assert_eq!(store.rebuild_index().unwrap(), 2);
        let back = store.get_by_id(&d2.digest_id).unwrap().unwrap();
        assert_eq!(back.summary, d2.summary);
    }

    #[test]
    fn test_set_archived_overlay() {
        let (store, _dir) = store();
        let d = digest("alice", "2025-W43");
        store.store_digest(&d).unwrap();
        store.set_archived(&d.digest_id, true).unwrap();

        let back = store.get_by_id(&d.digest_id).unwrap().unwrap();
        assert!(back.archived);
        assert!(store.set_archived("missing", true).is_err());
    }
}
