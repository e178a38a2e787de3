//! Subcommand implementations. Output goes to the given writer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use artifact_blob::{BlobId, BlobStore};

fn parse_ids(ids: &[String]) -> Result<Vec<BlobId>> {
    ids.iter()
        .map(|s| s.parse::<BlobId>().with_context(|| format!("bad blob id {:?}", s)))
        .collect()
}

/// Store files, printing `<id>  <file>` per input in order.
pub fn put(store: &dyn BlobStore, files: &[PathBuf], out: &mut impl Write) -> Result<()> {
    let contents = files
        .iter()
        .map(|f| std::fs::read(f).with_context(|| format!("reading {}", f.display())))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&[u8]> = contents.iter().map(Vec::as_slice).collect();

    let ids = store.write_blobs_with_unknown_hashes(&refs)?;
    for (id, file) in ids.iter().zip(files) {
        writeln!(out, "{}  {}", id, file.display())?;
    }
    Ok(())
}

pub fn get(
    store: &dyn BlobStore,
    id: &str,
    output: Option<&Path>,
    out: &mut impl Write,
) -> Result<()> {
    let id: BlobId = id.parse()?;
    let Some(data) = store.read_blob(&id)? else {
        anyhow::bail!("blob {} not found", id);
    };
    match output {
        Some(path) => std::fs::write(path, &data)
            .with_context(|| format!("writing {}", path.display()))?,
        None => out.write_all(&data)?,
    }
    Ok(())
}

/// Print `<id>  yes|no` per requested id, in argument order.
pub fn exists(store: &dyn BlobStore, ids: &[String], out: &mut impl Write) -> Result<()> {
    let ids = parse_ids(ids)?;
    let found = store.check_blobs_exist(&ids)?;
    for id in &ids {
        let mark = if found.get(id).copied().unwrap_or(false) { "yes" } else { "no" };
        writeln!(out, "{}  {}", id, mark)?;
    }
    Ok(())
}

/// Wait for blobs; prints `<id>  <size>` or `<id>  missing`. Fails if any
/// blob is still missing at the deadline.
pub fn wait(
    store: &dyn BlobStore,
    ids: &[String],
    timeout: Duration,
    out: &mut impl Write,
) -> Result<()> {
    let ids = parse_ids(ids)?;
    let results = store.read_and_wait_for_blobs(&ids, timeout)?;

    let mut missing = 0;
    for id in &ids {
        match results.get(id).and_then(Option::as_ref) {
            Some(data) => writeln!(out, "{}  {}", id, data.len())?,
            None => {
                missing += 1;
                writeln!(out, "{}  missing", id)?;
            }
        }
    }
    if missing > 0 {
        anyhow::bail!("{} blob(s) still missing after {:?}", missing, timeout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_blob::{
        BlobStoreConfig, MemoryBlobStore, PollMetrics, PollPolicy, PollingWaiter,
        WaitingBlobStore,
    };
    use prometheus::Registry;
    use tempfile::TempDir;

    #[test]
    fn test_put_prints_ids_in_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        std::fs::write(&a, b"alpha").unwrap();
        std::fs::write(&b, b"beta").unwrap();

        let store = MemoryBlobStore::new();
        let mut out = Vec::new();
        put(&store, &[a.clone(), b.clone(), a.clone()], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&BlobId::of(b"alpha").to_hex()));
        assert!(lines[1].starts_with(&BlobId::of(b"beta").to_hex()));
        assert_eq!(lines[0], lines[2]);
    }

    #[test]
    fn test_get_round_trip() {
        let store = MemoryBlobStore::new();
        let id = store.write_blob_with_unknown_hash(b"evidence").unwrap();

        let mut out = Vec::new();
        get(&store, &id.to_hex(), None, &mut out).unwrap();
        assert_eq!(out, b"evidence");

        let missing = BlobId::of(b"nope").to_hex();
        assert!(get(&store, &missing, None, &mut Vec::new()).is_err());
        assert!(get(&store, "not-hex", None, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_exists_output() {
        let store = MemoryBlobStore::new();
        let id = store.write_blob_with_unknown_hash(b"here").unwrap();
        let other = BlobId::of(b"gone");

        let mut out = Vec::new();
        exists(&store, &[id.to_hex(), other.to_hex()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("{}  yes\n{}  no\n", id, other));
    }

    #[test]
    fn test_wait_reports_missing() {
        let store = MemoryBlobStore::new();
        let id = store.write_blob_with_unknown_hash(b"12345").unwrap();
        let other = BlobId::of(b"later");
        let store = WaitingBlobStore::new(
            store,
            PollingWaiter::new(PollPolicy::fixed(Duration::from_millis(10))),
        );

        let mut out = Vec::new();
        wait(&store, &[id.to_hex()], Duration::ZERO, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}  5\n", id));

        let mut out = Vec::new();
        let err = wait(&store, &[other.to_hex()], Duration::ZERO, &mut out);
        assert!(err.is_err());
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}  missing\n", other));
    }

    #[test]
    fn test_wait_records_metrics() {
        let registry = Registry::new();
        let metrics = PollMetrics::register(&registry).unwrap();
        let store =
            artifact_blob::open_store(&BlobStoreConfig::default(), Some(metrics.clone())).unwrap();
        let id = store.write_blob_with_unknown_hash(b"disk image").unwrap();

        let mut out = Vec::new();
        wait(store.as_ref(), &[id.to_hex()], Duration::from_secs(1), &mut out).unwrap();
        assert_eq!(metrics.latency().get_sample_count(), 1);
        assert_eq!(metrics.iteration().get_sample_count(), 1);
    }
}
