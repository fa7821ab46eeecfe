//! Polling watcher for files changed outside the sync server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A document was created or modified by someone other than a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    pub id: String,
}

/// id → (modified time, length)
pub type Snapshot = HashMap<String, (SystemTime, u64)>;

/// Walk `root` and record every visible file. Hidden entries (temp files
/// written by the store among them) are skipped.
pub fn scan(root: &Path) -> std::io::Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let meta = entry.metadata()?;
            let path = entry.path();
            if meta.is_dir() {
                stack.push(path);
                continue;
            }
            if let Some(id) = to_id(root, &path) {
                snapshot.insert(id, (meta.modified()?, meta.len()));
            }
        }
    }
    Ok(snapshot)
}

fn to_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Ids that are new or changed between two scans. Deletions are not reported.
pub fn changed_ids(previous: &Snapshot, current: &Snapshot) -> Vec<String> {
    let mut ids: Vec<String> = current
        .iter()
        .filter(|(id, stamp)| previous.get(*id) != Some(*stamp))
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}

/// Scan `root` every `interval` and report changed files on `tx`.
///
/// The first scan only establishes the baseline. The task ends when the
/// receiving side is dropped.
pub fn spawn_poll_watcher(
    root: PathBuf,
    interval: Duration,
    tx: mpsc::Sender<ExternalChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Watching {} every {:?}", root.display(), interval);
        let mut previous: Option<Snapshot> = None;
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let scan_root = root.clone();
            let current = match tokio::task::spawn_blocking(move || scan(&scan_root)).await {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(e)) => {
                    warn!("Failed to scan {}: {}", root.display(), e);
                    continue;
                }
                Err(e) => {
                    error!("Watcher scan task failed: {}", e);
                    continue;
                }
            };

            if let Some(prev) = &previous {
                for id in changed_ids(prev, &current) {
                    debug!("Detected change to {}", id);
                    if tx.send(ExternalChange { id }).await.is_err() {
                        info!("External change receiver dropped, stopping watcher");
                        return;
                    }
                }
            }
            previous = Some(current);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_maps_nested_files_to_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("notes/daily")).unwrap();
        std::fs::write(dir.path().join("top.md"), "t").unwrap();
        std::fs::write(dir.path().join("notes/daily/today.md"), "d").unwrap();
        std::fs::write(dir.path().join(".top.md.123.tmp"), "ignored").unwrap();

        let snapshot = scan(dir.path()).unwrap();
        let mut ids: Vec<_> = snapshot.keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["notes/daily/today.md", "top.md"]);
    }

    #[test]
    fn changed_ids_reports_new_and_modified() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(1);
        let previous: Snapshot = [
            ("same.md".to_string(), (t0, 1)),
            ("touched.md".to_string(), (t0, 1)),
            ("gone.md".to_string(), (t0, 1)),
        ]
        .into_iter()
        .collect();
        let current: Snapshot = [
            ("same.md".to_string(), (t0, 1)),
            ("touched.md".to_string(), (t1, 1)),
            ("new.md".to_string(), (t0, 3)),
        ]
        .into_iter()
        .collect();

        assert_eq!(changed_ids(&previous, &current), vec!["new.md", "touched.md"]);
    }
}
