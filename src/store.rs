//! Durable task store backed by a line-oriented JSON log.
//!
//! The store is the sole writer of `tasks.jsonl`. Readers take a whole
//! snapshot under a shared advisory lock; every mutation is a whole-file
//! rewrite to a temporary path followed by an atomic rename, under an
//! exclusive lock. The agent process may read or write the same file
//! between controller invocations; no lock is held across an agent call.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::Local;
use fs2::FileExt;
use tracing::warn;

use crate::config::Workspace;
use crate::error::Result;
use crate::task::{self, ArchivedTask, Task, TaskStatus};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for cross-process advisory locking.
const LOCK_SUFFIX: &str = ".lock";

/// Persistent task store for one project.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks_path: PathBuf,
    archive_path: PathBuf,
}

impl TaskStore {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            tasks_path: workspace.tasks_file(),
            archive_path: workspace.archive_file(),
        }
    }

    /// Store rooted at explicit paths.
    pub fn at(tasks_path: impl Into<PathBuf>, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            tasks_path: tasks_path.into(),
            archive_path: archive_path.into(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.tasks_path.as_os_str().to_owned();
        name.push(TMP_SUFFIX);
        PathBuf::from(name)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.tasks_path.as_os_str().to_owned();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    fn lock_file(&self) -> Result<File> {
        if let Some(parent) = self.tasks_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(self.lock_path())?)
    }

    /// Load the full task snapshot, preserving file order.
    ///
    /// Lines that fail to parse or validate are logged and skipped;
    /// partial corruption never aborts a load. A missing file is an
    /// empty store.
    pub fn load(&self) -> Result<Vec<Task>> {
        if !self.tasks_path.exists() {
            return Ok(Vec::new());
        }

        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock)?;

        let file = File::open(&self.tasks_path)?;
        let reader = BufReader::new(file);

        let mut tasks = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Task>(&line) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(
                        "Skipping invalid task record on line {}: {}",
                        line_num + 1,
                        e
                    );
                }
            }
        }
        Ok(tasks)
    }

    /// Replace the full task snapshot atomically.
    pub fn save(&self, tasks: &[Task]) -> Result<()> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock)?;

        let tmp_path = self.tmp_path();
        let mut tmp = File::create(&tmp_path)?;
        for task in tasks {
            serde_json::to_writer(&mut tmp, task)?;
            tmp.write_all(b"\n")?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.tasks_path)?;
        Ok(())
    }

    /// Append one completion record to the archive log.
    pub fn append_archive(&self, record: &ArchivedTask) -> Result<()> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.archive_path)?;
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Set a task's status in place and persist the snapshot.
    pub fn set_status(&self, tasks: &mut [Task], id: &str, status: TaskStatus) -> Result<()> {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
        self.save(tasks)
    }

    /// Attach a commit hash to a completed non-root task and persist.
    pub fn record_commit(&self, tasks: &mut [Task], id: &str, commit: &str) -> Result<()> {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.commit = Some(commit.to_string());
        }
        self.save(tasks)
    }

    /// Archive a completed root task and its entire descendant subtree
    /// in one transaction: every record is appended to the archive with
    /// today's date and the given commit hash, then the live snapshot
    /// is rewritten without them.
    ///
    /// Descendants stay in the live store until this point so the agent
    /// can see which ids are taken.
    pub fn archive_tree(&self, tasks: &mut Vec<Task>, id: &str, commit: &str) -> Result<()> {
        let Some(root) = task::find(tasks, id).cloned() else {
            return Ok(());
        };

        let today = Local::now().date_naive();
        let mut to_archive = vec![root];
        to_archive.extend(task::descendants(tasks, id).into_iter().cloned());

        for t in &to_archive {
            self.append_archive(&ArchivedTask::from_task(t, today, commit))?;
        }

        let archived_ids: Vec<String> = to_archive.into_iter().map(|t| t.id).collect();
        tasks.retain(|t| !archived_ids.contains(&t.id));
        self.save(tasks)
    }

    /// Load the archive log (used by tests and status inspection).
    pub fn load_archive(&self) -> Result<Vec<ArchivedTask>> {
        if !self.archive_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.archive_path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArchivedTask>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Skipping invalid archive record on line {}: {}",
                        line_num + 1,
                        e
                    );
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TaskStore, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let store = TaskStore::at(
            temp.path().join("tasks.jsonl"),
            temp.path().join("tasks-done.jsonl"),
        );
        (store, temp)
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            status,
            commit: None,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (store, _temp) = test_store();
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_roundtrip_preserves_order_and_fields() {
        let (store, _temp) = test_store();
        let mut tasks = vec![
            task("2", TaskStatus::Pending),
            task("1", TaskStatus::Split),
            task("1.1", TaskStatus::Complete),
        ];
        tasks[2].commit = Some("abc1234".into());

        store.save(&tasks).expect("save");
        let loaded = store.load().expect("load");
        assert_eq!(tasks, loaded);
    }

    #[test]
    fn test_roundtrip_empty_snapshot() {
        let (store, _temp) = test_store();
        store.save(&[]).expect("save");
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let (store, _temp) = test_store();
        let content = concat!(
            r#"{"id":"1","title":"good","status":"pending"}"#,
            "\n",
            "not json at all\n",
            r#"{"id":"2","title":"bad status","status":"paused"}"#,
            "\n",
            r#"{"id":"3","status":"pending"}"#,
            "\n",
            "\n",
            r#"{"id":"4","title":"also good","status":"complete"}"#,
            "\n",
        );
        fs::write(store.tasks_path.clone(), content).expect("write");

        let loaded = store.load().expect("load");
        let ids: Vec<&str> = loaded.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let (store, _temp) = test_store();
        store.save(&[task("1", TaskStatus::Pending)]).expect("save");
        assert!(!store.tmp_path().exists());
        assert!(store.tasks_path.exists());
    }

    #[test]
    fn test_set_status_persists() {
        let (store, _temp) = test_store();
        let mut tasks = vec![task("1", TaskStatus::Pending)];
        store.save(&tasks).expect("save");

        store
            .set_status(&mut tasks, "1", TaskStatus::Active)
            .expect("set status");

        let loaded = store.load().expect("load");
        assert_eq!(loaded[0].status, TaskStatus::Active);
    }

    #[test]
    fn test_record_commit_keeps_siblings() {
        let (store, _temp) = test_store();
        let mut tasks = vec![
            task("1", TaskStatus::Split),
            task("1.1", TaskStatus::Complete),
            task("1.2", TaskStatus::Pending),
        ];
        store.save(&tasks).expect("save");

        store
            .record_commit(&mut tasks, "1.1", "abc1234")
            .expect("record");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1].commit.as_deref(), Some("abc1234"));
        assert!(loaded[0].commit.is_none());
    }

    #[test]
    fn test_archive_tree_removes_root_and_all_descendants() {
        let (store, _temp) = test_store();
        let mut tasks = vec![
            task("1", TaskStatus::Complete),
            task("1.1", TaskStatus::Complete),
            task("1.1.1", TaskStatus::Complete),
            task("1.2", TaskStatus::Complete),
            task("2", TaskStatus::Pending),
        ];
        store.save(&tasks).expect("save");

        store
            .archive_tree(&mut tasks, "1", "abc1234")
            .expect("archive");

        let live = store.load().expect("load");
        let ids: Vec<&str> = live.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);

        let archive = store.load_archive().expect("load archive");
        let archived_ids: Vec<&str> = archive.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(archived_ids, vec!["1", "1.1", "1.1.1", "1.2"]);
        assert!(archive.iter().all(|r| r.commit == "abc1234"));
    }

    #[test]
    fn test_archive_tree_missing_task_is_noop() {
        let (store, _temp) = test_store();
        let mut tasks = vec![task("2", TaskStatus::Pending)];
        store.save(&tasks).expect("save");

        store
            .archive_tree(&mut tasks, "9", "abc1234")
            .expect("archive");

        assert_eq!(store.load().expect("load").len(), 1);
        assert!(store.load_archive().expect("load archive").is_empty());
    }

    #[test]
    fn test_append_archive_accumulates() {
        let (store, _temp) = test_store();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date");
        for id in ["1", "2"] {
            let t = task(id, TaskStatus::Complete);
            store
                .append_archive(&ArchivedTask::from_task(&t, date, "abc1234"))
                .expect("append");
        }
        assert_eq!(store.load_archive().expect("load").len(), 2);
    }
}
