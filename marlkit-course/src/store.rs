//! JSON-lines course file.
//!
//! Writes are append-only. Reads are lenient: a missing file, a malformed
//! line or an empty file all come back as `None` with a warning in the log,
//! never as an error.

use marlkit_core::persistence::append_json_line;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::action::{Action, ActionError, generate_with};

/// One course: an action sequence per agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub actions_1: Vec<u8>,
    pub actions_2: Vec<u8>,
}

impl CourseRecord {
    pub fn new(actions_1: Vec<u8>, actions_2: Vec<u8>) -> Self {
        Self {
            actions_1,
            actions_2,
        }
    }

    /// Steps in the course (length of the first agent's sequence).
    pub fn len(&self) -> usize {
        self.actions_1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions_1.is_empty()
    }

    /// Both agents have the same number of steps.
    pub fn is_balanced(&self) -> bool {
        self.actions_1.len() == self.actions_2.len()
    }

    /// Per-step typed action pairs.
    pub fn actions(&self) -> Result<Vec<(Action, Action)>, ActionError> {
        self.actions_1
            .iter()
            .zip(&self.actions_2)
            .map(|(&a, &b)| Ok((Action::try_from(a)?, Action::try_from(b)?)))
            .collect()
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    actions_1: &'a [u8],
    actions_2: &'a [u8],
}

/// Append one course to `path`, creating the file if needed.
pub fn append(path: &Path, actions_1: &[u8], actions_2: &[u8]) -> io::Result<()> {
    append_json_line(
        path,
        &RecordRef {
            actions_1,
            actions_2,
        },
    )?;
    debug!(path = %path.display(), steps = actions_1.len(), "Appended course");
    Ok(())
}

/// Every course in `path`, in file order.
///
/// `None` when the file is missing or unreadable, any non-empty line is not
/// a course record, or there are no records at all.
pub fn read_all(path: &Path) -> Option<Vec<CourseRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Course file not found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read course file");
            return None;
        }
    };

    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CourseRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Error decoding course record"
                );
                return None;
            }
        }
    }

    if records.is_empty() {
        debug!(path = %path.display(), "Course file has no records");
        return None;
    }
    Some(records)
}

/// The course at zero-based `index`, or `None` when there is no such course.
pub fn read_nth(path: &Path, index: usize) -> Option<CourseRecord> {
    let mut records = read_all(path)?;
    if index >= records.len() {
        warn!(
            path = %path.display(),
            index,
            available = records.len(),
            "Course index out of range"
        );
        return None;
    }
    Some(records.swap_remove(index))
}

/// A course file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseStore {
    path: PathBuf,
}

impl CourseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, actions_1: &[u8], actions_2: &[u8]) -> io::Result<()> {
        append(&self.path, actions_1, actions_2)
    }

    pub fn append_record(&self, record: &CourseRecord) -> io::Result<()> {
        self.append(&record.actions_1, &record.actions_2)
    }

    /// Generate a random `steps`-long course and append it.
    pub fn generate<R: Rng>(&self, rng: &mut R, steps: usize) -> io::Result<CourseRecord> {
        let (actions_1, actions_2) = generate_with(rng, steps);
        let record = CourseRecord::new(actions_1, actions_2);
        self.append_record(&record)?;
        Ok(record)
    }

    pub fn read_all(&self) -> Option<Vec<CourseRecord>> {
        read_all(&self.path)
    }

    pub fn read_nth(&self, index: usize) -> Option<CourseRecord> {
        read_nth(&self.path, index)
    }

    /// Number of stored courses; zero when the file is absent or unreadable.
    pub fn len(&self) -> usize {
        self.read_all().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::generate_random_actions;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    #[test]
    fn test_append_then_read_nth_example() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("random_actions.txt");

        let (a, b) = generate_random_actions(3);
        append(&path, &a, &b).unwrap();

        let record = read_nth(&path, 0).unwrap();
        assert_eq!(record, CourseRecord::new(a, b));
    }

    #[test]
    fn test_wire_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        append(&path, &[0, 5, 4], &[1, 2, 3]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"actions_1\":[0,5,4],\"actions_2\":[1,2,3]}\n"
        );
    }

    #[test]
    fn test_read_all_keeps_append_order() {
        let dir = TempDir::new().unwrap();
        let store = CourseStore::new(dir.path().join("courses.jsonl"));
        store.append(&[0], &[1]).unwrap();
        store.append(&[2], &[3]).unwrap();
        store.append(&[4], &[5]).unwrap();

        let records = store.read_all().unwrap();
        assert_eq!(
            records,
            vec![
                CourseRecord::new(vec![0], vec![1]),
                CourseRecord::new(vec![2], vec![3]),
                CourseRecord::new(vec![4], vec![5]),
            ]
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.jsonl");
        assert!(read_all(&path).is_none());
        assert!(read_nth(&path, 0).is_none());
        assert!(CourseStore::new(path).is_empty());
    }

    #[test]
    fn test_malformed_line_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        std::fs::write(
            &path,
            "{\"actions_1\":[0],\"actions_2\":[1]}\n{\"actions_1\": [0,\n",
        )
        .unwrap();
        assert!(read_all(&path).is_none());
    }

    #[test]
    fn test_codes_outside_u8_make_the_file_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        std::fs::write(
            &path,
            "{\"actions_1\":[0],\"actions_2\":[1]}\n{\"actions_1\":[256],\"actions_2\":[-1]}\n",
        )
        .unwrap();
        assert!(read_all(&path).is_none());
        assert!(read_nth(&path, 0).is_none());
    }

    #[test]
    fn test_unknown_code_in_u8_range_still_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        append(&path, &[9], &[200]).unwrap();
        let record = read_nth(&path, 0).unwrap();
        assert_eq!(record.actions_1, vec![9]);
        assert!(record.actions().is_err());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        std::fs::write(
            &path,
            "\n{\"actions_1\":[0],\"actions_2\":[1]}\n   \n{\"actions_1\":[3],\"actions_2\":[4]}\n",
        )
        .unwrap();
        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(read_nth(&path, 1).unwrap().actions_1, vec![3]);
    }

    #[test]
    fn test_empty_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(read_all(&path).is_none());
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courses.jsonl");
        append(&path, &[0, 1], &[2, 3]).unwrap();
        assert!(read_nth(&path, 1).is_none());
    }

    #[test]
    fn test_generate_appends_balanced_course() {
        let dir = TempDir::new().unwrap();
        let store = CourseStore::new(dir.path().join("courses.jsonl"));
        let mut rng = StdRng::seed_from_u64(4);

        let record = store.generate(&mut rng, 10).unwrap();
        assert_eq!(record.len(), 10);
        assert!(record.is_balanced());
        assert_eq!(store.read_nth(0), Some(record.clone()));
        assert_eq!(record.actions().unwrap().len(), 10);
    }

    #[test]
    fn test_typed_actions_reject_unknown_codes() {
        let record = CourseRecord::new(vec![0, 9], vec![1, 1]);
        assert_eq!(record.actions(), Err(ActionError::UnknownCode(9)));
    }
}
