//! services/api/src/adapters/course_store.rs
//!
//! The persistence adapter for the saved-course list. The whole list is kept in a
//! single JSON file, newest first, and rewritten on every change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use course_designer_core::domain::SavedCourse;
use course_designer_core::ports::{PortError, PortResult, SavedCourseStore};
use course_designer_core::store::{remove_from, upsert_into};
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct JsonFileCourseStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileCourseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable course file is moved before the list starts over.
    pub fn corrupt_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    /// A missing file is an empty list. So is a file that cannot be parsed; it
    /// is first moved to [`Self::corrupt_path`] so the next write cannot lose it.
    async fn read(&self) -> PortResult<Vec<SavedCourse>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PortError::Storage(e.to_string())),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&raw) {
            Ok(courses) => Ok(courses),
            Err(e) => {
                let backup = self.corrupt_path();
                error!(
                    "Saved courses at {} are unreadable, moving them to {}: {}",
                    self.path.display(),
                    backup.display(),
                    e
                );
                tokio::fs::rename(&self.path, &backup)
                    .await
                    .map_err(|e| PortError::Storage(e.to_string()))?;
                Ok(Vec::new())
            }
        }
    }

    async fn write(&self, courses: &[SavedCourse]) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(courses)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| PortError::Storage(e.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| PortError::Storage(e.to_string()))
    }
}

#[async_trait]
impl SavedCourseStore for JsonFileCourseStore {
    async fn list(&self) -> PortResult<Vec<SavedCourse>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn prepend(&self, course: SavedCourse) -> PortResult<()> {
        let _guard = self.lock.lock().await;
        let mut courses = self.read().await?;
        info!("Saving course {} ({})", course.id, course.prompt);
        courses.insert(0, course);
        self.write(&courses).await
    }

    async fn upsert(&self, course: SavedCourse) -> PortResult<()> {
        let _guard = self.lock.lock().await;
        let mut courses = self.read().await?;
        upsert_into(&mut courses, course);
        self.write(&courses).await
    }

    async fn remove(&self, id: i64) -> PortResult<()> {
        let _guard = self.lock.lock().await;
        let mut courses = self.read().await?;
        remove_from(&mut courses, id)?;
        self.write(&courses).await
    }

    async fn clear(&self) -> PortResult<()> {
        let _guard = self.lock.lock().await;
        self.write(&[]).await
    }
}
