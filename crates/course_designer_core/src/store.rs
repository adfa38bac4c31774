//! crates/course_designer_core/src/store.rs
//!
//! List operations shared by every `SavedCourseStore`, and an in-memory store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::SavedCourse;
use crate::ports::{PortError, PortResult, SavedCourseStore};

/// Replaces the entry with the same id where it stands, or puts the course first.
pub fn upsert_into(list: &mut Vec<SavedCourse>, course: SavedCourse) {
    match list.iter_mut().find(|c| c.id == course.id) {
        Some(existing) => *existing = course,
        None => list.insert(0, course),
    }
}

pub fn remove_from(list: &mut Vec<SavedCourse>, id: i64) -> PortResult<()> {
    let before = list.len();
    list.retain(|c| c.id != id);
    if list.len() == before {
        return Err(PortError::NotFound(format!("Saved course {} not found", id)));
    }
    Ok(())
}

/// A store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCourseStore {
    courses: Mutex<Vec<SavedCourse>>,
}

impl MemoryCourseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SavedCourseStore for MemoryCourseStore {
    async fn list(&self) -> PortResult<Vec<SavedCourse>> {
        Ok(self.courses.lock().await.clone())
    }

    async fn prepend(&self, course: SavedCourse) -> PortResult<()> {
        self.courses.lock().await.insert(0, course);
        Ok(())
    }

    async fn upsert(&self, course: SavedCourse) -> PortResult<()> {
        upsert_into(&mut *self.courses.lock().await, course);
        Ok(())
    }

    async fn remove(&self, id: i64) -> PortResult<()> {
        remove_from(&mut *self.courses.lock().await, id)
    }

    async fn clear(&self) -> PortResult<()> {
        self.courses.lock().await.clear();
        Ok(())
    }
}
