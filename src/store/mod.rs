//! Persistence for lessons and the records around them.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::Date;

use crate::error::AppResult;
use crate::models::{Instructor, Lesson, LessonTime, Slot, User};

#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn list_lessons(&self) -> AppResult<Vec<Lesson>>;

    /// Fails with [`crate::error::AppError::NotFound`] for an unknown id.
    async fn find_lesson(&self, id: i32) -> AppResult<Lesson>;

    /// Stores a new lesson and returns its id.
    async fn insert_lesson(&self, lesson: &Lesson) -> AppResult<i32>;

    async fn update_lesson(&self, lesson: &Lesson) -> AppResult<()>;

    /// Atomic: concurrent calls for the same pair resolve to one record.
    async fn find_or_create_lesson_time(&self, date: Date, slot: Slot) -> AppResult<LessonTime>;

    async fn find_user(&self, id: i32) -> AppResult<User>;

    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<User>>;

    async fn create_user(&self, telegram_id: i64, name: &str) -> AppResult<User>;

    async fn find_instructor(&self, id: i32) -> AppResult<Instructor>;

    async fn instructor_for_user(&self, user_id: i32) -> AppResult<Option<Instructor>>;

    /// Active instructors teaching at the lesson's location with no other open lesson
    /// at the same lesson time. Includes the assigned instructor when still eligible.
    async fn eligible_instructors(&self, lesson: &Lesson) -> AppResult<Vec<Instructor>>;
}
