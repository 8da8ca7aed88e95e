use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use time::Date;
use tokio::sync::Mutex;

use super::LessonStore;
use crate::error::{AppError, AppResult};
use crate::models::{Instructor, Lesson, LessonState, LessonTime, Slot, User};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    instructors: BTreeMap<i32, Instructor>,
    /// instructor id -> resort names
    resorts: HashMap<i32, HashSet<String>>,
    lesson_times: Vec<LessonTime>,
    lessons: BTreeMap<i32, Lesson>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`LessonStore`] with the same semantics as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_instructor(&self, name: &str, status: &str, resorts: &[&str]) -> (User, Instructor) {
        let telegram_id = i64::from(self.tables.lock().await.next_id) + 9000;
        let user = self.create_user(telegram_id, name).await.unwrap();
        let mut tables = self.tables.lock().await;
        let instructor = Instructor {
            id: tables.next_id(),
            user_id: user.id,
            name: name.to_string(),
            status: status.to_string(),
        };
        tables.instructors.insert(instructor.id, instructor.clone());
        tables
            .resorts
            .insert(instructor.id, resorts.iter().map(|r| r.to_string()).collect());
        (user, instructor)
    }

    pub async fn set_instructor_status(&self, instructor_id: i32, status: &str) {
        if let Some(instructor) = self.tables.lock().await.instructors.get_mut(&instructor_id) {
            instructor.status = status.to_string();
        }
    }

    /// Makes every following lesson write fail, as a lost database connection would.
    pub async fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().await = fail;
    }

    pub async fn lesson_time_count(&self) -> usize {
        self.tables.lock().await.lesson_times.len()
    }

    pub async fn lesson_count(&self) -> usize {
        self.tables.lock().await.lessons.len()
    }

    async fn check_writable(&self) -> AppResult<()> {
        if *self.fail_writes.lock().await {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl LessonStore for MemoryStore {
    async fn list_lessons(&self) -> AppResult<Vec<Lesson>> {
        Ok(self.tables.lock().await.lessons.values().cloned().collect())
    }

    async fn find_lesson(&self, id: i32) -> AppResult<Lesson> {
        self.tables
            .lock()
            .await
            .lessons
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("lesson", id))
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> AppResult<i32> {
        self.check_writable().await?;
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let mut stored = lesson.clone();
        stored.id = Some(id);
        tables.lessons.insert(id, stored);
        Ok(id)
    }

    async fn update_lesson(&self, lesson: &Lesson) -> AppResult<()> {
        self.check_writable().await?;
        let id = lesson.id.ok_or(AppError::not_found("lesson", 0))?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .lessons
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("lesson", id))?;
        *stored = lesson.clone();
        Ok(())
    }

    async fn find_or_create_lesson_time(&self, date: Date, slot: Slot) -> AppResult<LessonTime> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .lesson_times
            .iter()
            .find(|t| t.date == date && t.slot == slot)
        {
            return Ok(existing.clone());
        }
        let lesson_time = LessonTime {
            id: tables.next_id(),
            date,
            slot,
        };
        tables.lesson_times.push(lesson_time.clone());
        Ok(lesson_time)
    }

    async fn find_user(&self, id: i32) -> AppResult<User> {
        self.tables
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("user", id))
    }

    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<User>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.telegram_id == telegram_id)
            .cloned())
    }

    async fn create_user(&self, telegram_id: i64, name: &str) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.values_mut().find(|u| u.telegram_id == telegram_id) {
            user.name = name.to_string();
            return Ok(user.clone());
        }
        let user = User {
            id: tables.next_id(),
            telegram_id,
            name: name.to_string(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_instructor(&self, id: i32) -> AppResult<Instructor> {
        self.tables
            .lock()
            .await
            .instructors
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("instructor", id))
    }

    async fn instructor_for_user(&self, user_id: i32) -> AppResult<Option<Instructor>> {
        Ok(self
            .tables
            .lock()
            .await
            .instructors
            .values()
            .find(|i| i.user_id == user_id)
            .cloned())
    }

    async fn eligible_instructors(&self, lesson: &Lesson) -> AppResult<Vec<Instructor>> {
        let tables = self.tables.lock().await;
        let lesson_time_id = lesson.lesson_time.as_ref().map(|t| t.id);
        let busy = |instructor_id: i32| {
            tables.lessons.values().any(|other| {
                other.instructor_id == Some(instructor_id)
                    && other.lesson_time.as_ref().map(|t| t.id) == lesson_time_id
                    && other.state != LessonState::Canceled
                    && other.id != lesson.id
            })
        };
        Ok(tables
            .instructors
            .values()
            .filter(|i| i.is_active())
            .filter(|i| {
                tables
                    .resorts
                    .get(&i.id)
                    .is_some_and(|resorts| resorts.contains(&lesson.location))
            })
            .filter(|i| !busy(i.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::date;

    use super::*;
    use crate::models::fixtures::detailed_lesson;

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let first = store
            .find_or_create_lesson_time(date!(2025 - 02 - 01), Slot::FullDay)
            .await
            .unwrap();
        for _ in 0..3 {
            let again = store
                .find_or_create_lesson_time(date!(2025 - 02 - 01), Slot::FullDay)
                .await
                .unwrap();
            assert_eq!(again, first);
        }
        let other = store
            .find_or_create_lesson_time(date!(2025 - 02 - 01), Slot::Night)
            .await
            .unwrap();
        assert_ne!(other.id, first.id);
        assert_eq!(store.lesson_time_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_find_or_create_stores_one_record() {
        let store = Arc::new(MemoryStore::new());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .find_or_create_lesson_time(date!(2025 - 03 - 09), Slot::Morning)
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(store.lesson_time_count().await, 1);
    }

    #[tokio::test]
    async fn eligibility_checks_status_resort_and_clashes() {
        let store = MemoryStore::new();
        let (_, active) = store.add_instructor("Ana", "Active", &["Squaw Valley"]).await;
        let (_, inactive) = store.add_instructor("Ben", "Inactive", &["Squaw Valley"]).await;
        let (_, elsewhere) = store.add_instructor("Cy", "Active", &["Kirkwood"]).await;
        let (_, busy) = store.add_instructor("Di", "Active", &["Squaw Valley"]).await;

        let mut taken = detailed_lesson(1);
        taken.instructor_id = Some(busy.id);
        store.insert_lesson(&taken).await.unwrap();

        let lesson = detailed_lesson(1);
        let eligible: Vec<i32> = store
            .eligible_instructors(&lesson)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(eligible, vec![active.id]);
        assert!(!eligible.contains(&inactive.id));
        assert!(!eligible.contains(&elsewhere.id));
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.find_lesson(77).await,
            Err(AppError::NotFound { entity: "lesson", id: 77 })
        ));
    }
}
