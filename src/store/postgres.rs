use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::{Date, Time};

use super::LessonStore;
use crate::error::{AppError, AppResult};
use crate::models::{Instructor, Lesson, LessonState, LessonTime, Slot, Student, User};

const LESSON_COLUMNS: &str = "
    SELECT
        l.id,
        l.requester_id,
        l.instructor_id,
        l.lesson_time_id,
        lt.date AS lesson_date,
        lt.slot AS lesson_slot,
        l.activity,
        l.location,
        l.state,
        l.student_count,
        l.gear,
        l.objectives,
        l.duration,
        l.ability_level,
        l.start_time,
        l.actual_start_time,
        l.actual_end_time,
        l.terms_accepted,
        l.deposit_status,
        l.students
    FROM lessons l
    JOIN lesson_times lt ON lt.id = l.lesson_time_id";

#[derive(FromRow)]
struct LessonRow {
    id: i32,
    requester_id: i32,
    instructor_id: Option<i32>,
    lesson_time_id: i32,
    lesson_date: Date,
    lesson_slot: String,
    activity: String,
    location: String,
    state: String,
    student_count: Option<i32>,
    gear: Option<String>,
    objectives: Option<String>,
    duration: Option<f64>,
    ability_level: Option<String>,
    start_time: Option<Time>,
    actual_start_time: Option<Time>,
    actual_end_time: Option<Time>,
    terms_accepted: bool,
    deposit_status: String,
    students: Json<Vec<Student>>,
}

#[derive(FromRow)]
struct LessonTimeRow {
    id: i32,
    date: Date,
    slot: String,
}

impl TryFrom<LessonTimeRow> for LessonTime {
    type Error = AppError;

    fn try_from(row: LessonTimeRow) -> Result<Self, Self::Error> {
        Ok(LessonTime {
            id: row.id,
            date: row.date,
            slot: parse_column("lesson_times.slot", &row.slot)?,
        })
    }
}

impl TryFrom<LessonRow> for Lesson {
    type Error = AppError;

    fn try_from(row: LessonRow) -> Result<Self, Self::Error> {
        let lesson_time = LessonTime::try_from(LessonTimeRow {
            id: row.lesson_time_id,
            date: row.lesson_date,
            slot: row.lesson_slot,
        })?;
        Ok(Lesson {
            id: Some(row.id),
            requester_id: row.requester_id,
            instructor_id: row.instructor_id,
            lesson_time: Some(lesson_time),
            activity: row.activity,
            location: row.location,
            state: parse_column::<LessonState>("lessons.state", &row.state)?,
            student_count: row.student_count,
            gear: row.gear,
            objectives: row.objectives,
            duration: row.duration,
            ability_level: row.ability_level,
            start_time: row.start_time,
            actual_start_time: row.actual_start_time,
            actual_end_time: row.actual_end_time,
            terms_accepted: row.terms_accepted,
            deposit_status: parse_column("lessons.deposit_status", &row.deposit_status)?,
            students: row.students.0,
        })
    }
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: &str) -> AppResult<T> {
    value.parse().map_err(|_| AppError::CorruptColumn {
        column,
        value: value.to_string(),
    })
}

fn lesson_time_id(lesson: &Lesson) -> Option<i32> {
    lesson.lesson_time.as_ref().map(|t| t.id)
}

pub struct PgLessonStore {
    pool: PgPool,
}

impl PgLessonStore {
    pub fn new(pool: PgPool) -> Self {
        PgLessonStore { pool }
    }
}

#[async_trait]
impl LessonStore for PgLessonStore {
    async fn list_lessons(&self) -> AppResult<Vec<Lesson>> {
        sqlx::query_as::<_, LessonRow>(&format!("{LESSON_COLUMNS} ORDER BY lt.date, l.id"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Lesson::try_from)
            .collect()
    }

    async fn find_lesson(&self, id: i32) -> AppResult<Lesson> {
        sqlx::query_as::<_, LessonRow>(&format!("{LESSON_COLUMNS} WHERE l.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("lesson", id))?
            .try_into()
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> AppResult<i32> {
        let id = sqlx::query_scalar(
            "INSERT INTO lessons (requester_id, instructor_id, lesson_time_id, activity, location,
                 state, student_count, gear, objectives, duration, ability_level, start_time,
                 actual_start_time, actual_end_time, terms_accepted, deposit_status, students)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
             RETURNING id",
        )
        .bind(lesson.requester_id)
        .bind(lesson.instructor_id)
        .bind(lesson_time_id(lesson))
        .bind(&lesson.activity)
        .bind(&lesson.location)
        .bind(lesson.state.as_str())
        .bind(lesson.student_count)
        .bind(&lesson.gear)
        .bind(&lesson.objectives)
        .bind(lesson.duration)
        .bind(&lesson.ability_level)
        .bind(lesson.start_time)
        .bind(lesson.actual_start_time)
        .bind(lesson.actual_end_time)
        .bind(lesson.terms_accepted)
        .bind(lesson.deposit_status.as_str())
        .bind(Json(&lesson.students))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_lesson(&self, lesson: &Lesson) -> AppResult<()> {
        let id = lesson.id.ok_or(AppError::not_found("lesson", 0))?;
        let result = sqlx::query(
            "UPDATE lessons SET instructor_id = $2, lesson_time_id = $3, activity = $4,
                 location = $5, state = $6, student_count = $7, gear = $8, objectives = $9,
                 duration = $10, ability_level = $11, start_time = $12, actual_start_time = $13,
                 actual_end_time = $14, terms_accepted = $15, deposit_status = $16, students = $17
             WHERE id = $1",
        )
        .bind(id)
        .bind(lesson.instructor_id)
        .bind(lesson_time_id(lesson))
        .bind(&lesson.activity)
        .bind(&lesson.location)
        .bind(lesson.state.as_str())
        .bind(lesson.student_count)
        .bind(&lesson.gear)
        .bind(&lesson.objectives)
        .bind(lesson.duration)
        .bind(&lesson.ability_level)
        .bind(lesson.start_time)
        .bind(lesson.actual_start_time)
        .bind(lesson.actual_end_time)
        .bind(lesson.terms_accepted)
        .bind(lesson.deposit_status.as_str())
        .bind(Json(&lesson.students))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("lesson", id));
        }
        Ok(())
    }

    async fn find_or_create_lesson_time(&self, date: Date, slot: Slot) -> AppResult<LessonTime> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        sqlx::query_as::<_, LessonTimeRow>(
            "INSERT INTO lesson_times (date, slot) VALUES ($1, $2)
             ON CONFLICT (date, slot) DO UPDATE SET slot = EXCLUDED.slot
             RETURNING id, date, slot",
        )
        .bind(date)
        .bind(slot.token())
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_user(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT id, telegram_id, name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    async fn find_user_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT id, telegram_id, name FROM users WHERE telegram_id = $1")
                .bind(telegram_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_user(&self, telegram_id: i64, name: &str) -> AppResult<User> {
        Ok(sqlx::query_as::<_, User>(
            "INSERT INTO users (telegram_id, name) VALUES ($1, $2)
             ON CONFLICT (telegram_id) DO UPDATE SET name = $2
             RETURNING id, telegram_id, name",
        )
        .bind(telegram_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_instructor(&self, id: i32) -> AppResult<Instructor> {
        sqlx::query_as::<_, Instructor>("SELECT id, user_id, name, status FROM instructors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("instructor", id))
    }

    async fn instructor_for_user(&self, user_id: i32) -> AppResult<Option<Instructor>> {
        Ok(sqlx::query_as::<_, Instructor>(
            "SELECT id, user_id, name, status FROM instructors WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn eligible_instructors(&self, lesson: &Lesson) -> AppResult<Vec<Instructor>> {
        Ok(sqlx::query_as::<_, Instructor>(
            "SELECT DISTINCT i.id, i.user_id, i.name, i.status
             FROM instructors i
             JOIN instructors_resorts ir ON ir.instructor_id = i.id
             JOIN resorts r ON r.id = ir.resort_id
             WHERE i.status = $1
             AND r.name = $2
             AND NOT EXISTS (
                 SELECT 1 FROM lessons other
                 WHERE other.instructor_id = i.id
                 AND other.lesson_time_id = $3
                 AND other.state <> 'canceled'
                 AND other.id IS DISTINCT FROM $4
             )
             ORDER BY i.id",
        )
        .bind(Instructor::ACTIVE)
        .bind(&lesson.location)
        .bind(lesson_time_id(lesson))
        .bind(lesson.id)
        .fetch_all(&self.pool)
        .await?)
    }
}
