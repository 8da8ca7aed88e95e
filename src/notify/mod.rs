//! Which notices go out on which transition.
//!
//! Callers only reach these functions after the transition has been stored. Delivery
//! is best-effort: a failed send is logged and the transition stands.

#[cfg(test)]
pub mod recording;
pub mod telegram;

use async_trait::async_trait;
use log::{error, info};

use crate::error::AppResult;
use crate::models::{Instructor, Lesson};

#[async_trait]
pub trait LessonNotifier: Send + Sync {
    async fn send_lesson_confirmation(&self, lesson: &Lesson) -> AppResult<()>;

    async fn send_lesson_request_to_instructors(
        &self,
        lesson: &Lesson,
        instructors: &[Instructor],
    ) -> AppResult<()>;

    async fn inform_requester_of_instructor_cancellation(
        &self,
        lesson: &Lesson,
        instructors_available: bool,
    ) -> AppResult<()>;

    async fn send_cancellation_confirmation(
        &self,
        lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()>;

    async fn send_cancellation_to_instructor(
        &self,
        lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()>;

    async fn send_payment_instructions(&self, lesson: &Lesson) -> AppResult<()>;

    async fn send_lesson_update_to_instructor(
        &self,
        original: &Lesson,
        updated: &Lesson,
        instructor: &Instructor,
        changed: &[&'static str],
    ) -> AppResult<()>;
}

fn deliver(kind: &str, lesson: &Lesson, result: AppResult<()>) {
    let id = lesson.id.unwrap_or_default();
    match result {
        Ok(()) => info!("sent {kind} notice for lesson {id}"),
        Err(e) => error!("failed to send {kind} notice for lesson {id}: {e}"),
    }
}

/// The instructor claimed the lesson themselves, so only the requester hears about it.
pub async fn instructor_assigned(notifier: &dyn LessonNotifier, lesson: &Lesson) {
    deliver(
        "lesson confirmation",
        lesson,
        notifier.send_lesson_confirmation(lesson).await,
    );
}

pub async fn instructor_removed(
    notifier: &dyn LessonNotifier,
    lesson: &Lesson,
    removed: &Instructor,
    remaining: &[Instructor],
) {
    if !remaining.is_empty() {
        deliver(
            "lesson request",
            lesson,
            notifier
                .send_lesson_request_to_instructors(lesson, remaining)
                .await,
        );
    }
    deliver(
        "instructor cancellation",
        lesson,
        notifier
            .inform_requester_of_instructor_cancellation(lesson, !remaining.is_empty())
            .await,
    );
    deliver(
        "cancellation confirmation",
        lesson,
        notifier.send_cancellation_confirmation(lesson, removed).await,
    );
}

pub async fn lesson_canceled(
    notifier: &dyn LessonNotifier,
    lesson: &Lesson,
    instructor: Option<&Instructor>,
) {
    if let Some(instructor) = instructor {
        deliver(
            "lesson cancellation",
            lesson,
            notifier.send_cancellation_to_instructor(lesson, instructor).await,
        );
    }
}

pub async fn payment_requested(notifier: &dyn LessonNotifier, lesson: &Lesson) {
    deliver(
        "payment instructions",
        lesson,
        notifier.send_payment_instructions(lesson).await,
    );
}

pub async fn lesson_updated(
    notifier: &dyn LessonNotifier,
    original: &Lesson,
    updated: &Lesson,
    instructor: &Instructor,
    changed: &[&'static str],
) {
    if changed.is_empty() {
        return;
    }
    deliver(
        "lesson update",
        updated,
        notifier
            .send_lesson_update_to_instructor(original, updated, instructor, changed)
            .await,
    );
}
