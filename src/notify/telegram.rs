use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use super::LessonNotifier;
use crate::error::{AppError, AppResult};
use crate::models::{Instructor, Lesson};
use crate::store::LessonStore;
use crate::views::{escape, lesson_summary};

/// Delivers lesson notices as bot messages to the recipient's chat.
pub struct TelegramNotifier {
    bot: Bot,
    store: Arc<dyn LessonStore>,
    support_contact: String,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, store: Arc<dyn LessonStore>, support_contact: String) -> Self {
        TelegramNotifier {
            bot,
            store,
            support_contact,
        }
    }

    async fn send_to_user(&self, user_id: i32, text: String) -> AppResult<()> {
        let user = self.store.find_user(user_id).await?;
        self.bot
            .send_message(ChatId(user.telegram_id), text)
            .parse_mode(ParseMode::Markdown)
            .await?;
        Ok(())
    }

    fn open_command(lesson: &Lesson) -> String {
        format!("Open it with /lesson\\_{}", lesson.id.unwrap_or_default())
    }
}

#[async_trait]
impl LessonNotifier for TelegramNotifier {
    async fn send_lesson_confirmation(&self, lesson: &Lesson) -> AppResult<()> {
        let instructor = match lesson.instructor_id {
            Some(id) => self.store.find_instructor(id).await?.name,
            None => "An instructor".to_string(),
        };
        let text = format!(
            "🎉 *Your lesson is confirmed!*\n\n{} will teach your lesson.\n\n{}",
            escape(&instructor),
            lesson_summary(lesson)
        );
        self.send_to_user(lesson.requester_id, text).await
    }

    async fn send_lesson_request_to_instructors(
        &self,
        lesson: &Lesson,
        instructors: &[Instructor],
    ) -> AppResult<()> {
        let text = format!(
            "🆕 *A lesson is looking for an instructor*\n\n{}\n\n{}",
            lesson_summary(lesson),
            Self::open_command(lesson)
        );
        let mut failed = Vec::new();
        for instructor in instructors {
            if let Err(e) = self.send_to_user(instructor.user_id, text.clone()).await {
                warn!("lesson request to instructor {} failed: {e}", instructor.id);
                failed.push(instructor.id.to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(AppError::Undeliverable(format!(
                "lesson request to instructors {}",
                failed.join(", ")
            )))
        }
    }

    async fn inform_requester_of_instructor_cancellation(
        &self,
        lesson: &Lesson,
        instructors_available: bool,
    ) -> AppResult<()> {
        let next = if instructors_available {
            "We have asked the other instructors available at that time to take it.".to_string()
        } else {
            format!(
                "No other instructor is available at that time. Please pick another time or \
                 contact {}.",
                escape(&self.support_contact)
            )
        };
        let text = format!(
            "😔 *Your instructor can no longer teach this lesson*\n\n{next}\n\n{}",
            lesson_summary(lesson)
        );
        self.send_to_user(lesson.requester_id, text).await
    }

    async fn send_cancellation_confirmation(
        &self,
        lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()> {
        let text = format!(
            "↩️ You have been removed from lesson #{}.",
            lesson.id.unwrap_or_default()
        );
        self.send_to_user(instructor.user_id, text).await
    }

    async fn send_cancellation_to_instructor(
        &self,
        lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()> {
        let text = format!(
            "❌ *A lesson you were teaching has been canceled*\n\n{}",
            lesson_summary(lesson)
        );
        self.send_to_user(instructor.user_id, text).await
    }

    async fn send_payment_instructions(&self, lesson: &Lesson) -> AppResult<()> {
        let text = format!(
            "💳 *Your lesson is ready for payment*\n\n{}\n\nPlease contact {} to settle the \
             balance.",
            lesson_summary(lesson),
            escape(&self.support_contact)
        );
        self.send_to_user(lesson.requester_id, text).await
    }

    async fn send_lesson_update_to_instructor(
        &self,
        _original: &Lesson,
        updated: &Lesson,
        instructor: &Instructor,
        changed: &[&'static str],
    ) -> AppResult<()> {
        let changed: Vec<String> = changed.iter().map(|name| name.replace('_', " ")).collect();
        let text = format!(
            "✏️ *A lesson you teach was updated*\n\nChanged: {}\n\n{}",
            changed.join(", "),
            lesson_summary(updated)
        );
        self.send_to_user(instructor.user_id, text).await
    }
}
