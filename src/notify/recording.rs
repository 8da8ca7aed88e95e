use std::sync::Mutex;

use async_trait::async_trait;

use super::LessonNotifier;
use crate::error::{AppError, AppResult};
use crate::models::{Instructor, Lesson};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Confirmation { requester_id: i32 },
    LessonRequest { instructor_ids: Vec<i32> },
    InstructorCancellation { available: bool },
    CancellationConfirmation { instructor_id: i32 },
    CancellationToInstructor { instructor_id: i32 },
    PaymentInstructions { requester_id: i32 },
    LessonUpdate { instructor_id: i32, changed: Vec<&'static str> },
}

/// Remembers every notice it is asked to send. A failing recorder still records the
/// attempt, then reports the send as failed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        RecordingNotifier {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, sent: Sent) -> AppResult<()> {
        self.sent.lock().unwrap().push(sent);
        if self.fail {
            Err(AppError::Undeliverable("recorder set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LessonNotifier for RecordingNotifier {
    async fn send_lesson_confirmation(&self, lesson: &Lesson) -> AppResult<()> {
        self.record(Sent::Confirmation {
            requester_id: lesson.requester_id,
        })
    }

    async fn send_lesson_request_to_instructors(
        &self,
        _lesson: &Lesson,
        instructors: &[Instructor],
    ) -> AppResult<()> {
        self.record(Sent::LessonRequest {
            instructor_ids: instructors.iter().map(|i| i.id).collect(),
        })
    }

    async fn inform_requester_of_instructor_cancellation(
        &self,
        _lesson: &Lesson,
        instructors_available: bool,
    ) -> AppResult<()> {
        self.record(Sent::InstructorCancellation {
            available: instructors_available,
        })
    }

    async fn send_cancellation_confirmation(
        &self,
        _lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()> {
        self.record(Sent::CancellationConfirmation {
            instructor_id: instructor.id,
        })
    }

    async fn send_cancellation_to_instructor(
        &self,
        _lesson: &Lesson,
        instructor: &Instructor,
    ) -> AppResult<()> {
        self.record(Sent::CancellationToInstructor {
            instructor_id: instructor.id,
        })
    }

    async fn send_payment_instructions(&self, lesson: &Lesson) -> AppResult<()> {
        self.record(Sent::PaymentInstructions {
            requester_id: lesson.requester_id,
        })
    }

    async fn send_lesson_update_to_instructor(
        &self,
        _original: &Lesson,
        _updated: &Lesson,
        instructor: &Instructor,
        changed: &[&'static str],
    ) -> AppResult<()> {
        self.record(Sent::LessonUpdate {
            instructor_id: instructor.id,
            changed: changed.to_vec(),
        })
    }
}
