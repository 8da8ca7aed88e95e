//! Lesson state transitions.
//!
//! Every function here is pure: callers hand in what they know about the lesson and
//! get back the state it should move to. Persisting the result and firing notices is
//! the controller's job.

use crate::models::{DepositStatus, LessonState};

pub const FIX_FIELDS_NOTICE: &str = "Your lesson deposit has been recorded, but your lesson \
     reservation is incomplete. Please fix the fields below and resubmit.";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("This lesson has been canceled.")]
    Canceled,
    #[error("Only instructors can take on a lesson.")]
    NoActingInstructor,
}

pub fn on_create() -> LessonState {
    LessonState::New
}

/// Canceled lessons are terminal; nothing moves them again.
pub fn ensure_open(current: LessonState) -> Result<(), TransitionError> {
    if current == LessonState::Canceled {
        Err(TransitionError::Canceled)
    } else {
        Ok(())
    }
}

pub fn on_instructor_assigned(
    current: LessonState,
    acting_instructor: Option<i32>,
) -> Result<(i32, LessonState), TransitionError> {
    ensure_open(current)?;
    let instructor_id = acting_instructor.ok_or(TransitionError::NoActingInstructor)?;
    Ok((instructor_id, LessonState::Confirmed))
}

/// Shared by an explicit removal and by an update that leaves the assigned instructor
/// ineligible.
pub fn after_instructor_removed(any_available: bool) -> LessonState {
    if any_available {
        LessonState::New
    } else {
        LessonState::PendingRequester
    }
}

pub fn on_payment_requested(lesson_is_valid: bool) -> LessonState {
    if lesson_is_valid {
        LessonState::WaitingForPayment
    } else {
        LessonState::Confirmed
    }
}

pub fn on_cancel() -> LessonState {
    LessonState::Canceled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// The update validated and is saved with the requested state.
    Accept(LessonState),
    /// The update is kept but forced into a fallback state.
    Fallback {
        state: LessonState,
        deposit_recorded: bool,
    },
    /// Nothing is saved; the lesson keeps its pre-update state.
    Reject,
}

/// Precedence, first match wins:
/// 1. terms not explicitly accepted -> `new`
/// 2. valid -> the requested state
/// 3. deposit confirmed -> `booked`, with the fix-the-fields notice
/// 4. otherwise rejected
pub fn decide_update(
    requested: LessonState,
    terms_accepted: Option<bool>,
    deposit_status: DepositStatus,
    valid: bool,
) -> UpdateDecision {
    if terms_accepted != Some(true) {
        return UpdateDecision::Fallback {
            state: LessonState::New,
            deposit_recorded: false,
        };
    }
    if valid {
        return UpdateDecision::Accept(requested);
    }
    if deposit_status == DepositStatus::Confirmed {
        return UpdateDecision::Fallback {
            state: LessonState::Booked,
            deposit_recorded: true,
        };
    }
    UpdateDecision::Reject
}

/// The state the edit form submits back.
pub fn edit_form_state(has_instructor: bool) -> LessonState {
    if has_instructor {
        LessonState::PendingInstructor
    } else {
        LessonState::Booked
    }
}
