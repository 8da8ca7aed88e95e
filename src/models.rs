use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Time};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub telegram_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Instructor {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub status: String,
}

impl Instructor {
    pub const ACTIVE: &'static str = "Active";

    pub fn is_active(&self) -> bool {
        self.status == Self::ACTIVE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonState {
    New,
    Booked,
    PendingInstructor,
    WaitingForPayment,
    Confirmed,
    PendingRequester,
    Canceled,
}

impl LessonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonState::New => "new",
            LessonState::Booked => "booked",
            LessonState::PendingInstructor => "pending instructor",
            LessonState::WaitingForPayment => "waiting for payment",
            LessonState::Confirmed => "confirmed",
            LessonState::PendingRequester => "pending requester",
            LessonState::Canceled => "canceled",
        }
    }

    /// States in which the booking has to carry the full set of lesson details.
    pub fn requires_details(&self) -> bool {
        matches!(
            self,
            LessonState::Booked
                | LessonState::PendingInstructor
                | LessonState::Confirmed
                | LessonState::WaitingForPayment
        )
    }
}

impl fmt::Display for LessonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown value {0:?}")]
pub struct UnknownToken(pub String);

impl FromStr for LessonState {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(LessonState::New),
            "booked" => Ok(LessonState::Booked),
            "pending instructor" => Ok(LessonState::PendingInstructor),
            "waiting for payment" => Ok(LessonState::WaitingForPayment),
            "confirmed" => Ok(LessonState::Confirmed),
            "pending requester" => Ok(LessonState::PendingRequester),
            "canceled" => Ok(LessonState::Canceled),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepositStatus {
    #[default]
    Unconfirmed,
    Confirmed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Unconfirmed => "unconfirmed",
            DepositStatus::Confirmed => "confirmed",
        }
    }
}

impl FromStr for DepositStatus {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unconfirmed" => Ok(DepositStatus::Unconfirmed),
            "confirmed" => Ok(DepositStatus::Confirmed),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    EarlyBird,
    Morning,
    Afternoon,
    FullDay,
    Night,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::EarlyBird,
        Slot::Morning,
        Slot::Afternoon,
        Slot::FullDay,
        Slot::Night,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Slot::EarlyBird => "early_bird",
            Slot::Morning => "morning",
            Slot::Afternoon => "afternoon",
            Slot::FullDay => "full_day",
            Slot::Night => "night",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Slot::EarlyBird => "Early Bird (8-9am)",
            Slot::Morning => "Half-day Morning (9am-12pm)",
            Slot::Afternoon => "Half-day Afternoon (1-4pm)",
            Slot::FullDay => "Full Day (9am-4pm)",
            Slot::Night => "Night Session (5-8pm)",
        }
    }
}

impl FromStr for Slot {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Slot::ALL
            .into_iter()
            .find(|slot| slot.token() == s)
            .ok_or_else(|| UnknownToken(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonTime {
    pub id: i32,
    pub date: Date,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    #[serde(default)]
    pub age_range: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub relationship_to_requester: String,
    #[serde(default)]
    pub lesson_history: String,
    #[serde(default)]
    pub experience: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        FieldError {
            field,
            message: message.into(),
        }
    }

    fn blank(field: &'static str) -> Self {
        Self::new(field, "can't be blank")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field == "base" {
            return f.write_str(&self.message);
        }
        write!(f, "{} {}", self.field.replace('_', " "), self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    /// `None` until the lesson has been stored.
    pub id: Option<i32>,
    pub requester_id: i32,
    pub instructor_id: Option<i32>,
    pub lesson_time: Option<LessonTime>,
    pub activity: String,
    pub location: String,
    pub state: LessonState,
    pub student_count: Option<i32>,
    pub gear: Option<String>,
    pub objectives: Option<String>,
    pub duration: Option<f64>,
    pub ability_level: Option<String>,
    pub start_time: Option<Time>,
    pub actual_start_time: Option<Time>,
    pub actual_end_time: Option<Time>,
    pub terms_accepted: bool,
    pub deposit_status: DepositStatus,
    pub students: Vec<Student>,
}

impl Lesson {
    pub fn new(requester_id: i32) -> Self {
        Lesson {
            id: None,
            requester_id,
            instructor_id: None,
            lesson_time: None,
            activity: String::new(),
            location: String::new(),
            state: LessonState::New,
            student_count: None,
            gear: None,
            objectives: None,
            duration: None,
            ability_level: None,
            start_time: None,
            actual_start_time: None,
            actual_end_time: None,
            terms_accepted: false,
            deposit_status: DepositStatus::Unconfirmed,
            students: Vec::new(),
        }
    }

    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.activity.trim().is_empty() {
            errors.push(FieldError::blank("activity"));
        }
        if self.location.trim().is_empty() {
            errors.push(FieldError::blank("location"));
        }
        if self.lesson_time.is_none() {
            errors.push(FieldError::blank("lesson_time"));
        }

        if self.state.requires_details() {
            match self.student_count {
                Some(count) if count >= 1 => {
                    if self.students.len() > count as usize {
                        errors.push(FieldError::new(
                            "students",
                            format!("can't exceed the student count of {count}"),
                        ));
                    }
                }
                _ => errors.push(FieldError::new("student_count", "must be at least 1")),
            }
            if is_blank(&self.ability_level) {
                errors.push(FieldError::blank("ability_level"));
            }
            if !self.duration.is_some_and(|hours| hours > 0.0) {
                errors.push(FieldError::new("duration", "must be greater than 0"));
            }
            if !self.terms_accepted {
                errors.push(FieldError::new("terms_accepted", "must be accepted"));
            }
            if self.students.is_empty() {
                errors.push(FieldError::new("students", "must include at least one student"));
            } else if self.students.iter().any(|s| s.name.trim().is_empty()) {
                errors.push(FieldError::new("students", "each student needs a name"));
            }
        }

        if self.state == LessonState::WaitingForPayment {
            match (self.actual_start_time, self.actual_end_time) {
                (Some(start), Some(end)) if end <= start => {
                    errors.push(FieldError::new("actual_end_time", "must be after the start time"));
                }
                (start, end) => {
                    if start.is_none() {
                        errors.push(FieldError::blank("actual_start_time"));
                    }
                    if end.is_none() {
                        errors.push(FieldError::blank("actual_end_time"));
                    }
                }
            }
        }

        errors
    }

    /// Names of the booking details that differ from `original`.
    pub fn changed_attributes(&self, original: &Lesson) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut check = |name: &'static str, differs: bool| {
            if differs {
                changed.push(name);
            }
        };
        check("activity", self.activity != original.activity);
        check("location", self.location != original.location);
        check("student_count", self.student_count != original.student_count);
        check("gear", self.gear != original.gear);
        check("objectives", self.objectives != original.objectives);
        check("duration", self.duration != original.duration);
        check("ability_level", self.ability_level != original.ability_level);
        check("start_time", self.start_time != original.start_time);
        check("students", self.students != original.students);
        check(
            "lesson_time",
            self.lesson_time.as_ref().map(|t| t.id) != original.lesson_time.as_ref().map(|t| t.id),
        );
        changed
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
pub mod fixtures {
    use time::macros::{date, time};

    use super::*;

    pub fn lesson_time(id: i32) -> LessonTime {
        LessonTime {
            id,
            date: date!(2025 - 01 - 18),
            slot: Slot::Morning,
        }
    }

    /// A lesson carrying every detail a booked lesson needs.
    pub fn detailed_lesson(requester_id: i32) -> Lesson {
        Lesson {
            activity: "Ski".to_string(),
            location: "Squaw Valley".to_string(),
            lesson_time: Some(lesson_time(1)),
            student_count: Some(1),
            duration: Some(3.0),
            ability_level: Some("Beginner".to_string()),
            start_time: Some(time!(9:00)),
            terms_accepted: true,
            students: vec![Student {
                name: "Ada".to_string(),
                age_range: "11-17".to_string(),
                ..Student::default()
            }],
            ..Lesson::new(requester_id)
        }
    }
}
