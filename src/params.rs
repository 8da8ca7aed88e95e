//! Lesson form parameters.
//!
//! Forms arrive as chat messages made of `key: value` lines. Only the keys listed in
//! [`PERMITTED`] are read; everything else is dropped.

use log::debug;
use time::macros::format_description;
use time::{Date, Time};

use crate::models::{DepositStatus, FieldError, Lesson, LessonState, Slot, Student};

pub const PERMITTED: [&str; 16] = [
    "activity",
    "location",
    "state",
    "student_count",
    "gear",
    "objectives",
    "duration",
    "ability_level",
    "start_time",
    "actual_start_time",
    "actual_end_time",
    "terms_accepted",
    "deposit_status",
    "date",
    "slot",
    "student",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonParams {
    pub activity: Option<String>,
    pub location: Option<String>,
    pub state: Option<LessonState>,
    pub student_count: Option<i32>,
    pub gear: Option<String>,
    pub objectives: Option<String>,
    pub duration: Option<f64>,
    pub ability_level: Option<String>,
    pub start_time: Option<Time>,
    pub actual_start_time: Option<Time>,
    pub actual_end_time: Option<Time>,
    pub terms_accepted: Option<bool>,
    pub deposit_status: Option<DepositStatus>,
    pub students: Option<Vec<Student>>,
    pub date: Option<Date>,
    pub slot: Option<Slot>,
    /// Values that were present but could not be parsed.
    pub errors: Vec<FieldError>,
}

impl LessonParams {
    pub fn parse(text: &str) -> Self {
        let mut params = LessonParams::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            match PERMITTED.iter().copied().find(|permitted| *permitted == key) {
                Some(key) => params.set(key, value),
                None => debug!("dropping unpermitted lesson parameter {key:?}"),
            }
        }
        params
    }

    fn set(&mut self, key: &'static str, value: &str) {
        match key {
            "activity" => self.activity = text(value),
            "location" => self.location = text(value),
            "gear" => self.gear = text(value),
            "objectives" => self.objectives = text(value),
            "ability_level" => self.ability_level = text(value),
            "state" => self.state = self.parsed(key, value.parse()),
            "student_count" => self.student_count = self.parsed(key, value.parse()),
            "duration" => self.duration = self.parsed(key, value.parse()),
            "start_time" => self.start_time = self.parsed(key, parse_time(value)),
            "actual_start_time" => self.actual_start_time = self.parsed(key, parse_time(value)),
            "actual_end_time" => self.actual_end_time = self.parsed(key, parse_time(value)),
            "deposit_status" => self.deposit_status = self.parsed(key, value.parse()),
            "date" => self.date = self.parsed(key, parse_date(value)),
            "slot" => self.slot = self.parsed(key, value.parse()),
            "terms_accepted" => {
                self.terms_accepted = Some(matches!(
                    value.to_lowercase().as_str(),
                    "1" | "yes" | "true"
                ));
            }
            "student" => {
                if let Some(student) = parse_student(value) {
                    self.students.get_or_insert_with(Vec::new).push(student);
                } else {
                    self.errors.push(FieldError::new("students", "each student needs a name"));
                }
            }
            _ => {}
        }
    }

    fn parsed<T, E>(&mut self, key: &'static str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(_) => {
                self.errors.push(FieldError::new(key, "is invalid"));
                None
            }
        }
    }

    /// The (date, slot) pair a lesson time is resolved from.
    pub fn lesson_time(&self) -> Option<(Date, Slot)> {
        Some((self.date?, self.slot?))
    }

    /// Copies every supplied value onto `lesson`.
    pub fn assign_to(&self, lesson: &mut Lesson) {
        if let Some(activity) = &self.activity {
            lesson.activity = activity.clone();
        }
        if let Some(location) = &self.location {
            lesson.location = location.clone();
        }
        if let Some(state) = self.state {
            lesson.state = state;
        }
        if self.student_count.is_some() {
            lesson.student_count = self.student_count;
        }
        if self.gear.is_some() {
            lesson.gear = self.gear.clone();
        }
        if self.objectives.is_some() {
            lesson.objectives = self.objectives.clone();
        }
        if self.duration.is_some() {
            lesson.duration = self.duration;
        }
        if self.ability_level.is_some() {
            lesson.ability_level = self.ability_level.clone();
        }
        if self.start_time.is_some() {
            lesson.start_time = self.start_time;
        }
        if self.actual_start_time.is_some() {
            lesson.actual_start_time = self.actual_start_time;
        }
        if self.actual_end_time.is_some() {
            lesson.actual_end_time = self.actual_end_time;
        }
        if let Some(terms_accepted) = self.terms_accepted {
            lesson.terms_accepted = terms_accepted;
        }
        if let Some(deposit_status) = self.deposit_status {
            lesson.deposit_status = deposit_status;
        }
        if let Some(students) = &self.students {
            lesson.students = students.clone();
        }
    }
}

fn text(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_time(value: &str) -> Result<Time, time::error::Parse> {
    Time::parse(value, format_description!("[hour]:[minute]"))
}

fn parse_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
}

/// `name | age range | gender | relationship | history | experience`; only the name is required.
fn parse_student(value: &str) -> Option<Student> {
    let mut parts = value.split('|').map(|part| part.trim().to_string());
    let name = parts.next().filter(|name| !name.is_empty())?;
    let mut next = || parts.next().unwrap_or_default();
    Some(Student {
        name,
        age_range: next(),
        gender: next(),
        relationship_to_requester: next(),
        lesson_history: next(),
        experience: next(),
    })
}

#[cfg(test)]
mod tests {
    use time::macros::{date, time};

    use super::*;

    #[test]
    fn parses_permitted_keys() {
        let params = LessonParams::parse(
            "Activity: Ski\n\
             location: Squaw Valley\n\
             date: 2025-01-18\n\
             slot: morning\n\
             student_count: 2\n\
             duration: 2.5\n\
             start_time: 09:30\n\
             terms_accepted: yes\n\
             student: Ada | 11-17 | female | daughter | none | first time\n\
             student: Grace",
        );
        assert_eq!(params.activity.as_deref(), Some("Ski"));
        assert_eq!(params.location.as_deref(), Some("Squaw Valley"));
        assert_eq!(params.lesson_time(), Some((date!(2025 - 01 - 18), Slot::Morning)));
        assert_eq!(params.student_count, Some(2));
        assert_eq!(params.duration, Some(2.5));
        assert_eq!(params.start_time, Some(time!(9:30)));
        assert_eq!(params.terms_accepted, Some(true));
        let students = params.students.unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].relationship_to_requester, "daughter");
        assert_eq!(students[1].name, "Grace");
        assert!(params.errors.is_empty());
    }

    #[test]
    fn unpermitted_keys_are_dropped() {
        let params = LessonParams::parse("instructor_id: 4\nrequester_id: 9\nactivity: Snowboard");
        assert_eq!(
            params,
            LessonParams {
                activity: Some("Snowboard".to_string()),
                ..LessonParams::default()
            }
        );
    }

    #[test]
    fn terms_are_only_accepted_explicitly() {
        assert_eq!(LessonParams::parse("terms_accepted: 1").terms_accepted, Some(true));
        assert_eq!(LessonParams::parse("terms_accepted: sure").terms_accepted, Some(false));
        assert_eq!(LessonParams::parse("gear: none").terms_accepted, None);
    }

    #[test]
    fn bad_values_become_field_errors() {
        let params = LessonParams::parse("date: tomorrow\nslot: lunch\nstudent_count: two\nstudent: | 8-10");
        let fields: Vec<_> = params.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["date", "slot", "student_count", "students"]);
        assert_eq!(params.lesson_time(), None);
    }

    #[test]
    fn assign_only_touches_supplied_values() {
        let mut lesson = Lesson::new(1);
        lesson.gear = Some("Own skis".to_string());
        LessonParams::parse("activity: Ski\nactual_start_time: 10:00").assign_to(&mut lesson);
        assert_eq!(lesson.activity, "Ski");
        assert_eq!(lesson.gear.as_deref(), Some("Own skis"));
        assert_eq!(lesson.actual_start_time, Some(time!(10:00)));
    }
}
