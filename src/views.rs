//! Chat rendering for controller outcomes.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use time::macros::format_description;
use time::{Date, Time};

use crate::lessons::{Flash, Identity, View};
use crate::models::{FieldError, Lesson, LessonState, LessonTime, Slot};

pub const MY_LESSONS: &str = "My lessons";
pub const BOOK_LESSON: &str = "Book a lesson";

pub struct Screen {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BOOK_LESSON)],
        vec![KeyboardButton::new(MY_LESSONS)],
    ])
    .resize_keyboard()
}

/// Escapes user-supplied text for legacy Markdown.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[day].[month].[year]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn format_time(time: Time) -> String {
    time.format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| time.to_string())
}

pub fn lesson_time_label(lesson_time: &LessonTime) -> String {
    format!("{}, {}", format_date(lesson_time.date), lesson_time.slot.label())
}

pub fn lesson_title(lesson: &Lesson) -> String {
    let when = lesson
        .lesson_time
        .as_ref()
        .map_or_else(|| "no date".to_string(), |t| format_date(t.date));
    format!("#{} {} at {}, {}", lesson.id.unwrap_or_default(), lesson.activity, lesson.location, when)
}

pub fn lesson_summary(lesson: &Lesson) -> String {
    let mut text = format!(
        "🎿 *Lesson #{}*: {}\n📍 *Where:* {}\n",
        lesson.id.unwrap_or_default(),
        escape(&lesson.activity),
        escape(&lesson.location),
    );
    if let Some(lesson_time) = &lesson.lesson_time {
        text.push_str(&format!("📅 *When:* {}\n", lesson_time_label(lesson_time)));
    }
    if let Some(start) = lesson.start_time {
        text.push_str(&format!("⏰ *Start:* {}\n", format_time(start)));
    }
    if let Some(duration) = lesson.duration {
        text.push_str(&format!("⏳ *Duration:* {duration} h\n"));
    }
    if let Some(count) = lesson.student_count {
        text.push_str(&format!("👥 *Students:* {count}\n"));
    }
    for student in &lesson.students {
        text.push_str(&format!("  • {}", escape(&student.name)));
        if !student.age_range.is_empty() {
            text.push_str(&format!(" ({})", escape(&student.age_range)));
        }
        text.push('\n');
    }
    for (label, value) in [
        ("Level", &lesson.ability_level),
        ("Gear", &lesson.gear),
        ("Objectives", &lesson.objectives),
    ] {
        if let Some(value) = value {
            text.push_str(&format!("*{label}:* {}\n", escape(value)));
        }
    }
    if let (Some(start), Some(end)) = (lesson.actual_start_time, lesson.actual_end_time) {
        text.push_str(&format!("🕘 *Actual time:* {}-{}\n", format_time(start), format_time(end)));
    }
    text.push_str(&format!("📌 *Status:* {}", lesson.state));
    text
}

/// A flash as plain text, for messages sent without a parse mode.
pub fn flash_text(flash: &Flash) -> String {
    match flash {
        Flash::Notice(notice) => format!("✅ {notice}"),
        Flash::Alert(alert) => format!("⚠️ {alert}"),
    }
}

/// A flash for Markdown messages. Notices carry user text such as the support contact.
pub fn flash_markdown(flash: &Flash) -> String {
    escape(&flash_text(flash))
}

fn flash_line(flash: &Flash) -> String {
    format!("{}\n\n", flash_markdown(flash))
}

pub fn render(
    view: &View,
    lesson: Option<&Lesson>,
    errors: &[FieldError],
    flash: Option<&Flash>,
    viewer: Option<&Identity>,
) -> Screen {
    let mut text = flash.map(flash_line).unwrap_or_default();
    if !errors.is_empty() {
        text.push_str("❌ Please fix the following:\n");
        for error in errors {
            text.push_str(&format!("  • {}\n", escape(&error.to_string())));
        }
        text.push('\n');
    }

    let keyboard = match view {
        View::Index(lessons) => {
            if lessons.is_empty() {
                text.push_str("There are no lessons yet.");
                None
            } else {
                text.push_str("📋 *Lessons*");
                Some(InlineKeyboardMarkup::new(lessons.iter().filter_map(|lesson| {
                    let id = lesson.id?;
                    Some(vec![InlineKeyboardButton::callback(lesson_title(lesson), format!("show:{id}"))])
                })))
            }
        }
        View::New => {
            text.push_str(&new_form());
            None
        }
        View::Complete { form_state } | View::Edit { form_state } => {
            if let Some(lesson) = lesson {
                text.push_str(&details_form(lesson, *form_state));
            }
            None
        }
        View::Show => lesson.and_then(|lesson| {
            text.push_str(&lesson_summary(lesson));
            lesson_keyboard(lesson, viewer)
        }),
    };

    Screen { text, keyboard }
}

fn new_form() -> String {
    let slots: Vec<&str> = Slot::ALL.iter().map(|slot| slot.token()).collect();
    format!(
        "📝 *Book a lesson*\n\
         Reply with one detail per line:\n\n\
         activity: Ski\n\
         location: Squaw Valley\n\
         date: 2025-01-18\n\
         slot: morning\n\n\
         Slots: {}",
        escape(&slots.join(", "))
    )
}

fn details_form(lesson: &Lesson, form_state: LessonState) -> String {
    let mut text = lesson_summary(lesson);
    text.push_str(&format!(
        "\n\n📝 Reply with the details to submit this lesson as *{form_state}*, one per line:\n\n"
    ));
    text.push_str(&escape(
        "student_count: 1\n\
         student: name | age range | gender | relationship | lesson history | experience\n\
         ability_level: Beginner\n\
         duration: 3\n\
         start_time: 09:00\n\
         gear: Rental\n\
         objectives: Link turns\n\
         terms_accepted: yes",
    ));
    text
}

fn lesson_keyboard(lesson: &Lesson, viewer: Option<&Identity>) -> Option<InlineKeyboardMarkup> {
    let (viewer, id) = (viewer?, lesson.id?);
    if lesson.state == LessonState::Canceled {
        return None;
    }

    let mut rows = Vec::new();
    if viewer.user.id == lesson.requester_id {
        rows.push(vec![
            InlineKeyboardButton::callback("✏️ Edit", format!("edit:{id}")),
            InlineKeyboardButton::callback("❌ Cancel lesson", format!("cancel:{id}")),
        ]);
    }
    if let Some(instructor) = viewer.instructor.as_ref().filter(|i| i.is_active()) {
        match lesson.instructor_id {
            None => rows.push(vec![InlineKeyboardButton::callback(
                "🙋 Take this lesson",
                format!("claim:{id}"),
            )]),
            Some(assigned) if assigned == instructor.id => rows.push(vec![
                InlineKeyboardButton::callback("🕘 Confirm lesson time", format!("confirm_time:{id}")),
                InlineKeyboardButton::callback("↩️ Decline", format!("decline:{id}")),
            ]),
            Some(_) => {}
        }
    }

    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}
