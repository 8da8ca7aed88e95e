use crate::models::{Instructor, Lesson, User};

pub const ACCESS_DENIED: &str = "You do not have access to this page.";

/// A lesson is visible to its requester and to every active instructor.
pub fn can_view(user: Option<&User>, instructor: Option<&Instructor>, lesson: &Lesson) -> bool {
    let Some(user) = user else {
        return false;
    };
    if user.id == lesson.requester_id {
        return true;
    }
    instructor.is_some_and(|i| i.user_id == user.id && i.is_active())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::detailed_lesson;

    fn user(id: i32) -> User {
        User {
            id,
            telegram_id: 1000 + i64::from(id),
            name: format!("user {id}"),
        }
    }

    fn instructor(user_id: i32, status: &str) -> Instructor {
        Instructor {
            id: 50 + user_id,
            user_id,
            name: "Lindsey".to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn requester_can_view_own_lesson() {
        let lesson = detailed_lesson(1);
        assert!(can_view(Some(&user(1)), None, &lesson));
        assert!(!can_view(Some(&user(2)), None, &lesson));
    }

    #[test]
    fn any_active_instructor_can_view() {
        let lesson = detailed_lesson(1);
        assert!(can_view(Some(&user(2)), Some(&instructor(2, "Active")), &lesson));
        assert!(!can_view(Some(&user(2)), Some(&instructor(2, "Pending")), &lesson));
        assert!(!can_view(Some(&user(2)), Some(&instructor(2, "active")), &lesson));
    }

    #[test]
    fn anonymous_access_is_denied() {
        let lesson = detailed_lesson(1);
        assert!(!can_view(None, Some(&instructor(2, "Active")), &lesson));
    }
}
