use std::collections::HashMap;

use log::{info, warn};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message, ParseMode, ReplyMarkup};

use crate::error::{AppError, AppResult};
use crate::lessons::{Action, Flash, LessonsController, Outcome, Target, View};
use crate::models::LessonState;
use crate::params::LessonParams;
use crate::views::{self, BOOK_LESSON, MY_LESSONS};

const CONFIRM_TIME_PROMPT: &str = "🕘 Reply with the actual lesson time:\n\n\
     actual\\_start\\_time: 09:00\n\
     actual\\_end\\_time: 12:00";

pub struct UserSession {
    step: UserStep,
}

impl UserSession {
    pub fn new() -> Self {
        UserSession {
            step: UserStep::Idle,
        }
    }
}

/// What the chat's next free-text message is read as.
#[derive(Debug, Clone, Copy, PartialEq)]
enum UserStep {
    Idle,
    Registration,
    AwaitingForm(FormKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FormKind {
    Create,
    Update { id: i32, state: LessonState },
    ConfirmTime { id: i32 },
}

impl FormKind {
    fn into_action(self, mut params: LessonParams) -> Action {
        match self {
            FormKind::Create => Action::Create(params),
            FormKind::Update { id, state } => {
                // the form decides the next state, not the typed text
                params.state = Some(state);
                Action::Update(id, params)
            }
            FormKind::ConfirmTime { id } => Action::ConfirmLessonTime(id, params),
        }
    }
}

/// Splits `action:id` callback data.
fn parse_callback(data: &str) -> Option<(&str, i32)> {
    let (name, id) = data.split_once(':')?;
    Some((name, id.parse().ok()?))
}

fn callback_action(name: &str, id: i32) -> Option<Action> {
    match name {
        "show" | "confirm_time" => Some(Action::Show(id)),
        "complete" => Some(Action::Complete(id)),
        "edit" => Some(Action::Edit(id)),
        "cancel" => Some(Action::Destroy(id)),
        "claim" => Some(Action::SetInstructor(id)),
        "decline" => Some(Action::RemoveInstructor(id)),
        _ => None,
    }
}

/// The step a rendered view leaves the chat in.
fn step_after(view: &View, lesson_id: Option<i32>) -> UserStep {
    match (view, lesson_id) {
        (View::New, _) => UserStep::AwaitingForm(FormKind::Create),
        (View::Complete { form_state } | View::Edit { form_state }, Some(id)) => {
            UserStep::AwaitingForm(FormKind::Update {
                id,
                state: *form_state,
            })
        }
        _ => UserStep::Idle,
    }
}

/// Tells the chat a request failed after the error has been logged.
pub async fn report_failure(bot: &Bot, chat_id: ChatId, e: &AppError) {
    let text = match e {
        AppError::NotFound { entity, .. } => format!("Sorry, that {entity} does not exist."),
        _ => "Something went wrong, please try again later.".to_string(),
    };
    if let Err(send_error) = bot.send_message(chat_id, text).await {
        warn!("could not report failure to chat {}: {send_error}", chat_id.0);
    }
}

async fn show_main_menu(bot: &Bot, chat_id: ChatId, text: String) -> AppResult<()> {
    bot.send_message(chat_id, text)
        .reply_markup(ReplyMarkup::Keyboard(views::main_menu()))
        .await?;
    Ok(())
}

/// Sends an outcome to the chat, following redirects until a view is rendered.
async fn present(
    bot: &Bot,
    chat_id: ChatId,
    controller: &LessonsController,
    session: &mut UserSession,
    mut outcome: Outcome,
) -> AppResult<()> {
    let mut carried: Vec<Flash> = Vec::new();
    loop {
        match outcome {
            Outcome::Redirect { to, flash } => {
                carried.extend(flash);
                let lead = carried
                    .iter()
                    .map(views::flash_text)
                    .collect::<Vec<_>>()
                    .join("\n");
                outcome = match to {
                    Target::Root => {
                        session.step = UserStep::Idle;
                        let text = if lead.is_empty() {
                            "What would you like to do?".to_string()
                        } else {
                            lead
                        };
                        return show_main_menu(bot, chat_id, text).await;
                    }
                    Target::SignUp => {
                        session.step = UserStep::Registration;
                        let prompt = format!("{lead}\n\nPlease tell me your name:");
                        bot.send_message(chat_id, prompt.trim_start()).await?;
                        return Ok(());
                    }
                    Target::Lesson(id) => controller.dispatch(chat_id.0, Action::Show(id)).await?,
                    Target::Complete(id) => controller.dispatch(chat_id.0, Action::Complete(id)).await?,
                };
            }
            Outcome::Render {
                view,
                lesson,
                errors,
                flash,
            } => {
                let viewer = controller.identify(chat_id.0).await?;
                carried.extend(flash);
                let (last, earlier) = match carried.split_last() {
                    Some((last, earlier)) => (Some(last), earlier),
                    None => (None, &carried[..]),
                };
                let screen = views::render(&view, lesson.as_ref(), &errors, last, viewer.as_ref());
                let mut text = String::new();
                for flash in earlier {
                    text.push_str(&views::flash_markdown(flash));
                    text.push('\n');
                }
                text.push_str(&screen.text);

                let request = bot.send_message(chat_id, text).parse_mode(ParseMode::Markdown);
                match screen.keyboard {
                    Some(keyboard) => {
                        request
                            .reply_markup(ReplyMarkup::InlineKeyboard(keyboard))
                            .await?
                    }
                    None => request.await?,
                };
                session.step = step_after(&view, lesson.as_ref().and_then(|l| l.id));
                return Ok(());
            }
        }
    }
}

pub async fn handle_message(
    bot: Bot,
    msg: Message,
    controller: &LessonsController,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> AppResult<()> {
    let chat_id = msg.chat.id;
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    match text {
        "/start" => {
            if let Some(identity) = controller.identify(chat_id.0).await? {
                session.step = UserStep::Idle;
                show_main_menu(&bot, chat_id, format!("Welcome back, {}!", identity.user.name)).await?;
            } else {
                session.step = UserStep::Registration;
                let text = if controller.has_draft(chat_id.0).await {
                    "Your lesson request is saved. Tell me your name to finish booking it:"
                } else {
                    "Hi! I book ski and snowboard lessons. What is your name?"
                };
                bot.send_message(chat_id, text).await?;
            }
        }
        "/lessons" | MY_LESSONS => {
            let outcome = controller.dispatch(chat_id.0, Action::Index).await?;
            present(&bot, chat_id, controller, session, outcome).await?;
        }
        "/new" | BOOK_LESSON => {
            let outcome = controller.dispatch(chat_id.0, Action::New).await?;
            present(&bot, chat_id, controller, session, outcome).await?;
        }
        command if command.starts_with("/lesson_") => {
            match command["/lesson_".len()..].parse::<i32>() {
                Ok(id) => {
                    let outcome = controller.dispatch(chat_id.0, Action::Show(id)).await?;
                    present(&bot, chat_id, controller, session, outcome).await?;
                }
                Err(_) => {
                    bot.send_message(chat_id, "Unknown lesson").await?;
                }
            }
        }
        _ => match session.step {
            UserStep::Registration => {
                let name = text.trim();
                if name.chars().count() < 2 {
                    bot.send_message(chat_id, "Your name needs at least 2 characters. Please try again:")
                        .await?;
                    return Ok(());
                }
                session.step = UserStep::Idle;
                let outcome = controller.sign_up(chat_id.0, name).await?;
                present(&bot, chat_id, controller, session, outcome).await?;
            }
            UserStep::AwaitingForm(kind) => {
                let action = kind.into_action(LessonParams::parse(text));
                let outcome = controller.dispatch(chat_id.0, action).await?;
                let failed_confirmation = matches!(
                    (kind, &outcome),
                    (FormKind::ConfirmTime { .. }, Outcome::Render { errors, .. }) if !errors.is_empty()
                );
                present(&bot, chat_id, controller, session, outcome).await?;
                if failed_confirmation {
                    session.step = UserStep::AwaitingForm(kind);
                }
            }
            UserStep::Idle => {
                show_main_menu(&bot, chat_id, "Unknown command".to_string()).await?;
            }
        },
    }

    Ok(())
}

pub async fn handle_callback_query(
    q: CallbackQuery,
    bot: Bot,
    msg: Message,
    controller: &LessonsController,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> AppResult<()> {
    let chat_id = msg.chat.id;
    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    let parsed = q
        .data
        .as_deref()
        .and_then(parse_callback)
        .and_then(|(name, id)| Some((name, id, callback_action(name, id)?)));
    let Some((name, id, action)) = parsed else {
        warn!("unknown callback data {:?} from chat {}", q.data, chat_id.0);
        bot.answer_callback_query(q.id).text("Unknown action").await?;
        return Ok(());
    };
    bot.answer_callback_query(q.id).await?;
    info!("chat {} pressed {name}:{id}", chat_id.0);

    let outcome = controller.dispatch(chat_id.0, action).await?;
    let shown = matches!(outcome, Outcome::Render { view: View::Show, .. });
    present(&bot, chat_id, controller, session, outcome).await?;

    if name == "confirm_time" && shown {
        session.step = UserStep::AwaitingForm(FormKind::ConfirmTime { id });
        bot.send_message(chat_id, CONFIRM_TIME_PROMPT)
            .parse_mode(ParseMode::Markdown)
            .await?;
    }
    Ok(())
}
