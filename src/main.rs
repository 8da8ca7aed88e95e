use std::{collections::HashMap, sync::Arc};

use config::Config;
use db::get_db_pool;
use drafts::DraftStore;
use handlers::{handle_callback_query, handle_message, report_failure, UserSession};
use lessons::LessonsController;
use notify::telegram::TelegramNotifier;
use store::postgres::PgLessonStore;
use store::LessonStore;
use teloxide::{
    dispatching::UpdateFilterExt,
    prelude::*,
    types::{CallbackQuery, MaybeInaccessibleMessage},
};
use tokio::sync::Mutex;

mod access;
mod config;
mod db;
mod drafts;
mod error;
mod handlers;
mod lessons;
mod models;
mod notify;
mod params;
mod state;
mod store;
mod views;

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    if let Err(e) = run().await {
        error!("lesson bot stopped: {e}");
        std::process::exit(1);
    }
}

async fn run() -> error::AppResult<()> {
    let config = Config::from_env()?;
    let pool = get_db_pool(&config).await?;
    let bot = Bot::from_env();

    let store: Arc<dyn LessonStore> = Arc::new(PgLessonStore::new(pool));
    let notifier = Arc::new(TelegramNotifier::new(
        bot.clone(),
        store.clone(),
        config.support_contact.clone(),
    ));
    let controller = Arc::new(LessonsController::new(
        store,
        notifier,
        DraftStore::new(config.draft_ttl),
        config.support_contact.clone(),
    ));
    let user_sessions = Arc::new(Mutex::new(HashMap::<i64, UserSession>::new()));
    info!("lesson bot starting");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let controller = controller.clone();
            let user_sessions = user_sessions.clone();

            move |bot: Bot, msg: Message| {
                let controller = controller.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let chat_id = msg.chat.id;
                    let mut sessions = user_sessions.lock().await;
                    if let Err(e) = handle_message(bot.clone(), msg, &controller, &mut sessions).await {
                        error!("message handler failed for chat {}: {e}", chat_id.0);
                        report_failure(&bot, chat_id, &e).await;
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let controller = controller.clone();
            let user_sessions = user_sessions.clone();

            move |q: CallbackQuery, bot: Bot| {
                let controller = controller.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let message = q
                        .message
                        .as_ref()
                        .and_then(MaybeInaccessibleMessage::regular_message)
                        .cloned();
                    if let Some(message) = message {
                        let chat_id = message.chat.id;
                        let mut sessions = user_sessions.lock().await;
                        if let Err(e) =
                            handle_callback_query(q, bot.clone(), message, &controller, &mut sessions).await
                        {
                            error!("callback handler failed for chat {}: {e}", chat_id.0);
                            report_failure(&bot, chat_id, &e).await;
                        }
                    }
                    respond(())
                }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}
