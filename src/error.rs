use teloxide::RequestError;

use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("telegram error: {0}")]
    Telegram(#[from] RequestError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("could not deliver notice: {0}")]
    Undeliverable(String),
    #[error("corrupt {column} value in database: {value}")]
    CorruptColumn { column: &'static str, value: String },
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i32) -> Self {
        AppError::NotFound { entity, id }
    }
}

pub type AppResult<T> = Result<T, AppError>;
