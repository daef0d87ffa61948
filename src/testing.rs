use chrono::{Duration, Utc};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::entities::question;
use crate::polls::store;

/// Fresh in-memory SQLite database with the schema applied. A single pooled
/// connection keeps every query on the same in-memory file.
pub async fn database() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let database = Database::connect(options)
        .await
        .expect("in-memory sqlite connects");
    migration::Migrator::up(&database, None)
        .await
        .expect("migrations apply");
    database
}

/// Question published `days` from now (negative for the past), optionally
/// ending `end_days` after publication.
pub async fn question_offset(
    db: &DatabaseConnection,
    question_text: &str,
    days: i64,
    end_days: Option<i64>,
) -> question::Model {
    let pub_date = Utc::now() + Duration::days(days);
    let end_date = end_days.map(|end| pub_date + Duration::days(end));
    store::create_question(db, question_text, pub_date, end_date)
        .await
        .expect("question inserted")
}
