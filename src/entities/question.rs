use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::polls::window::PublishWindow;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "questions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub question_text: String,
    pub pub_date: DateTimeWithTimeZone,
    pub end_date: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn window(&self) -> PublishWindow {
        PublishWindow::new(
            self.pub_date.with_timezone(&Utc),
            self.end_date.map(|end| end.with_timezone(&Utc)),
        )
    }

    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.window().is_published(now)
    }

    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        self.window().can_vote(now)
    }

    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        self.window().was_published_recently(now)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::choice::Entity")]
    Choice,
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
}

impl Related<super::choice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Choice.def()
    }
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
