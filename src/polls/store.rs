use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::debug;

use crate::entities::{choice, question, user, vote};
use crate::models::polls::ChoiceTally;

use super::PollError;

/// Number of questions shown on the index page.
pub const LATEST_QUESTION_LIMIT: u64 = 5;
pub const MAX_TEXT_LEN: usize = 200;
pub const MAX_USERNAME_LEN: usize = 150;

/// Outcome of a saved ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub user_id: i32,
    pub question_id: i32,
    pub choice: choice::Model,
}

impl Ballot {
    pub fn confirmation(&self) -> String {
        format!("Your vote for '{}' has been saved.", self.choice.choice_text)
    }
}

/// Newest published questions, excluding those scheduled for the future.
pub async fn latest_published<C: ConnectionTrait>(
    db: &C,
    now: DateTime<Utc>,
) -> Result<Vec<question::Model>, DbErr> {
    let questions = question::Entity::find()
        .filter(question::Column::PubDate.lte(now.fixed_offset()))
        .order_by_desc(question::Column::PubDate)
        .order_by_desc(question::Column::Id)
        .limit(LATEST_QUESTION_LIMIT)
        .all(db)
        .await?;

    assert!(
        questions.len() <= LATEST_QUESTION_LIMIT as usize,
        "Returned more questions than the index limit"
    );
    Ok(questions)
}

pub async fn find_question<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
) -> Result<question::Model, PollError> {
    question::Entity::find_by_id(question_id)
        .one(db)
        .await?
        .ok_or(PollError::NotFound(question_id))
}

/// Question that currently accepts ballots.
pub async fn open_question<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
    now: DateTime<Utc>,
) -> Result<question::Model, PollError> {
    let question = find_question(db, question_id).await?;
    if !question.can_vote(now) {
        return Err(PollError::Closed(question_id));
    }
    Ok(question)
}

/// Question whose results may be shown.
pub async fn published_question<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
    now: DateTime<Utc>,
) -> Result<question::Model, PollError> {
    let question = find_question(db, question_id).await?;
    if !question.is_published(now) {
        return Err(PollError::Closed(question_id));
    }
    Ok(question)
}

pub async fn choices_for<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
) -> Result<Vec<choice::Model>, DbErr> {
    choice::Entity::find()
        .filter(choice::Column::QuestionId.eq(question_id))
        .order_by_asc(choice::Column::Id)
        .all(db)
        .await
}

/// The choice `user_id` currently has on record for the question, if any.
pub async fn prior_choice<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    question_id: i32,
) -> Result<Option<choice::Model>, DbErr> {
    let record = vote::Entity::find()
        .filter(vote::Column::UserId.eq(user_id))
        .filter(vote::Column::QuestionId.eq(question_id))
        .find_also_related(choice::Entity)
        .one(db)
        .await?;

    Ok(record.and_then(|(_, choice)| choice))
}

/// Vote counts per choice, in choice order. Choices without ballots count zero.
pub async fn tally<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
) -> Result<Vec<ChoiceTally>, DbErr> {
    let choices = choices_for(db, question_id).await?;

    let counts: Vec<(i32, i64)> = vote::Entity::find()
        .select_only()
        .column(vote::Column::ChoiceId)
        .column_as(vote::Column::Id.count(), "votes")
        .filter(vote::Column::QuestionId.eq(question_id))
        .group_by(vote::Column::ChoiceId)
        .into_tuple()
        .all(db)
        .await?;
    let counts: HashMap<i32, i64> = counts.into_iter().collect();

    let tallies = choices
        .into_iter()
        .map(|choice| ChoiceTally {
            votes: counts.get(&choice.id).copied().unwrap_or(0),
            id: choice.id,
            choice_text: choice.choice_text,
        })
        .collect::<Vec<_>>();

    assert!(
        tallies.iter().all(|entry| entry.votes >= 0),
        "Vote counts cannot be negative"
    );
    Ok(tallies)
}

/// Records `user_id`'s ballot for `question`, replacing any earlier one.
///
/// `selection` is the raw form value. The caller must already have checked
/// that the question accepts votes. The insert and the reassignment are one
/// statement keyed on the `(user_id, question_id)` unique index, so
/// concurrent ballots from the same user cannot produce two rows.
pub async fn cast_vote<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    question: &question::Model,
    selection: Option<&str>,
) -> Result<Ballot, PollError> {
    let choice_id = selection
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .ok_or(PollError::MissingSelection)?;

    let choice = choice::Entity::find_by_id(choice_id)
        .filter(choice::Column::QuestionId.eq(question.id))
        .one(db)
        .await?
        .ok_or(PollError::MissingSelection)?;

    let ballot = vote::ActiveModel {
        id: ActiveValue::NotSet,
        user_id: ActiveValue::Set(user_id),
        question_id: ActiveValue::Set(question.id),
        choice_id: ActiveValue::Set(choice.id),
    };

    let affected = vote::Entity::insert(ballot)
        .on_conflict(
            OnConflict::columns([vote::Column::UserId, vote::Column::QuestionId])
                .update_column(vote::Column::ChoiceId)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    debug!(
        "Ballot upsert for user {user_id} on question {} touched {affected} row(s)",
        question.id
    );

    Ok(Ballot {
        user_id,
        question_id: question.id,
        choice,
    })
}

pub async fn find_user_by_name<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

// Provisioning used by the administrative tooling

/// Rejects empty text and text longer than the column's character bound.
fn bounded_text<'a>(label: &str, raw: &'a str, limit: usize) -> Result<&'a str, PollError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(PollError::InvalidInput(format!("{label} must not be empty")));
    }
    let length = text.chars().count();
    if length > limit {
        return Err(PollError::InvalidInput(format!(
            "{label} is {length} characters, limit is {limit}"
        )));
    }
    Ok(text)
}

pub async fn register_user<C: ConnectionTrait>(
    db: &C,
    username: &str,
    now: DateTime<Utc>,
) -> Result<user::Model, PollError> {
    let username = bounded_text("username", username, MAX_USERNAME_LEN)?;

    let created = user::ActiveModel {
        id: ActiveValue::NotSet,
        username: ActiveValue::Set(username.to_string()),
        created_at: ActiveValue::Set(now.fixed_offset()),
    }
    .insert(db)
    .await?;
    Ok(created)
}

pub async fn create_question<C: ConnectionTrait>(
    db: &C,
    question_text: &str,
    pub_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
) -> Result<question::Model, PollError> {
    let question_text = bounded_text("question text", question_text, MAX_TEXT_LEN)?;

    let created = question::ActiveModel {
        id: ActiveValue::NotSet,
        question_text: ActiveValue::Set(question_text.to_string()),
        pub_date: ActiveValue::Set(pub_date.fixed_offset()),
        end_date: ActiveValue::Set(end_date.map(|end| end.fixed_offset())),
    }
    .insert(db)
    .await?;
    Ok(created)
}

pub async fn add_choice<C: ConnectionTrait>(
    db: &C,
    question_id: i32,
    choice_text: &str,
) -> Result<choice::Model, PollError> {
    let choice_text = bounded_text("choice text", choice_text, MAX_TEXT_LEN)?;

    let created = choice::ActiveModel {
        id: ActiveValue::NotSet,
        question_id: ActiveValue::Set(question_id),
        choice_text: ActiveValue::Set(choice_text.to_string()),
    }
    .insert(db)
    .await?;
    Ok(created)
}
