use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{choice, question};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: i32,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub published_recently: bool,
}

impl QuestionSummary {
    pub fn from_model(question: &question::Model, now: DateTime<Utc>) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text.clone(),
            pub_date: question.pub_date.with_timezone(&Utc),
            end_date: question.end_date.map(|end| end.with_timezone(&Utc)),
            published_recently: question.was_published_recently(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: i32,
    pub choice_text: String,
}

impl From<&choice::Model> for ChoiceView {
    fn from(choice: &choice::Model) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice_text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollIndexView {
    pub latest_question_list: Vec<QuestionSummary>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDetailView {
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceView>,
    pub voted: Option<ChoiceView>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub id: i32,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResultsView {
    pub question: QuestionSummary,
    pub results: Vec<ChoiceTally>,
    pub total_votes: i64,
}

// Form/response types for the ballot endpoint

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteForm {
    pub choice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub question_id: i32,
    pub choice: ChoiceView,
    pub message: String,
    pub results_url: String,
}
