// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One version of a quiz, identified by the SHA-1 of its full source text.
///
/// Maps to the 'quiz' table. `questions` is only populated by full reads
/// and by the parser.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub sha1: String,

    /// Stable external key shared by every version of the same source file.
    pub filename: String,

    pub name: String,

    /// Allowed time for a session, in seconds.
    pub duration: i32,

    /// Starts at 1 and grows by one for each distinct content of `filename`.
    pub version: i32,

    pub active: bool,

    pub created_at: DateTime<Utc>,

    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<Question>,
}

/// A question, shared by every quiz whose block text is byte-identical.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub sha1: String,

    /// 1-based position inside the quiz it was read from.
    pub position: i32,

    pub content: String,

    pub code: Option<String>,

    pub code_language: Option<String>,

    #[sqlx(skip)]
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// A single checkbox line of a question.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub sha1: String,
    pub content: String,
    /// Ground truth: the box was checked in the source.
    pub valid: bool,
}

/// Result of reconciling one parsed quiz against the stored versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

/// DTO for sending a quiz to a non-admin client (no `valid` flags).
#[derive(Debug, Serialize)]
pub struct PublicQuiz {
    pub sha1: String,
    pub name: String,
    pub duration: i32,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub sha1: String,
    pub position: i32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_language: Option<String>,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub sha1: String,
    pub content: String,
}

impl From<Quiz> for PublicQuiz {
    fn from(quiz: Quiz) -> Self {
        Self {
            sha1: quiz.sha1,
            name: quiz.name,
            duration: quiz.duration,
            questions: quiz
                .questions
                .into_iter()
                .map(|q| PublicQuestion {
                    sha1: q.sha1,
                    position: q.position,
                    content: q.content,
                    code: q.code,
                    code_language: q.code_language,
                    answers: q
                        .answers
                        .into_iter()
                        .map(|a| PublicAnswer {
                            sha1: a.sha1,
                            content: a.content,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Either the full quiz (admins) or the public projection.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QuizDetail {
    Full(Quiz),
    Public(PublicQuiz),
}
