use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{time::TimestampMs, user::UserId};

/// A practice exam's backend-assigned id.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ExamId(pub i64);

impl fmt::Display for ExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A question's backend-assigned id.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct QuestionId(pub i64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A self-paced, timed set of multiple-choice questions attempted by a
/// student. Display data only; the questions are fetched separately when a
/// session starts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PracticeExam {
    pub id: ExamId,
    pub title: String,
    pub subject: String,
    pub question_count: u32,
    pub total_marks: u32,
    /// Time allowed for an attempt, in seconds.
    pub duration_secs: u32,
    /// Whether this student has already submitted an attempt.
    pub attempted: bool,
}

/// A single multiple-choice question. Immutable once fetched for a session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    /// Answer options, in display order. A selected answer is communicated
    /// to the backend as an index into this list.
    pub options: Vec<String>,
    pub marks: u32,
}

/// The graded outcome of a submitted attempt.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub exam_id: ExamId,
    pub score: u32,
    pub total_marks: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub submitted_at: TimestampMs,
}

/// One row of an exam's leaderboard.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
}
