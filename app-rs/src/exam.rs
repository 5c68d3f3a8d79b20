//! The practice-exam session state machine.
//!
//! A session moves through `loading -> in-progress -> submitting ->
//! submitted`, where "loading" is the question fetch in
//! [`ExamSession::start`]. Navigation, option selection, and mark-for-review
//! all mutate per-question [`QuestionStatus`] flags while in-progress. A
//! 1-second countdown runs alongside; when it reaches zero the session force
//! submits.
//!
//! Submission is gated so at most one submit request is ever outstanding,
//! and a completed session can never submit twice, no matter how the timer
//! races manual submits. A failed submit returns the session to in-progress
//! with all per-question state intact; retrying is the user's call.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context;
use prepd_api_core::{
    def::StudentExamApi,
    error::BackendApiError,
    models::SubmitExamRequest,
    types::exam::{ExamId, ExamResult, Question},
};
use prepd_tokio::{notify, task::PdTask};
use tokio::time::Duration;
use tracing::{info, warn};

/// Per-question UI state, one per question; array index = question index.
///
/// Invariants:
/// - `answered == selected_option.is_some()`
/// - `answered` implies `visited`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct QuestionStatus {
    pub answered: bool,
    pub marked: bool,
    pub visited: bool,
    pub selected_option: Option<u32>,
}

/// The three observable states a question can be in. Exactly one holds for
/// any question at any time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VisitState {
    Unvisited,
    VisitedUnanswered,
    VisitedAnswered,
}

impl QuestionStatus {
    pub fn visit_state(&self) -> VisitState {
        debug_assert_eq!(self.answered, self.selected_option.is_some());
        debug_assert!(self.visited || !self.answered);

        match (self.visited, self.answered) {
            (false, _) => VisitState::Unvisited,
            (true, false) => VisitState::VisitedUnanswered,
            (true, true) => VisitState::VisitedAnswered,
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExamPhase {
    InProgress,
    Submitting,
    Submitted(ExamResult),
}

/// The shared, lock-protected session state. All mutation goes through the
/// methods here; the async layer above never touches fields directly.
struct SessionState {
    exam_id: ExamId,
    questions: Vec<Question>,
    statuses: Vec<QuestionStatus>,
    current: usize,
    remaining_secs: u32,
    phase: ExamPhase,
}

impl SessionState {
    fn new(
        exam_id: ExamId,
        questions: Vec<Question>,
        duration_secs: u32,
    ) -> Self {
        let mut statuses = vec![QuestionStatus::default(); questions.len()];
        // The first question is on screen from the start.
        if let Some(first) = statuses.first_mut() {
            first.visited = true;
        }
        Self {
            exam_id,
            questions,
            statuses,
            current: 0,
            remaining_secs: duration_secs,
            phase: ExamPhase::InProgress,
        }
    }

    fn ensure_in_progress(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.phase == ExamPhase::InProgress,
            "Exam is no longer in progress",
        );
        Ok(())
    }

    fn select_option(&mut self, option: u32) -> anyhow::Result<()> {
        self.ensure_in_progress()?;
        let status = &mut self.statuses[self.current];
        let question = &self.questions[self.current];
        anyhow::ensure!(
            (option as usize) < question.options.len(),
            "Option index out of range",
        );
        // Re-selection overwrites; a review mark is preserved.
        status.selected_option = Some(option);
        status.answered = true;
        status.visited = true;
        Ok(())
    }

    fn toggle_mark(&mut self) -> anyhow::Result<()> {
        self.ensure_in_progress()?;
        let status = &mut self.statuses[self.current];
        status.marked = !status.marked;
        Ok(())
    }

    /// Clears any previously selected option on the current question, then
    /// advances. This is deliberate: skip means "I'm not answering this one",
    /// even if an answer was recorded earlier.
    fn skip(&mut self) -> anyhow::Result<()> {
        self.ensure_in_progress()?;
        let status = &mut self.statuses[self.current];
        status.selected_option = None;
        status.answered = false;
        status.visited = true;
        self.goto(self.current + 1);
        Ok(())
    }

    /// Advance to the next question. Unlike [`skip`](Self::skip), any
    /// recorded answer is kept.
    fn next(&mut self) -> anyhow::Result<()> {
        self.ensure_in_progress()?;
        self.goto(self.current + 1);
        Ok(())
    }

    /// Jump to the question at `index` (the navigation-grid tap).
    fn jump_to(&mut self, index: usize) -> anyhow::Result<()> {
        self.ensure_in_progress()?;
        anyhow::ensure!(
            index < self.questions.len(),
            "Question index out of range",
        );
        self.goto(index);
        Ok(())
    }

    fn goto(&mut self, index: usize) {
        // Advancing past the last question stays on it.
        let index = index.min(self.questions.len().saturating_sub(1));
        self.current = index;
        self.statuses[index].visited = true;
    }

    /// One countdown tick. Returns `true` when the timer just hit zero.
    fn tick(&mut self) -> bool {
        if self.phase != ExamPhase::InProgress || self.remaining_secs == 0 {
            return false;
        }
        self.remaining_secs -= 1;
        self.remaining_secs == 0
    }

    /// The at-most-once submit gate. The first caller flips the phase to
    /// `Submitting` and gets the payload; everyone else gets `None`.
    fn begin_submit(&mut self) -> Option<SubmitExamRequest> {
        if self.phase != ExamPhase::InProgress {
            return None;
        }
        self.phase = ExamPhase::Submitting;
        Some(self.submit_payload())
    }

    /// Only answered questions contribute to the payload; marked-but-
    /// unanswered and skipped questions are absent.
    fn submit_payload(&self) -> SubmitExamRequest {
        let answers = self
            .questions
            .iter()
            .zip(self.statuses.iter())
            .filter_map(|(question, status)| {
                status.selected_option.map(|option| (question.id, option))
            })
            .collect::<BTreeMap<_, _>>();
        SubmitExamRequest { answers }
    }

    fn complete_submit(&mut self, result: ExamResult) {
        debug_assert_eq!(self.phase, ExamPhase::Submitting);
        self.phase = ExamPhase::Submitted(result);
    }

    /// A failed submit leaves the user on the same screen with all
    /// per-question state intact.
    fn fail_submit(&mut self) {
        debug_assert_eq!(self.phase, ExamPhase::Submitting);
        self.phase = ExamPhase::InProgress;
    }

    #[cfg(debug_assertions)]
    fn debug_assert_invariants(&self) {
        assert_eq!(self.questions.len(), self.statuses.len());
        for status in &self.statuses {
            // Also checks the per-question invariants.
            status.visit_state();
        }
    }

    #[cfg(not(debug_assertions))]
    fn debug_assert_invariants(&self) {}
}

/// A live practice-exam attempt.
///
/// Holds the countdown ticker task, which force submits via `api` when the
/// timer reaches zero. Dropping the session cancels the ticker.
pub struct ExamSession<A> {
    api: Arc<A>,
    state: Arc<std::sync::Mutex<SessionState>>,
    /// Notified when the session reaches `Submitted`.
    submitted_tx: notify::Sender,
    submitted_rx: notify::Receiver,
    ticker_task: PdTask<()>,
}

impl<A: StudentExamApi + Send + Sync + 'static> ExamSession<A> {
    /// Fetch the question list and start the attempt (and its countdown).
    pub async fn start(
        api: Arc<A>,
        exam: ExamId,
        duration_secs: u32,
    ) -> anyhow::Result<Self> {
        let questions = api
            .get_exam_questions(exam)
            .await
            .context("Failed to load exam questions")?;
        anyhow::ensure!(
            !questions.questions.is_empty(),
            "Exam has no questions",
        );

        let state = Arc::new(std::sync::Mutex::new(SessionState::new(
            exam,
            questions.questions,
            duration_secs,
        )));
        let (submitted_tx, submitted_rx) = notify::channel();

        let ticker_task = PdTask::spawn("exam_ticker", {
            let api = api.clone();
            let state = state.clone();
            let submitted_tx = submitted_tx.clone();
            async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(1));
                // The first tick completes immediately; skip it.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let expired = {
                        let mut state = state.lock().unwrap();
                        if matches!(state.phase, ExamPhase::Submitted(_)) {
                            return;
                        }
                        state.tick()
                    };
                    if expired {
                        info!("exam timer expired; force submitting");
                        let _ = Self::do_submit(&api, &state, &submitted_tx)
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(Self {
            api,
            state,
            submitted_tx,
            submitted_rx,
            ticker_task,
        })
    }

    // --- In-progress actions --- //

    pub fn select_option(&self, option: u32) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.select_option(option)?;
        state.debug_assert_invariants();
        Ok(())
    }

    pub fn toggle_mark(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().toggle_mark()
    }

    pub fn next(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().next()
    }

    pub fn skip(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.skip()?;
        state.debug_assert_invariants();
        Ok(())
    }

    pub fn jump_to(&self, index: usize) -> anyhow::Result<()> {
        self.state.lock().unwrap().jump_to(index)
    }

    // --- Submission --- //

    /// Submit the attempt. At most one submit request is ever outstanding:
    /// concurrent calls (e.g. the countdown racing a button press) return
    /// `Ok(None)` and do nothing.
    ///
    /// On failure the session returns to in-progress with state intact and
    /// the error is surfaced once to the caller.
    pub async fn submit(&self) -> Result<Option<ExamResult>, BackendApiError> {
        Self::do_submit(&self.api, &self.state, &self.submitted_tx).await
    }

    /// Wait until the session reaches `Submitted` (via either a manual or a
    /// forced submit) and return the result.
    pub async fn wait_submitted(&mut self) -> ExamResult {
        loop {
            if let ExamPhase::Submitted(result) =
                &self.state.lock().unwrap().phase
            {
                return result.clone();
            }
            self.submitted_rx.recv().await;
        }
    }

    async fn do_submit(
        api: &A,
        state: &std::sync::Mutex<SessionState>,
        submitted_tx: &notify::Sender,
    ) -> Result<Option<ExamResult>, BackendApiError> {
        let (exam_id, payload) = {
            let mut state = state.lock().unwrap();
            match state.begin_submit() {
                Some(payload) => (state.exam_id, payload),
                // Another submit is in flight or already done.
                None => return Ok(None),
            }
        };

        match api.submit_exam(exam_id, payload).await {
            Ok(result) => {
                state.lock().unwrap().complete_submit(result.clone());
                submitted_tx.send();
                Ok(Some(result))
            }
            Err(err) => {
                warn!("exam submit failed: {err:#}");
                state.lock().unwrap().fail_submit();
                Err(err)
            }
        }
    }

    // --- Accessors --- //

    pub fn phase(&self) -> ExamPhase {
        self.state.lock().unwrap().phase.clone()
    }

    pub fn current(&self) -> usize {
        self.state.lock().unwrap().current
    }

    pub fn remaining_secs(&self) -> u32 {
        self.state.lock().unwrap().remaining_secs
    }

    pub fn question(&self, index: usize) -> Option<Question> {
        self.state.lock().unwrap().questions.get(index).cloned()
    }

    pub fn question_count(&self) -> usize {
        self.state.lock().unwrap().questions.len()
    }

    /// Snapshot of all per-question statuses, for the navigation grid.
    pub fn statuses(&self) -> Vec<QuestionStatus> {
        self.state.lock().unwrap().statuses.clone()
    }
}

impl<A> Drop for ExamSession<A> {
    fn drop(&mut self) {
        self.ticker_task.abort();
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use prepd_api_core::{
        error::BackendErrorKind,
        models::{
            ExamQuestions, GetLeaderboard, VecLeaderboardEntry,
            VecPracticeExam,
        },
        types::{exam::QuestionId, time::TimestampMs},
    };

    use super::*;

    struct MockExamApi {
        questions: Vec<Question>,
        fail_submits: AtomicBool,
        submit_calls: AtomicUsize,
        last_payload: Mutex<Option<SubmitExamRequest>>,
    }

    impl MockExamApi {
        fn new(num_questions: i64) -> Self {
            let questions = (1..=num_questions)
                .map(|n| Question {
                    id: QuestionId(n * 11),
                    text: format!("Question {n}?"),
                    options: vec![
                        "a".to_owned(),
                        "b".to_owned(),
                        "c".to_owned(),
                        "d".to_owned(),
                    ],
                    marks: 4,
                })
                .collect();
            Self {
                questions,
                fail_submits: AtomicBool::new(false),
                submit_calls: AtomicUsize::new(0),
                last_payload: Mutex::new(None),
            }
        }
    }

    impl StudentExamApi for MockExamApi {
        async fn list_practice_exams(
            &self,
        ) -> Result<VecPracticeExam, BackendApiError> {
            unimplemented!()
        }

        async fn get_exam_questions(
            &self,
            exam_id: ExamId,
        ) -> Result<ExamQuestions, BackendApiError> {
            Ok(ExamQuestions {
                exam_id,
                questions: self.questions.clone(),
            })
        }

        async fn submit_exam(
            &self,
            exam_id: ExamId,
            req: SubmitExamRequest,
        ) -> Result<ExamResult, BackendApiError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_submits.load(Ordering::SeqCst) {
                return Err(BackendApiError {
                    kind: BackendErrorKind::Server,
                    msg: "injected".to_owned(),
                });
            }
            let answered = req.answers.len() as u32;
            *self.last_payload.lock().unwrap() = Some(req);
            Ok(ExamResult {
                exam_id,
                score: answered * 4,
                total_marks: self.questions.len() as u32 * 4,
                correct: answered,
                incorrect: 0,
                unanswered: self.questions.len() as u32 - answered,
                submitted_at: TimestampMs::MIN,
            })
        }

        async fn get_leaderboard(
            &self,
            _req: GetLeaderboard,
        ) -> Result<VecLeaderboardEntry, BackendApiError> {
            unimplemented!()
        }
    }

    async fn start_session(
        api: Arc<MockExamApi>,
        duration_secs: u32,
    ) -> ExamSession<MockExamApi> {
        ExamSession::start(api, ExamId(1), duration_secs).await.unwrap()
    }

    fn visit_states(session: &ExamSession<MockExamApi>) -> Vec<VisitState> {
        session
            .statuses()
            .iter()
            .map(QuestionStatus::visit_state)
            .collect()
    }

    #[tokio::test]
    async fn visit_states_partition_questions() {
        let api = Arc::new(MockExamApi::new(3));
        let session = start_session(api, 600).await;

        // Only the first question starts visited.
        assert_eq!(
            visit_states(&session),
            vec![
                VisitState::VisitedUnanswered,
                VisitState::Unvisited,
                VisitState::Unvisited,
            ],
        );

        session.select_option(0).unwrap();
        session.next().unwrap();
        assert_eq!(
            visit_states(&session),
            vec![
                VisitState::VisitedAnswered,
                VisitState::VisitedUnanswered,
                VisitState::Unvisited,
            ],
        );
    }

    #[tokio::test]
    async fn reselection_overwrites_and_preserves_mark() {
        let api = Arc::new(MockExamApi::new(1));
        let session = start_session(api, 600).await;

        session.toggle_mark().unwrap();
        session.select_option(1).unwrap();
        session.select_option(2).unwrap();

        let status = session.statuses()[0];
        assert_eq!(status.selected_option, Some(2));
        assert!(status.answered);
        // Selecting after marking for review preserves the mark.
        assert!(status.marked);

        // Out-of-range options are rejected.
        session.select_option(4).unwrap_err();
        assert_eq!(session.statuses()[0].selected_option, Some(2));
    }

    #[tokio::test]
    async fn skip_clears_previous_answer() {
        let api = Arc::new(MockExamApi::new(2));
        let session = start_session(api, 600).await;

        session.select_option(3).unwrap();
        session.jump_to(1).unwrap();
        session.jump_to(0).unwrap();
        // Navigating away and back kept the answer.
        assert_eq!(session.statuses()[0].selected_option, Some(3));

        session.skip().unwrap();
        let status = session.statuses()[0];
        assert_eq!(status.selected_option, None);
        assert!(!status.answered);
        assert!(status.visited);
        assert_eq!(session.current(), 1);
    }

    /// A 3-question exam; answer Q1 with option 2, mark Q2, skip Q3, then
    /// submit. Expected payload: `{answers: {Q1id: 2}}`.
    #[tokio::test]
    async fn submit_payload_contains_only_answered() {
        let api = Arc::new(MockExamApi::new(3));
        let session = start_session(api.clone(), 600).await;

        session.select_option(2).unwrap();
        session.next().unwrap();
        session.toggle_mark().unwrap();
        session.next().unwrap();
        session.skip().unwrap();

        let result = session.submit().await.unwrap().unwrap();
        assert_eq!(result.correct, 1);

        let payload = api.last_payload.lock().unwrap().clone().unwrap();
        let expected =
            BTreeMap::from_iter([(QuestionId(11), 2)]);
        assert_eq!(payload.answers, expected);

        // A second submit is a no-op.
        assert_eq!(session.submit().await.unwrap(), None);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_submits_exactly_once() {
        let api = Arc::new(MockExamApi::new(2));
        let mut session = start_session(api.clone(), 3).await;

        session.select_option(1).unwrap();

        let result = session.wait_submitted().await;
        assert_eq!(result.correct, 1);
        assert_eq!(session.remaining_secs(), 0);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);

        // A manual submit racing in after expiry does nothing.
        assert_eq!(session.submit().await.unwrap(), None);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_submit_leaves_state_intact() {
        let api = Arc::new(MockExamApi::new(2));
        let session = start_session(api.clone(), 600).await;

        session.select_option(0).unwrap();
        session.toggle_mark().unwrap();
        let statuses_before = session.statuses();

        api.fail_submits.store(true, Ordering::SeqCst);
        session.submit().await.unwrap_err();

        // Back to in-progress, per-question state untouched.
        assert_eq!(session.phase(), ExamPhase::InProgress);
        assert_eq!(session.statuses(), statuses_before);

        // Manual retry works once the backend recovers.
        api.fail_submits.store(false, Ordering::SeqCst);
        let result = session.submit().await.unwrap().unwrap();
        assert_eq!(result.correct, 1);
        assert_eq!(api.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn actions_rejected_after_submit() {
        let api = Arc::new(MockExamApi::new(1));
        let session = start_session(api, 600).await;

        session.submit().await.unwrap().unwrap();
        assert!(matches!(session.phase(), ExamPhase::Submitted(_)));

        session.select_option(0).unwrap_err();
        session.toggle_mark().unwrap_err();
        session.skip().unwrap_err();
    }
}
