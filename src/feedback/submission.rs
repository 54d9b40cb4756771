use serde::Deserialize;
use tracing::{info, warn};

use super::db::{DbHandle, FeedbackDb};
use super::models::{FeedbackForm, FormState, MAX_SCORE, MIN_SCORE, Question};
use crate::errors::{FeedbackError, FeedbackResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub questions: Vec<Question>,
}

fn load_owned(db: &FeedbackDb, form_id: i64, student_id: i64) -> FeedbackResult<FeedbackForm> {
    let form = db
        .get_form(form_id)?
        .ok_or_else(|| FeedbackError::not_found("Feedback form not found"))?;
    if form.student_id != student_id {
        warn!(form_id, student_id, "Student tried to access another student's form");
        return Err(FeedbackError::forbidden(
            "Feedback form does not belong to this student",
        ));
    }
    Ok(form)
}

/// Only an unattempted form may be opened or submitted.
fn require_unattempted(form: &FeedbackForm) -> FeedbackResult<()> {
    match form.state() {
        FormState::Unattempted => Ok(()),
        FormState::Attempted => Err(FeedbackError::conflict("Feedback already submitted")),
    }
}

/// Answers must line up with the form: same count, non-empty text, and a
/// score within range for every question.
pub fn validate_answers(form: &FeedbackForm, answers: &[Question]) -> FeedbackResult<()> {
    if answers.len() != form.questions.len() {
        return Err(FeedbackError::validation(format!(
            "Expected {} answers, got {}",
            form.questions.len(),
            answers.len()
        )));
    }
    for (i, answer) in answers.iter().enumerate() {
        if answer.question.trim().is_empty() {
            return Err(FeedbackError::validation(format!(
                "Question {} has empty text",
                i + 1
            )));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&answer.score) {
            return Err(FeedbackError::validation(format!(
                "Score for question {} must be between {} and {}, got {}",
                i + 1,
                MIN_SCORE,
                MAX_SCORE,
                answer.score
            )));
        }
    }
    Ok(())
}

/// Fetch a form for filling in. Only the owning student may open it, and
/// only while it is unattempted.
pub async fn open(db: &DbHandle, form_id: i64, student_id: i64) -> FeedbackResult<FeedbackForm> {
    let form = db
        .call(move |db| load_owned(db, form_id, student_id))
        .await?;
    require_unattempted(&form)?;
    Ok(form)
}

/// Record answers and move the form to attempted. The write is conditional
/// on the form still being unattempted, so of two racing submissions exactly
/// one succeeds and the other gets `Conflict`.
pub async fn submit(
    db: &DbHandle,
    form_id: i64,
    student_id: i64,
    answers: Vec<Question>,
) -> FeedbackResult<FeedbackForm> {
    db.call(move |db| {
        let form = load_owned(db, form_id, student_id)?;
        require_unattempted(&form)?;
        validate_answers(&form, &answers)?;
        if !db.submit_form(form_id, &answers)? {
            return Err(FeedbackError::conflict("Feedback already submitted"));
        }
        info!(form_id, student_id, "Feedback submitted");
        db.get_form(form_id)?
            .ok_or_else(|| FeedbackError::not_found("Feedback form not found"))
    })
    .await
}

/// Synchronous body of [`bulk_reset`]. Shared with the `reset-feedback` CLI
/// command.
pub fn bulk_reset_locked(db: &FeedbackDb) -> FeedbackResult<usize> {
    let ids = db.attempted_form_ids()?;
    if ids.is_empty() {
        return Err(FeedbackError::not_found("No attempted feedback forms to reset"));
    }
    let mut reset = 0;
    for id in ids {
        if db.reset_form(id)? {
            reset += 1;
        }
    }
    info!(reset, "Reset attempted feedback forms");
    Ok(reset)
}

/// Put every attempted form back to unattempted with all scores at zero.
/// Forms are never deleted. Returns how many forms were reset.
pub async fn bulk_reset(db: &DbHandle) -> FeedbackResult<usize> {
    db.call(bulk_reset_locked).await
}
