//! Ensures every feedback form a student owes exists.
//!
//! A student owes one form per `(faculty, subject_code)` for each teaching
//! assignment whose cohort equals the student's. Provisioning only ever adds
//! forms; it never touches the state or scores of a form that already exists.

use std::collections::HashSet;

use tracing::{debug, info};

use super::db::{DbHandle, FeedbackDb};
use super::models::{Faculty, FeedbackForm, FormKey, NewFeedbackForm, Student, default_questions};
use crate::errors::{FeedbackError, FeedbackResult};

/// Forms the student is owed but does not have yet. Pure: no I/O.
///
/// Each assignment is re-checked against the student's cohort, so a faculty
/// returned because of one matching assignment does not contribute its other
/// assignments. Keys already in `existing`, or planned earlier in the same
/// pass, are skipped.
pub fn plan_forms(
    student: &Student,
    faculties: &[Faculty],
    existing: &HashSet<FormKey>,
) -> Vec<NewFeedbackForm> {
    let cohort = student.cohort();
    let mut seen = existing.clone();
    let mut planned = Vec::new();

    for faculty in faculties {
        for assignment in faculty.teaches.iter().filter(|a| a.matches(&cohort)) {
            let key = FormKey {
                faculty_id: faculty.id,
                subject_code: assignment.subject_code.clone(),
            };
            if !seen.insert(key) {
                continue;
            }
            planned.push(NewFeedbackForm {
                faculty_id: faculty.id,
                student_id: student.id,
                subject: assignment.subject.clone(),
                subject_code: assignment.subject_code.clone(),
                questions: default_questions(),
            });
        }
    }
    planned
}

/// Synchronous body of [`provision_for`]; runs under one database lock.
pub fn provision_locked(db: &FeedbackDb, student_id: i64) -> FeedbackResult<Vec<FeedbackForm>> {
    let student = db
        .get_student(student_id)?
        .ok_or_else(|| FeedbackError::not_found("Student not found"))?;

    let faculties = db.faculties_teaching(&student.cohort())?;
    if faculties.is_empty() {
        return Err(FeedbackError::not_found(
            "No faculty teaches this student's class",
        ));
    }

    let existing = db.form_keys_for_student(student.id)?;
    let planned = plan_forms(&student, &faculties, &existing);
    if !planned.is_empty() {
        let inserted = db.insert_forms(&planned)?;
        info!(
            student_id = student.id,
            planned = planned.len(),
            inserted,
            "Provisioned feedback forms"
        );
    } else {
        debug!(student_id = student.id, "No new feedback forms to provision");
    }

    Ok(db.list_forms_for_student(student.id)?)
}

/// Create any missing forms for the student and return all of their forms.
///
/// Fails with `NotFound` if the student does not exist or if no faculty
/// teaches the student's cohort.
pub async fn provision_for(db: &DbHandle, student_id: i64) -> FeedbackResult<Vec<FeedbackForm>> {
    db.call(move |db| provision_locked(db, student_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::models::{Cohort, NewStudent, TeachingAssignment};

    fn student(db: &FeedbackDb, admission_no: &str, section: &str) -> Student {
        db.create_student(&NewStudent {
            admission_no: admission_no.into(),
            roll_no: format!("roll-{}", admission_no),
            department: "CS".into(),
            section: section.into(),
            year: 2,
            semester: 3,
        })
        .unwrap()
        .unwrap()
    }

    fn teach(section: &str, subject: &str, code: &str) -> TeachingAssignment {
        TeachingAssignment {
            year: 2,
            department: "CS".into(),
            section: section.into(),
            semester: 3,
            subject: subject.into(),
            subject_code: code.into(),
        }
    }

    fn faculty(db: &FeedbackDb, emp_id: &str, assignments: &[TeachingAssignment]) -> Faculty {
        let f = db.create_faculty(emp_id, emp_id, None).unwrap().unwrap();
        let mut out = f;
        for a in assignments {
            out = db.add_teaching_assignment(out.id, a).unwrap();
        }
        out
    }

    #[test]
    fn test_plan_skips_existing_and_duplicate_assignments() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        let f = faculty(
            &db,
            "e1",
            &[teach("A", "OS", "CS301"), teach("A", "OS", "CS301"), teach("A", "DB", "CS302")],
        );

        let mut existing = HashSet::new();
        existing.insert(FormKey {
            faculty_id: f.id,
            subject_code: "CS302".into(),
        });

        let planned = plan_forms(&s, &[f], &existing);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].subject_code, "CS301");
        assert_eq!(planned[0].questions, default_questions());
    }

    #[test]
    fn test_single_matching_assignment_scenario() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        let f = faculty(&db, "e1", &[teach("A", "OS", "CS301"), teach("B", "OS", "CS301")]);

        let forms = provision_locked(&db, s.id).unwrap();
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(form.faculty_id, f.id);
        assert_eq!(form.subject, "OS");
        assert_eq!(form.subject_code, "CS301");
        assert!(!form.attempted);
        assert_eq!(form.questions.len(), 3);
        assert!(form.questions.iter().all(|q| q.score == 0));
    }

    #[test]
    fn test_provisioning_is_idempotent() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        faculty(&db, "e1", &[teach("A", "OS", "CS301"), teach("A", "DB", "CS302")]);
        faculty(&db, "e2", &[teach("A", "ML", "CS401")]);

        let first = provision_locked(&db, s.id).unwrap();
        let second = provision_locked(&db, s.id).unwrap();
        assert_eq!(first.len(), 3);
        let first_ids: Vec<i64> = first.iter().map(|f| f.id).collect();
        let second_ids: Vec<i64> = second.iter().map(|f| f.id).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(db.count_forms().unwrap(), 3);
    }

    #[test]
    fn test_provisioning_preserves_submitted_forms() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        faculty(&db, "e1", &[teach("A", "OS", "CS301")]);

        let form = provision_locked(&db, s.id).unwrap().remove(0);
        let answers = vec![crate::feedback::models::Question {
            question: "How was the teaching?".into(),
            score: 5,
        }];
        db.submit_form(form.id, &answers).unwrap();

        let again = provision_locked(&db, s.id).unwrap();
        assert_eq!(again.len(), 1);
        assert!(again[0].attempted);
        assert_eq!(again[0].questions, answers);
    }

    #[test]
    fn test_section_change_adds_forms_without_removing_old() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        faculty(&db, "e1", &[teach("A", "OS", "CS301")]);
        faculty(&db, "e2", &[teach("B", "DB", "CS302")]);

        assert_eq!(provision_locked(&db, s.id).unwrap().len(), 1);

        let moved = Cohort {
            year: 2,
            semester: 3,
            department: "CS".into(),
            section: "B".into(),
        };
        db.update_student_cohort(s.id, &moved).unwrap();

        let forms = provision_locked(&db, s.id).unwrap();
        let codes: Vec<&str> = forms.iter().map(|f| f.subject_code.as_str()).collect();
        assert_eq!(codes, vec!["CS301", "CS302"]);
    }

    #[test]
    fn test_no_matching_faculty_is_not_found() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "C");
        faculty(&db, "e1", &[teach("A", "OS", "CS301")]);

        let err = provision_locked(&db, s.id).unwrap_err();
        assert!(matches!(err, FeedbackError::NotFound(_)));
        assert_eq!(db.count_forms().unwrap(), 0);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        faculty(&db, "e1", &[teach("a", "OS", "CS301")]);
        assert!(matches!(
            provision_locked(&db, s.id),
            Err(FeedbackError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_student_is_not_found() {
        let db = FeedbackDb::new_in_memory().unwrap();
        assert!(matches!(
            provision_locked(&db, 404),
            Err(FeedbackError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_provisioning_creates_each_form_once() {
        let db = FeedbackDb::new_in_memory().unwrap();
        let s = student(&db, "adm1", "A");
        faculty(&db, "e1", &[teach("A", "OS", "CS301"), teach("A", "DB", "CS302")]);
        let handle = DbHandle::new(db);
        let student_id = s.id;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { provision_for(&handle, student_id).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(handle.lock_sync().unwrap().count_forms().unwrap(), 2);
    }
}
