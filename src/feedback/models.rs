use serde::{Deserialize, Serialize};

use crate::errors::{FeedbackError, FeedbackResult};

/// Questions every freshly provisioned form starts with, in order.
pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "How was the teaching?",
    "How was the communication?",
    "How was the punctuality?",
];

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub admission_no: String,
    pub roll_no: String,
    pub department: String,
    pub section: String,
    pub year: i64,
    pub semester: i64,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Student {
    pub fn cohort(&self) -> Cohort {
        Cohort {
            year: self.year,
            semester: self.semester,
            department: self.department.clone(),
            section: self.section.clone(),
        }
    }
}

/// The four fields a teaching assignment must share with a student.
/// Comparison is exact: no case folding, no trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub year: i64,
    pub semester: i64,
    pub department: String,
    pub section: String,
}

/// Either kind of authenticated identity.
#[derive(Debug, Clone)]
pub enum Actor {
    Admin(Admin),
    Student(Student),
}

impl Actor {
    pub fn id(&self) -> i64 {
        match self {
            Self::Admin(a) => a.id,
            Self::Student(s) => s.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Admin(_) => Role::Admin,
            Self::Student(_) => Role::Student,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::Admin(a) => a.refresh_token.as_deref(),
            Self::Student(s) => s.refresh_token.as_deref(),
        }
    }
}

/// Admin-supplied student record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewStudent {
    pub admission_no: String,
    pub roll_no: String,
    pub department: String,
    pub section: String,
    pub year: i64,
    pub semester: i64,
}

impl NewStudent {
    pub fn validate(&self) -> FeedbackResult<()> {
        require_text("admissionNo", &self.admission_no)?;
        require_text("rollNo", &self.roll_no)?;
        require_text("department", &self.department)?;
        require_text("section", &self.section)?;
        validate_year(self.year)?;
        validate_semester(self.semester)
    }
}

/// One teaching context of a faculty member. Every field is required and
/// unknown fields are rejected at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TeachingAssignment {
    pub year: i64,
    pub department: String,
    pub section: String,
    pub semester: i64,
    pub subject: String,
    pub subject_code: String,
}

impl TeachingAssignment {
    pub fn validate(&self) -> FeedbackResult<()> {
        validate_year(self.year)?;
        validate_semester(self.semester)?;
        require_text("department", &self.department)?;
        require_text("section", &self.section)?;
        require_text("subject", &self.subject)?;
        require_text("subjectCode", &self.subject_code)
    }

    pub fn matches(&self, cohort: &Cohort) -> bool {
        self.year == cohort.year
            && self.semester == cohort.semester
            && self.department == cohort.department
            && self.section == cohort.section
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: i64,
    pub emp_id: String,
    pub name: String,
    pub image: Option<String>,
    pub teaches: Vec<TeachingAssignment>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub question: String,
    pub score: i64,
}

pub fn default_questions() -> Vec<Question> {
    DEFAULT_QUESTIONS
        .iter()
        .map(|q| Question {
            question: q.to_string(),
            score: 0,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    Unattempted,
    Attempted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackForm {
    pub id: i64,
    pub faculty_id: i64,
    pub student_id: i64,
    pub subject: String,
    pub subject_code: String,
    pub questions: Vec<Question>,
    pub attempted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl FeedbackForm {
    pub fn state(&self) -> FormState {
        if self.attempted {
            FormState::Attempted
        } else {
            FormState::Unattempted
        }
    }
}

/// Identity of a form within one student's set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormKey {
    pub faculty_id: i64,
    pub subject_code: String,
}

/// A form that has been planned by provisioning but not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedbackForm {
    pub faculty_id: i64,
    pub student_id: i64,
    pub subject: String,
    pub subject_code: String,
    pub questions: Vec<Question>,
}

fn require_text(field: &str, value: &str) -> FeedbackResult<()> {
    if value.trim().is_empty() {
        return Err(FeedbackError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_year(year: i64) -> FeedbackResult<()> {
    if !(1..=4).contains(&year) {
        return Err(FeedbackError::validation(format!(
            "year must be between 1 and 4, got {}",
            year
        )));
    }
    Ok(())
}

fn validate_semester(semester: i64) -> FeedbackResult<()> {
    if !(1..=8).contains(&semester) {
        return Err(FeedbackError::validation(format!(
            "semester must be between 1 and 8, got {}",
            semester
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_assignment() -> TeachingAssignment {
        TeachingAssignment {
            year: 2,
            department: "CS".into(),
            section: "A".into(),
            semester: 3,
            subject: "OS".into(),
            subject_code: "CS301".into(),
        }
    }

    fn cohort(section: &str) -> Cohort {
        Cohort {
            year: 2,
            semester: 3,
            department: "CS".into(),
            section: section.into(),
        }
    }

    #[test]
    fn test_role_serializes_as_snake_case() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        assert_eq!(Role::Student.as_str(), "student");
        assert!(serde_json::from_value::<Role>(serde_json::json!("professor")).is_err());
    }

    #[test]
    fn test_assignment_matches_exact_cohort() {
        assert!(os_assignment().matches(&cohort("A")));
        assert!(!os_assignment().matches(&cohort("B")));
    }

    #[test]
    fn test_assignment_match_is_case_and_whitespace_strict() {
        assert!(!os_assignment().matches(&cohort("a")));
        assert!(!os_assignment().matches(&cohort("A ")));
    }

    #[test]
    fn test_assignment_rejects_unknown_fields() {
        let json = serde_json::json!({
            "year": 2, "department": "CS", "section": "A", "semester": 3,
            "subject": "OS", "subjectCode": "CS301", "room": "B12"
        });
        assert!(serde_json::from_value::<TeachingAssignment>(json).is_err());
    }

    #[test]
    fn test_assignment_rejects_missing_fields() {
        let json = serde_json::json!({
            "year": 2, "department": "CS", "section": "A", "semester": 3, "subject": "OS"
        });
        assert!(serde_json::from_value::<TeachingAssignment>(json).is_err());
    }

    #[test]
    fn test_assignment_validate_ranges() {
        let mut a = os_assignment();
        assert!(a.validate().is_ok());
        a.year = 5;
        assert!(matches!(a.validate(), Err(FeedbackError::Validation(_))));
        a.year = 2;
        a.subject_code = "  ".into();
        assert!(matches!(a.validate(), Err(FeedbackError::Validation(_))));
    }

    #[test]
    fn test_new_student_validate() {
        let s = NewStudent {
            admission_no: "ADM1".into(),
            roll_no: "R1".into(),
            department: "CS".into(),
            section: "A".into(),
            year: 2,
            semester: 9,
        };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("semester"));
    }

    #[test]
    fn test_default_questions_start_at_zero() {
        let qs = default_questions();
        assert_eq!(qs.len(), 3);
        assert!(qs.iter().all(|q| q.score == 0));
        assert!(qs[0].question.contains("teaching"));
        assert!(qs[1].question.contains("communication"));
        assert!(qs[2].question.contains("punctuality"));
    }

    #[test]
    fn test_admin_serialization_hides_secrets() {
        let admin = Admin {
            id: 1,
            username: "root".into(),
            password_hash: "$argon2id$...".into(),
            refresh_token: Some("tok".into()),
            created_at: "now".into(),
            updated_at: "now".into(),
        };
        let value = serde_json::to_value(&admin).unwrap();
        assert_eq!(value["username"], "root");
        assert!(value.get("passwordHash").is_none());
        assert!(value.get("refreshToken").is_none());
    }

    #[test]
    fn test_form_state_follows_flag() {
        let mut form = FeedbackForm {
            id: 1,
            faculty_id: 2,
            student_id: 3,
            subject: "OS".into(),
            subject_code: "CS301".into(),
            questions: default_questions(),
            attempted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(form.state(), FormState::Unattempted);
        form.attempted = true;
        assert_eq!(form.state(), FormState::Attempted);
    }
}
