use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;
use crate::errors::{FeedbackError, FeedbackResult};

/// Async-safe handle to the feedback database.
///
/// Wraps `FeedbackDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<FeedbackDb>>,
}

impl DbHandle {
    pub fn new(db: FeedbackDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> FeedbackResult<R>
    where
        F: FnOnce(&FeedbackDb) -> FeedbackResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| FeedbackError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| FeedbackError::Internal(format!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously, outside the blocking pool.
    /// Tests use it to inspect state between async calls.
    pub fn lock_sync(&self) -> FeedbackResult<std::sync::MutexGuard<'_, FeedbackDb>> {
        self.inner.lock().map_err(|_| FeedbackError::LockPoisoned)
    }
}

pub struct FeedbackDb {
    conn: Connection,
}

const ADMIN_COLUMNS: &str = "id, username, password_hash, refresh_token, created_at, updated_at";
const STUDENT_COLUMNS: &str = "id, admission_no, roll_no, department, section, year, semester, refresh_token, created_at, updated_at";
const FACULTY_COLUMNS: &str = "id, emp_id, name, image, created_at, updated_at";
const FORM_COLUMNS: &str = "id, faculty_id, student_id, subject, subject_code, questions, attempted, created_at, updated_at";

impl FeedbackDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS admins (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    refresh_token TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS students (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    admission_no TEXT NOT NULL UNIQUE,
                    roll_no TEXT NOT NULL UNIQUE,
                    department TEXT NOT NULL,
                    section TEXT NOT NULL,
                    year INTEGER NOT NULL,
                    semester INTEGER NOT NULL,
                    refresh_token TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS faculty (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    emp_id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    image TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS teaching_assignments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    faculty_id INTEGER NOT NULL REFERENCES faculty(id) ON DELETE CASCADE,
                    year INTEGER NOT NULL,
                    department TEXT NOT NULL,
                    section TEXT NOT NULL,
                    semester INTEGER NOT NULL,
                    subject TEXT NOT NULL,
                    subject_code TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS feedback_forms (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    faculty_id INTEGER NOT NULL REFERENCES faculty(id) ON DELETE CASCADE,
                    student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                    subject TEXT NOT NULL,
                    subject_code TEXT NOT NULL,
                    questions TEXT NOT NULL DEFAULT '[]',
                    attempted INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(faculty_id, student_id, subject_code)
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_students_login ON students(admission_no, roll_no);
                CREATE INDEX IF NOT EXISTS idx_assignments_faculty ON teaching_assignments(faculty_id);
                CREATE INDEX IF NOT EXISTS idx_assignments_cohort
                    ON teaching_assignments(year, semester, department, section);
                CREATE INDEX IF NOT EXISTS idx_feedback_student ON feedback_forms(student_id);
                CREATE INDEX IF NOT EXISTS idx_feedback_attempted ON feedback_forms(attempted);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Admins ────────────────────────────────────────────────────────

    /// Returns `None` when the username is already taken.
    pub fn create_admin(&self, username: &str, password_hash: &str) -> Result<Option<Admin>> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO admins (username, password_hash) VALUES (?1, ?2)
                 ON CONFLICT DO NOTHING",
                params![username, password_hash],
            )
            .context("Failed to insert admin")?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_admin(id)
    }

    pub fn get_admin(&self, id: i64) -> Result<Option<Admin>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM admins WHERE id = ?1", ADMIN_COLUMNS),
                params![id],
                admin_from_row,
            )
            .optional()
            .context("Failed to query admin")
    }

    pub fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM admins WHERE username = ?1", ADMIN_COLUMNS),
                params![username],
                admin_from_row,
            )
            .optional()
            .context("Failed to query admin by username")
    }

    pub fn list_admins(&self) -> Result<Vec<Admin>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM admins ORDER BY id", ADMIN_COLUMNS))
            .context("Failed to prepare list_admins")?;
        let rows = stmt
            .query_map([], admin_from_row)
            .context("Failed to query admins")?;
        let mut admins = Vec::new();
        for row in rows {
            admins.push(row.context("Failed to read admin row")?);
        }
        Ok(admins)
    }

    pub fn update_admin_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE admins SET password_hash = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![password_hash, id],
            )
            .context("Failed to update admin password")?;
        Ok(count > 0)
    }

    pub fn delete_admin(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM admins WHERE id = ?1", params![id])
            .context("Failed to delete admin")?;
        Ok(count > 0)
    }

    // ── Refresh tokens ────────────────────────────────────────────────

    /// Replace (or clear, with `None`) the single stored refresh token.
    pub fn set_refresh_token(&self, role: Role, id: i64, token: Option<&str>) -> Result<bool> {
        let table = match role {
            Role::Admin => "admins",
            Role::Student => "students",
        };
        let count = self
            .conn
            .execute(
                &format!("UPDATE {} SET refresh_token = ?1 WHERE id = ?2", table),
                params![token, id],
            )
            .context("Failed to store refresh token")?;
        Ok(count > 0)
    }

    pub fn get_actor(&self, role: Role, id: i64) -> Result<Option<Actor>> {
        Ok(match role {
            Role::Admin => self.get_admin(id)?.map(Actor::Admin),
            Role::Student => self.get_student(id)?.map(Actor::Student),
        })
    }

    // ── Students ──────────────────────────────────────────────────────

    /// Returns `None` when the admission number or roll number is taken.
    pub fn create_student(&self, student: &NewStudent) -> Result<Option<Student>> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO students (admission_no, roll_no, department, section, year, semester)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                params![
                    student.admission_no,
                    student.roll_no,
                    student.department,
                    student.section,
                    student.year,
                    student.semester
                ],
            )
            .context("Failed to insert student")?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_student(id)
    }

    pub fn get_student(&self, id: i64) -> Result<Option<Student>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS),
                params![id],
                student_from_row,
            )
            .optional()
            .context("Failed to query student")
    }

    pub fn find_student_by_login(&self, admission_no: &str, roll_no: &str) -> Result<Option<Student>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM students WHERE admission_no = ?1 AND roll_no = ?2",
                    STUDENT_COLUMNS
                ),
                params![admission_no, roll_no],
                student_from_row,
            )
            .optional()
            .context("Failed to query student by login")
    }

    pub fn delete_student_by_admission_no(&self, admission_no: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM students WHERE admission_no = ?1",
                params![admission_no],
            )
            .context("Failed to delete student")?;
        Ok(count > 0)
    }

    /// Move a student to a different cohort. Existing forms are left alone.
    #[cfg(test)]
    pub fn update_student_cohort(&self, id: i64, cohort: &Cohort) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE students SET year = ?1, semester = ?2, department = ?3, section = ?4,
                 updated_at = datetime('now') WHERE id = ?5",
                params![cohort.year, cohort.semester, cohort.department, cohort.section, id],
            )
            .context("Failed to update student cohort")?;
        Ok(count > 0)
    }

    // ── Faculty ───────────────────────────────────────────────────────

    /// Returns `None` when the employee id is already taken.
    pub fn create_faculty(&self, emp_id: &str, name: &str, image: Option<&str>) -> Result<Option<Faculty>> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO faculty (emp_id, name, image) VALUES (?1, ?2, ?3)
                 ON CONFLICT DO NOTHING",
                params![emp_id, name, image],
            )
            .context("Failed to insert faculty")?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_faculty(id)
    }

    pub fn get_faculty(&self, id: i64) -> Result<Option<Faculty>> {
        let faculty = self
            .conn
            .query_row(
                &format!("SELECT {} FROM faculty WHERE id = ?1", FACULTY_COLUMNS),
                params![id],
                faculty_from_row,
            )
            .optional()
            .context("Failed to query faculty")?;
        faculty.map(|f| self.with_assignments(f)).transpose()
    }

    pub fn find_faculty_by_emp_id(&self, emp_id: &str) -> Result<Option<Faculty>> {
        let faculty = self
            .conn
            .query_row(
                &format!("SELECT {} FROM faculty WHERE emp_id = ?1", FACULTY_COLUMNS),
                params![emp_id],
                faculty_from_row,
            )
            .optional()
            .context("Failed to query faculty by emp_id")?;
        faculty.map(|f| self.with_assignments(f)).transpose()
    }

    pub fn list_faculties(&self) -> Result<Vec<Faculty>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM faculty ORDER BY id", FACULTY_COLUMNS))
            .context("Failed to prepare list_faculties")?;
        let rows = stmt
            .query_map([], faculty_from_row)
            .context("Failed to query faculties")?;
        let mut faculties = Vec::new();
        for row in rows {
            let faculty = row.context("Failed to read faculty row")?;
            faculties.push(self.with_assignments(faculty)?);
        }
        Ok(faculties)
    }

    /// Faculty with at least one assignment for this cohort. Each faculty
    /// carries its full assignment list, matching or not.
    pub fn faculties_teaching(&self, cohort: &Cohort) -> Result<Vec<Faculty>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT faculty_id FROM teaching_assignments
                 WHERE year = ?1 AND semester = ?2 AND department = ?3 AND section = ?4
                 ORDER BY faculty_id",
            )
            .context("Failed to prepare faculties_teaching")?;
        let ids = stmt
            .query_map(
                params![cohort.year, cohort.semester, cohort.department, cohort.section],
                |row| row.get::<_, i64>(0),
            )
            .context("Failed to query matching faculty")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read faculty id")?;

        let mut faculties = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(faculty) = self.get_faculty(id)? {
                faculties.push(faculty);
            }
        }
        Ok(faculties)
    }

    pub fn add_teaching_assignment(&self, faculty_id: i64, assignment: &TeachingAssignment) -> Result<Faculty> {
        self.conn
            .execute(
                "INSERT INTO teaching_assignments
                 (faculty_id, year, department, section, semester, subject, subject_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    faculty_id,
                    assignment.year,
                    assignment.department,
                    assignment.section,
                    assignment.semester,
                    assignment.subject,
                    assignment.subject_code
                ],
            )
            .context("Failed to insert teaching assignment")?;
        self.conn
            .execute(
                "UPDATE faculty SET updated_at = datetime('now') WHERE id = ?1",
                params![faculty_id],
            )
            .context("Failed to touch faculty")?;
        self.get_faculty(faculty_id)?
            .context("Faculty not found after adding assignment")
    }

    pub fn delete_faculty(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM faculty WHERE id = ?1", params![id])
            .context("Failed to delete faculty")?;
        Ok(count > 0)
    }

    fn with_assignments(&self, mut faculty: Faculty) -> Result<Faculty> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT year, department, section, semester, subject, subject_code
                 FROM teaching_assignments WHERE faculty_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare assignment query")?;
        let rows = stmt
            .query_map(params![faculty.id], |row| {
                Ok(TeachingAssignment {
                    year: row.get(0)?,
                    department: row.get(1)?,
                    section: row.get(2)?,
                    semester: row.get(3)?,
                    subject: row.get(4)?,
                    subject_code: row.get(5)?,
                })
            })
            .context("Failed to query assignments")?;
        for row in rows {
            faculty
                .teaches
                .push(row.context("Failed to read assignment row")?);
        }
        Ok(faculty)
    }

    // ── Feedback forms ────────────────────────────────────────────────

    pub fn get_form(&self, id: i64) -> Result<Option<FeedbackForm>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM feedback_forms WHERE id = ?1", FORM_COLUMNS),
                params![id],
                FormRow::from_row,
            )
            .optional()
            .context("Failed to query feedback form")?;
        row.map(FormRow::into_form).transpose()
    }

    pub fn list_forms_for_student(&self, student_id: i64) -> Result<Vec<FeedbackForm>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM feedback_forms WHERE student_id = ?1 ORDER BY id",
                FORM_COLUMNS
            ))
            .context("Failed to prepare list_forms_for_student")?;
        let rows = stmt
            .query_map(params![student_id], FormRow::from_row)
            .context("Failed to query feedback forms")?;
        let mut forms = Vec::new();
        for row in rows {
            forms.push(row.context("Failed to read feedback row")?.into_form()?);
        }
        Ok(forms)
    }

    pub fn form_keys_for_student(&self, student_id: i64) -> Result<HashSet<FormKey>> {
        let mut stmt = self
            .conn
            .prepare("SELECT faculty_id, subject_code FROM feedback_forms WHERE student_id = ?1")
            .context("Failed to prepare form_keys_for_student")?;
        let rows = stmt
            .query_map(params![student_id], |row| {
                Ok(FormKey {
                    faculty_id: row.get(0)?,
                    subject_code: row.get(1)?,
                })
            })
            .context("Failed to query form keys")?;
        let mut keys = HashSet::new();
        for row in rows {
            keys.insert(row.context("Failed to read form key")?);
        }
        Ok(keys)
    }

    /// Insert a batch of forms in one transaction. Rows whose
    /// `(faculty_id, student_id, subject_code)` already exists are skipped.
    /// Returns how many rows were actually inserted.
    pub fn insert_forms(&self, forms: &[NewFeedbackForm]) -> Result<usize> {
        if forms.is_empty() {
            return Ok(0);
        }
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO feedback_forms (faculty_id, student_id, subject, subject_code, questions, attempted)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)
                     ON CONFLICT(faculty_id, student_id, subject_code) DO NOTHING",
                )
                .context("Failed to prepare form insert")?;
            for form in forms {
                let questions = serde_json::to_string(&form.questions)
                    .context("Failed to serialize questions")?;
                inserted += stmt
                    .execute(params![
                        form.faculty_id,
                        form.student_id,
                        form.subject,
                        form.subject_code,
                        questions
                    ])
                    .context("Failed to insert feedback form")?;
            }
        }
        tx.commit().context("Failed to commit form batch")?;
        Ok(inserted)
    }

    /// Store answers and flip `attempted`, but only if the form is still
    /// unattempted. Returns `false` when no row was transitioned.
    pub fn submit_form(&self, id: i64, answers: &[Question]) -> Result<bool> {
        let questions = serde_json::to_string(answers).context("Failed to serialize answers")?;
        let count = self
            .conn
            .execute(
                "UPDATE feedback_forms
                 SET questions = ?1, attempted = 1, updated_at = datetime('now')
                 WHERE id = ?2 AND attempted = 0",
                params![questions, id],
            )
            .context("Failed to submit feedback form")?;
        Ok(count == 1)
    }

    pub fn attempted_form_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM feedback_forms WHERE attempted = 1 ORDER BY id")
            .context("Failed to prepare attempted_form_ids")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .context("Failed to query attempted forms")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read attempted form id")?;
        Ok(ids)
    }

    /// Zero every score and clear `attempted` on one form, if it is
    /// currently attempted. Returns `false` when the form was not attempted.
    pub fn reset_form(&self, id: i64) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let row = tx
            .query_row(
                &format!(
                    "SELECT {} FROM feedback_forms WHERE id = ?1 AND attempted = 1",
                    FORM_COLUMNS
                ),
                params![id],
                FormRow::from_row,
            )
            .optional()
            .context("Failed to load form for reset")?;
        let Some(row) = row else {
            return Ok(false);
        };
        let mut form = row.into_form()?;
        for q in &mut form.questions {
            q.score = 0;
        }
        let questions =
            serde_json::to_string(&form.questions).context("Failed to serialize questions")?;
        let count = tx
            .execute(
                "UPDATE feedback_forms
                 SET questions = ?1, attempted = 0, updated_at = datetime('now')
                 WHERE id = ?2 AND attempted = 1",
                params![questions, id],
            )
            .context("Failed to reset feedback form")?;
        tx.commit().context("Failed to commit form reset")?;
        Ok(count == 1)
    }

    pub fn count_forms(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM feedback_forms", [], |row| row.get(0))
            .context("Failed to count feedback forms")
    }
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        refresh_token: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        admission_no: row.get(1)?,
        roll_no: row.get(2)?,
        department: row.get(3)?,
        section: row.get(4)?,
        year: row.get(5)?,
        semester: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn faculty_from_row(row: &Row<'_>) -> rusqlite::Result<Faculty> {
    Ok(Faculty {
        id: row.get(0)?,
        emp_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
        teaches: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Raw feedback row; `questions` is still JSON text.
struct FormRow {
    id: i64,
    faculty_id: i64,
    student_id: i64,
    subject: String,
    subject_code: String,
    questions: String,
    attempted: bool,
    created_at: String,
    updated_at: String,
}

impl FormRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            faculty_id: row.get(1)?,
            student_id: row.get(2)?,
            subject: row.get(3)?,
            subject_code: row.get(4)?,
            questions: row.get(5)?,
            attempted: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_form(self) -> Result<FeedbackForm> {
        let questions: Vec<Question> = serde_json::from_str(&self.questions)
            .with_context(|| format!("Corrupt questions JSON on feedback form {}", self.id))?;
        Ok(FeedbackForm {
            id: self.id,
            faculty_id: self.faculty_id,
            student_id: self.student_id,
            subject: self.subject,
            subject_code: self.subject_code,
            questions,
            attempted: self.attempted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_student(admission_no: &str, roll_no: &str) -> NewStudent {
        NewStudent {
            admission_no: admission_no.into(),
            roll_no: roll_no.into(),
            department: "CS".into(),
            section: "A".into(),
            year: 2,
            semester: 3,
        }
    }

    fn assignment(section: &str, code: &str) -> TeachingAssignment {
        TeachingAssignment {
            year: 2,
            department: "CS".into(),
            section: section.into(),
            semester: 3,
            subject: "OS".into(),
            subject_code: code.into(),
        }
    }

    fn planned(faculty_id: i64, student_id: i64, code: &str) -> NewFeedbackForm {
        NewFeedbackForm {
            faculty_id,
            student_id,
            subject: "OS".into(),
            subject_code: code.into(),
            questions: default_questions(),
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('admins', 'students', 'faculty', 'teaching_assignments', 'feedback_forms')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 5);

        // Migrations are re-runnable.
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_create_admin_rejects_duplicate_username() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let admin = db.create_admin("root", "hash")?.expect("first insert");
        assert!(admin.id > 0);
        assert_eq!(admin.username, "root");
        assert!(admin.refresh_token.is_none());

        assert!(db.create_admin("root", "other")?.is_none());
        assert_eq!(db.list_admins()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_refresh_token_set_and_clear() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let admin = db.create_admin("root", "hash")?.unwrap();

        assert!(db.set_refresh_token(Role::Admin, admin.id, Some("t1"))?);
        assert!(db.set_refresh_token(Role::Admin, admin.id, Some("t2"))?);
        let stored = db.get_admin(admin.id)?.unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("t2"));

        db.set_refresh_token(Role::Admin, admin.id, None)?;
        assert!(db.get_admin(admin.id)?.unwrap().refresh_token.is_none());

        assert!(!db.set_refresh_token(Role::Student, 999, Some("x"))?);
        Ok(())
    }

    #[test]
    fn test_student_login_key_lookup() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let s = db.create_student(&new_student("adm1", "r1"))?.unwrap();

        assert_eq!(db.find_student_by_login("adm1", "r1")?.unwrap().id, s.id);
        assert!(db.find_student_by_login("adm1", "r2")?.is_none());
        assert!(db.find_student_by_login("adm2", "r1")?.is_none());
        Ok(())
    }

    #[test]
    fn test_student_uniqueness() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        db.create_student(&new_student("adm1", "r1"))?.unwrap();
        assert!(db.create_student(&new_student("adm1", "r9"))?.is_none());
        assert!(db.create_student(&new_student("adm9", "r1"))?.is_none());
        Ok(())
    }

    #[test]
    fn test_faculty_assignments_keep_order_and_duplicates() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f = db.create_faculty("e1", "Ada", None)?.unwrap();
        db.add_teaching_assignment(f.id, &assignment("A", "CS301"))?;
        db.add_teaching_assignment(f.id, &assignment("B", "CS302"))?;
        let f = db.add_teaching_assignment(f.id, &assignment("A", "CS301"))?;

        assert_eq!(f.teaches.len(), 3);
        assert_eq!(f.teaches[1].section, "B");
        assert!(db.create_faculty("e1", "Other", None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_faculties_teaching_filters_by_cohort() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f1 = db.create_faculty("e1", "Ada", None)?.unwrap();
        let f2 = db.create_faculty("e2", "Bob", None)?.unwrap();
        db.add_teaching_assignment(f1.id, &assignment("A", "CS301"))?;
        db.add_teaching_assignment(f1.id, &assignment("B", "CS302"))?;
        db.add_teaching_assignment(f2.id, &assignment("B", "CS303"))?;

        let student = db.create_student(&new_student("adm1", "r1"))?.unwrap();
        let found = db.faculties_teaching(&student.cohort())?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, f1.id);
        // Full assignment list, not only the matching one.
        assert_eq!(found[0].teaches.len(), 2);
        Ok(())
    }

    #[test]
    fn test_insert_forms_skips_existing_keys() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f = db.create_faculty("e1", "Ada", None)?.unwrap();
        let s = db.create_student(&new_student("adm1", "r1"))?.unwrap();

        assert_eq!(db.insert_forms(&[planned(f.id, s.id, "CS301")])?, 1);
        let inserted = db.insert_forms(&[planned(f.id, s.id, "CS301"), planned(f.id, s.id, "CS302")])?;
        assert_eq!(inserted, 1);
        assert_eq!(db.count_forms()?, 2);

        let keys = db.form_keys_for_student(s.id)?;
        assert!(keys.contains(&FormKey {
            faculty_id: f.id,
            subject_code: "CS302".into()
        }));
        Ok(())
    }

    #[test]
    fn test_submit_form_is_compare_and_set() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f = db.create_faculty("e1", "Ada", None)?.unwrap();
        let s = db.create_student(&new_student("adm1", "r1"))?.unwrap();
        db.insert_forms(&[planned(f.id, s.id, "CS301")])?;
        let form = db.list_forms_for_student(s.id)?.remove(0);

        let answers = vec![Question { question: "q".into(), score: 4 }];
        assert!(db.submit_form(form.id, &answers)?);
        assert!(!db.submit_form(form.id, &answers)?);

        let stored = db.get_form(form.id)?.unwrap();
        assert!(stored.attempted);
        assert_eq!(stored.questions, answers);
        Ok(())
    }

    #[test]
    fn test_reset_form_zeroes_scores() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f = db.create_faculty("e1", "Ada", None)?.unwrap();
        let s = db.create_student(&new_student("adm1", "r1"))?.unwrap();
        db.insert_forms(&[planned(f.id, s.id, "CS301")])?;
        let form = db.list_forms_for_student(s.id)?.remove(0);

        assert!(!db.reset_form(form.id)?, "unattempted form is not reset");

        let answers = vec![
            Question { question: "a".into(), score: 5 },
            Question { question: "b".into(), score: 3 },
        ];
        db.submit_form(form.id, &answers)?;
        assert_eq!(db.attempted_form_ids()?, vec![form.id]);

        assert!(db.reset_form(form.id)?);
        let stored = db.get_form(form.id)?.unwrap();
        assert!(!stored.attempted);
        assert!(stored.questions.iter().all(|q| q.score == 0));
        assert_eq!(stored.questions[1].question, "b");
        assert!(db.attempted_form_ids()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_deleting_student_cascades_forms() -> Result<()> {
        let db = FeedbackDb::new_in_memory()?;
        let f = db.create_faculty("e1", "Ada", None)?.unwrap();
        let s = db.create_student(&new_student("adm1", "r1"))?.unwrap();
        db.insert_forms(&[planned(f.id, s.id, "CS301")])?;

        assert!(db.delete_student_by_admission_no("adm1")?);
        assert_eq!(db.count_forms()?, 0);
        assert!(!db.delete_student_by_admission_no("adm1")?);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() {
        let handle = DbHandle::new(FeedbackDb::new_in_memory().unwrap());
        let admin = handle
            .call(|db| Ok(db.create_admin("root", "hash")?))
            .await
            .unwrap()
            .unwrap();
        let fetched = handle
            .call(move |db| Ok(db.get_admin(admin.id)?))
            .await
            .unwrap();
        assert_eq!(fetched.unwrap().username, "root");
    }
}
