//! Admin-managed records: students, faculty, teaching assignments and
//! faculty images.

use std::sync::Arc;

use tracing::{error, info};

use super::accounts::normalize_admission_no;
use super::blob::{BlobStore, image_mime};
use super::db::DbHandle;
use super::models::{Faculty, NewStudent, Student, TeachingAssignment};
use crate::errors::{FeedbackError, FeedbackResult};

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFaculty {
    pub emp_id: String,
    pub name: String,
}

pub fn normalize_emp_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub async fn add_student(db: &DbHandle, mut student: NewStudent) -> FeedbackResult<Student> {
    student.validate()?;
    student.admission_no = normalize_admission_no(&student.admission_no);
    student.roll_no = student.roll_no.trim().to_string();

    let created = db
        .call(move |db| Ok(db.create_student(&student)?))
        .await?
        .ok_or_else(|| {
            FeedbackError::conflict("Student with this admission number or roll number already exists")
        })?;
    info!(student_id = created.id, admission_no = %created.admission_no, "Added student");
    Ok(created)
}

pub async fn delete_student(db: &DbHandle, admission_no: &str) -> FeedbackResult<()> {
    let admission_no = normalize_admission_no(admission_no);
    let key = admission_no.clone();
    if !db
        .call(move |db| Ok(db.delete_student_by_admission_no(&key)?))
        .await?
    {
        return Err(FeedbackError::not_found("Student not found"));
    }
    info!(admission_no = %admission_no, "Deleted student");
    Ok(())
}

/// Create a faculty record with its image.
///
/// The duplicate check runs before the upload. If the insert still fails
/// after the upload, the stored image is removed again.
pub async fn add_faculty(
    db: &DbHandle,
    blobs: &Arc<dyn BlobStore>,
    faculty: NewFaculty,
    image: Option<ImageUpload>,
) -> FeedbackResult<Faculty> {
    let emp_id = normalize_emp_id(&faculty.emp_id);
    let name = faculty.name.trim().to_string();
    if emp_id.is_empty() || name.is_empty() {
        return Err(FeedbackError::validation("empId and name are required"));
    }
    let image = image
        .filter(|i| !i.bytes.is_empty())
        .ok_or_else(|| FeedbackError::validation("image is required"))?;
    image_mime(&image.file_name, image.content_type.as_deref())?;

    let lookup = emp_id.clone();
    if db
        .call(move |db| Ok(db.find_faculty_by_emp_id(&lookup)?))
        .await?
        .is_some()
    {
        return Err(FeedbackError::conflict("Faculty already exists"));
    }

    let url = blobs.upload(image.bytes, &image.file_name).await?;

    let stored_url = url.clone();
    let inserted = db
        .call(move |db| Ok(db.create_faculty(&emp_id, &name, Some(&stored_url))?))
        .await
        .and_then(|f| f.ok_or_else(|| FeedbackError::conflict("Faculty already exists")));

    match inserted {
        Ok(created) => {
            info!(faculty_id = created.id, emp_id = %created.emp_id, "Added faculty");
            Ok(created)
        }
        Err(e) => {
            if let Err(cleanup) = blobs.delete(&url).await {
                error!(url = %url, error = %cleanup, "Failed to remove orphaned faculty image");
            }
            Err(e)
        }
    }
}

pub async fn add_teaching(
    db: &DbHandle,
    emp_id: &str,
    assignment: TeachingAssignment,
) -> FeedbackResult<Faculty> {
    assignment.validate()?;
    let emp_id = normalize_emp_id(emp_id);
    db.call(move |db| {
        let faculty = db
            .find_faculty_by_emp_id(&emp_id)?
            .ok_or_else(|| FeedbackError::not_found("Faculty not found"))?;
        let updated = db.add_teaching_assignment(faculty.id, &assignment)?;
        info!(
            faculty_id = updated.id,
            subject_code = %assignment.subject_code,
            "Added teaching assignment"
        );
        Ok(updated)
    })
    .await
}

/// Delete a faculty record. The image is removed first; if that fails the
/// record is kept and the error is returned.
pub async fn delete_faculty(
    db: &DbHandle,
    blobs: &Arc<dyn BlobStore>,
    emp_id: &str,
) -> FeedbackResult<()> {
    let emp_id = normalize_emp_id(emp_id);
    let lookup = emp_id.clone();
    let faculty = db
        .call(move |db| Ok(db.find_faculty_by_emp_id(&lookup)?))
        .await?
        .ok_or_else(|| FeedbackError::not_found("Faculty not found"))?;

    if let Some(url) = &faculty.image {
        blobs.delete(url).await?;
    }

    let id = faculty.id;
    if !db.call(move |db| Ok(db.delete_faculty(id)?)).await? {
        return Err(FeedbackError::not_found("Faculty not found"));
    }
    info!(faculty_id = id, emp_id = %emp_id, "Deleted faculty");
    Ok(())
}

pub async fn list_faculties(db: &DbHandle) -> FeedbackResult<Vec<Faculty>> {
    db.call(|db| Ok(db.list_faculties()?)).await
}
