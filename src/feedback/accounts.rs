//! Admin and student credentials: registration, login and password changes.
//!
//! Admins authenticate with a username and an argon2-hashed password.
//! Students have no password: the `(admission_no, roll_no)` pair is the whole
//! credential. Both login paths return one message for every failure so a
//! caller cannot tell which half of the credential was wrong.

use serde::Deserialize;
use tracing::{info, warn};

use super::db::DbHandle;
use super::models::{Admin, Student};
use super::password::{hash_password, verify_password};
use crate::errors::{FeedbackError, FeedbackResult};

pub const INVALID_ADMIN_LOGIN: &str = "Invalid username or password";
pub const INVALID_STUDENT_LOGIN: &str = "Invalid admission number or roll number";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAdminRequest {
    pub username: String,
    pub password: String,
    pub secret_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLoginRequest {
    pub admission_no: String,
    pub roll_no: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Admission numbers are stored lowercase; lookups must normalize the same way.
pub fn normalize_admission_no(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub async fn register_admin(
    db: &DbHandle,
    registration_secret: &str,
    req: RegisterAdminRequest,
) -> FeedbackResult<Admin> {
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() || req.secret_code.is_empty() {
        return Err(FeedbackError::validation(
            "username, password and secretCode are required",
        ));
    }
    if registration_secret.is_empty() || req.secret_code != registration_secret {
        warn!(username = %username, "Admin registration with wrong secret code");
        return Err(FeedbackError::forbidden("Invalid registration secret"));
    }

    let lookup = username.clone();
    if db
        .call(move |db| Ok(db.find_admin_by_username(&lookup)?))
        .await?
        .is_some()
    {
        return Err(FeedbackError::conflict("Admin already exists"));
    }

    let hash = hash_blocking(req.password).await?;
    let created = db
        .call(move |db| Ok(db.create_admin(&username, &hash)?))
        .await?
        .ok_or_else(|| FeedbackError::conflict("Admin already exists"))?;
    info!(admin_id = created.id, username = %created.username, "Registered admin");
    Ok(created)
}

pub async fn login_admin(db: &DbHandle, req: AdminLoginRequest) -> FeedbackResult<Admin> {
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(FeedbackError::validation("username and password are required"));
    }
    let admin = db
        .call(move |db| Ok(db.find_admin_by_username(&username)?))
        .await?
        .ok_or_else(|| FeedbackError::auth(INVALID_ADMIN_LOGIN))?;

    let stored = admin.password_hash.clone();
    if !verify_blocking(req.password, stored).await? {
        return Err(FeedbackError::auth(INVALID_ADMIN_LOGIN));
    }
    Ok(admin)
}

pub async fn change_password(
    db: &DbHandle,
    admin: &Admin,
    req: ChangePasswordRequest,
) -> FeedbackResult<()> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(FeedbackError::validation(
            "oldPassword and newPassword are required",
        ));
    }
    if !verify_blocking(req.old_password, admin.password_hash.clone()).await? {
        return Err(FeedbackError::auth("Old password is incorrect"));
    }
    let hash = hash_blocking(req.new_password).await?;
    let id = admin.id;
    let updated = db
        .call(move |db| Ok(db.update_admin_password(id, &hash)?))
        .await?;
    if !updated {
        return Err(FeedbackError::not_found("Admin not found"));
    }
    info!(admin_id = id, "Admin password changed");
    Ok(())
}

pub async fn delete_admin(db: &DbHandle, id: i64) -> FeedbackResult<()> {
    if !db.call(move |db| Ok(db.delete_admin(id)?)).await? {
        return Err(FeedbackError::not_found("Admin not found"));
    }
    info!(admin_id = id, "Deleted admin");
    Ok(())
}

pub async fn list_admins(db: &DbHandle) -> FeedbackResult<Vec<Admin>> {
    db.call(|db| Ok(db.list_admins()?)).await
}

pub async fn login_student(db: &DbHandle, req: StudentLoginRequest) -> FeedbackResult<Student> {
    let admission_no = normalize_admission_no(&req.admission_no);
    let roll_no = req.roll_no.trim().to_string();
    if admission_no.is_empty() || roll_no.is_empty() {
        return Err(FeedbackError::validation("admissionNo and rollNo are required"));
    }
    db.call(move |db| Ok(db.find_student_by_login(&admission_no, &roll_no)?))
        .await?
        .ok_or_else(|| FeedbackError::auth(INVALID_STUDENT_LOGIN))
}

// Argon2 work runs on the blocking pool.
async fn hash_blocking(password: String) -> FeedbackResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| FeedbackError::Internal(format!("Hash task panicked: {}", e)))?
}

async fn verify_blocking(password: String, stored_hash: String) -> FeedbackResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| FeedbackError::Internal(format!("Verify task panicked: {}", e)))?
}
