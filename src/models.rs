//! Domain rows and request DTOs.
//! Rows are mapped by hand from `tokio_postgres::Row`; column names are the
//! exact-cased identifiers the startup reconciler guarantees.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio_postgres::Row;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub gender: String,
    pub registration_date: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl User {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("Id"),
            name: row.get("Name"),
            email: row.get("Email"),
            password_hash: row.get("PasswordHash"),
            phone: row.get("Phone"),
            gender: row.get("Gender"),
            registration_date: row.get("RegistrationDate"),
            last_login: row.get("LastLogin"),
            is_active: row.get("IsActive"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: i32,
    pub course_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("Id"),
            course_name: row.get("CourseName"),
            description: row.get("Description"),
            created_at: row.get("CreatedAt"),
        }
    }
}

/// Emails are stored and compared lowercase.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").unwrap());

// Minimal shape check: one '@' with non-empty sides.
fn looks_like_email(s: &str) -> bool {
    let mut parts = s.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub gender: String,
}

impl RegisterPayload {
    pub fn validate(&self) -> AppResult<()> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(AppError::user("invalid_name", "Name is required and must be at most 100 characters"));
        }
        let email = self.email.trim();
        if email.is_empty() || email.len() > 100 || !looks_like_email(email) {
            return Err(AppError::user("invalid_email", "A valid email address is required"));
        }
        if self.password.len() < 6 {
            return Err(AppError::user("invalid_password", "Password must be at least 6 characters"));
        }
        if !PHONE_RE.is_match(self.phone.trim()) {
            return Err(AppError::user("invalid_phone", "Invalid phone number format"));
        }
        match self.gender.as_str() {
            "Male" | "Female" | "Other" => {}
            _ => return Err(AppError::user("invalid_gender", "Gender must be Male, Female, or Other")),
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

impl LoginPayload {
    pub fn validate(&self) -> AppResult<()> {
        let email = self.email.trim();
        if email.is_empty() || !looks_like_email(email) {
            return Err(AppError::user("invalid_email", "A valid email address is required"));
        }
        if self.password.is_empty() {
            return Err(AppError::user("invalid_password", "Password is required"));
        }
        Ok(())
    }
}
