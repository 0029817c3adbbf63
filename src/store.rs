//! SQL data access over the shared connection.
//! Identifiers in these statements are the exact-cased names the startup
//! reconciler guarantees; all values travel as bound parameters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::db::SharedDb;
use crate::models::{Course, User};

const USER_COLS: &str = "\"Id\", \"Name\", \"Email\", \"PasswordHash\", \"Phone\", \"Gender\", \
                         \"RegistrationDate\", \"LastLogin\", \"IsActive\"";

pub async fn email_exists(db: &SharedDb, email: &str) -> Result<bool> {
    let row = db
        .0
        .query_one("SELECT EXISTS(SELECT 1 FROM \"Users\" WHERE \"Email\" = $1)", &[&email])
        .await
        .context("email existence lookup failed")?;
    Ok(row.get(0))
}

pub async fn insert_user(
    db: &SharedDb,
    name: &str,
    email: &str,
    password_hash: &str,
    phone: &str,
    gender: &str,
) -> Result<i32> {
    let now: DateTime<Utc> = Utc::now();
    let row = db
        .0
        .query_one(
            "INSERT INTO \"Users\" (\"Name\", \"Email\", \"PasswordHash\", \"Phone\", \"Gender\", \
             \"RegistrationDate\", \"IsActive\") VALUES ($1, $2, $3, $4, $5, $6, true) RETURNING \"Id\"",
            &[&name, &email, &password_hash, &phone, &gender, &now],
        )
        .await
        .context("user insert failed")?;
    Ok(row.get(0))
}

pub async fn find_user_by_email(db: &SharedDb, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM \"Users\" WHERE \"Email\" = $1", USER_COLS);
    let row = db
        .0
        .query_opt(sql.as_str(), &[&email])
        .await
        .context("user lookup by email failed")?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn find_user_by_id(db: &SharedDb, id: i32) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM \"Users\" WHERE \"Id\" = $1", USER_COLS);
    let row = db
        .0
        .query_opt(sql.as_str(), &[&id])
        .await
        .context("user lookup by id failed")?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn touch_last_login(db: &SharedDb, id: i32, when: DateTime<Utc>) -> Result<()> {
    db.0
        .execute("UPDATE \"Users\" SET \"LastLogin\" = $2 WHERE \"Id\" = $1", &[&id, &when])
        .await
        .context("last-login update failed")?;
    Ok(())
}

pub async fn list_active_users(db: &SharedDb) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM \"Users\" WHERE \"IsActive\" ORDER BY \"Id\"", USER_COLS);
    let rows = db
        .0
        .query(sql.as_str(), &[])
        .await
        .context("active user listing failed")?;
    Ok(rows.iter().map(User::from_row).collect())
}

/// Total and active user counts for the stats endpoint.
pub async fn user_stats(db: &SharedDb) -> Result<(i64, i64)> {
    let row = db
        .0
        .query_one(
            "SELECT count(*), count(*) FILTER (WHERE \"IsActive\") FROM \"Users\"",
            &[],
        )
        .await
        .context("user stats query failed")?;
    Ok((row.get(0), row.get(1)))
}

pub async fn list_courses(db: &SharedDb) -> Result<Vec<Course>> {
    let rows = db
        .0
        .query(
            "SELECT \"Id\", \"CourseName\", \"Description\", \"CreatedAt\" FROM \"Courses\" ORDER BY \"Id\"",
            &[],
        )
        .await
        .context("course listing failed")?;
    Ok(rows.iter().map(Course::from_row).collect())
}
