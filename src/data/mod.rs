//! Database access for the registrar. All SQL lives here; the web layer only
//! translates between HTTP and these functions.

pub mod audit;
pub mod courses;
pub mod enrollments;
pub mod health;
pub mod invoices;
pub mod models;
pub mod students;
pub mod waitlist;

/// Name of the unique constraint a failed statement violated, if any.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

/// Clamp pagination inputs and return `(limit, offset)`.
pub(crate) fn page_bounds(page: i32, per_page: i32) -> (i64, i64) {
    let page = page.max(1);
    let per_page = per_page.clamp(1, 200);
    (i64::from(per_page), i64::from(page - 1) * i64::from(per_page))
}
