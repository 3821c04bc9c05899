//! Student invoices and payments.
//!
//! A payment references exactly one invoice and never exceeds its remaining
//! balance. Recording a payment locks the invoice row so concurrent payments
//! can't both pass the balance check.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use ts_rs::TS;

use crate::data::models::{Invoice, InvoiceStatus, Payment};
use crate::data::students;
use crate::registrar::RegistrarError;

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewInvoice {
    pub description: String,
    #[ts(type = "number")]
    pub amount_cents: i64,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewPayment {
    #[ts(type = "number")]
    pub amount_cents: i64,
    pub method: String,
}

/// An invoice with its payments and what is still owed.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
    #[ts(type = "number")]
    pub paid_cents: i64,
    #[ts(type = "number")]
    pub balance_cents: i64,
}

impl InvoiceDetail {
    fn new(invoice: Invoice, payments: Vec<Payment>) -> Self {
        let paid_cents: i64 = payments.iter().map(|p| p.amount_cents).sum();
        let balance_cents = (invoice.amount_cents - paid_cents).max(0);
        Self {
            invoice,
            payments,
            paid_cents,
            balance_cents,
        }
    }
}

/// Check a payment against an invoice's state and remaining balance.
pub fn check_payment(
    status: InvoiceStatus,
    balance_cents: i64,
    amount_cents: i64,
) -> Result<(), RegistrarError> {
    if amount_cents <= 0 {
        return Err(RegistrarError::validation("amountCents", "must be positive"));
    }
    match status {
        InvoiceStatus::Open => {}
        InvoiceStatus::Paid => {
            return Err(RegistrarError::InvoiceClosed {
                status: "paid".to_owned(),
            });
        }
        InvoiceStatus::Void => {
            return Err(RegistrarError::InvoiceClosed {
                status: "void".to_owned(),
            });
        }
    }
    if amount_cents > balance_cents {
        return Err(RegistrarError::Overpayment {
            amount_cents,
            balance_cents,
        });
    }
    Ok(())
}

pub async fn create(pool: &PgPool, student_id: i32, new: NewInvoice) -> Result<Invoice> {
    let description = new.description.trim();
    if description.is_empty() {
        return Err(RegistrarError::validation("description", "must not be empty").into());
    }
    if new.amount_cents <= 0 {
        return Err(RegistrarError::validation("amountCents", "must be positive").into());
    }
    students::require(pool, student_id).await?;

    sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (student_id, description, amount_cents, due_date)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(description)
    .bind(new.amount_cents)
    .bind(new.due_date)
    .fetch_one(pool)
    .await
    .context("failed to insert invoice")
}

pub async fn list_for_student(pool: &PgPool, student_id: i32) -> Result<Vec<Invoice>> {
    sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE student_id = $1 ORDER BY due_date, id",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .context("failed to list invoices")
}

async fn payments_for<'e>(executor: impl PgExecutor<'e>, invoice_id: i32) -> Result<Vec<Payment>> {
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY paid_at, id",
    )
    .bind(invoice_id)
    .fetch_all(executor)
    .await
    .context("failed to fetch payments")
}

pub async fn get_detail(pool: &PgPool, id: i32) -> Result<Option<InvoiceDetail>> {
    let Some(invoice) = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch invoice")?
    else {
        return Ok(None);
    };
    let payments = payments_for(pool, id).await?;
    Ok(Some(InvoiceDetail::new(invoice, payments)))
}

/// Record a payment. The invoice flips to `paid` once nothing is owed.
pub async fn record_payment(pool: &PgPool, invoice_id: i32, new: NewPayment) -> Result<InvoiceDetail> {
    let method = new.method.trim();
    if method.is_empty() {
        return Err(RegistrarError::validation("method", "must not be empty").into());
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to lock invoice")?
        .ok_or(RegistrarError::InvoiceNotFound(invoice_id))?;

    let paid = InvoiceDetail::new(invoice.clone(), payments_for(&mut *tx, invoice_id).await?);
    check_payment(invoice.status, paid.balance_cents, new.amount_cents)?;

    sqlx::query("INSERT INTO payments (invoice_id, amount_cents, method) VALUES ($1, $2, $3)")
        .bind(invoice_id)
        .bind(new.amount_cents)
        .bind(method)
        .execute(&mut *tx)
        .await
        .context("failed to insert payment")?;

    if new.amount_cents == paid.balance_cents {
        sqlx::query("UPDATE invoices SET status = 'paid' WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .context("failed to mark invoice paid")?;
    }

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to reload invoice")?;
    let payments = payments_for(&mut *tx, invoice_id).await?;
    tx.commit().await.context("failed to commit payment")?;

    let detail = InvoiceDetail::new(invoice, payments);
    info!(
        invoice_id,
        amount_cents = new.amount_cents,
        balance_cents = detail.balance_cents,
        "payment recorded"
    );
    Ok(detail)
}

/// Void an open invoice that has no payments.
pub async fn void(pool: &PgPool, invoice_id: i32) -> Result<Invoice> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to lock invoice")?
        .ok_or(RegistrarError::InvoiceNotFound(invoice_id))?;

    if invoice.status != InvoiceStatus::Open {
        let status = if invoice.status == InvoiceStatus::Paid {
            "paid"
        } else {
            "void"
        };
        return Err(RegistrarError::InvoiceClosed {
            status: status.to_owned(),
        }
        .into());
    }
    if !payments_for(&mut *tx, invoice_id).await?.is_empty() {
        return Err(RegistrarError::InvoiceHasPayments.into());
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET status = 'void' WHERE id = $1 RETURNING *",
    )
    .bind(invoice_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to void invoice")?;
    tx.commit().await.context("failed to commit invoice void")?;

    info!(invoice_id, "invoice voided");
    Ok(invoice)
}
