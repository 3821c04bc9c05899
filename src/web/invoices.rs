//! Student invoice and payment handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::{info, instrument};

use crate::data::invoices::{self, InvoiceDetail, NewInvoice, NewPayment};
use crate::data::models::Invoice;
use crate::data::students;
use crate::state::AppState;
use crate::web::auth::extractors::{AdminClient, ApiClient};
use crate::web::error::{ApiError, OptionNotFoundExt, db_error, registrar_error};

/// `GET /api/students/{id}/invoices`
#[instrument(skip_all, fields(student_id = student_id))]
pub async fn list_student_invoices(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(student_id): Path<i32>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    students::require(&state.db_pool, student_id)
        .await
        .map_err(|e| registrar_error("list invoices", e))?;
    let rows = invoices::list_for_student(&state.db_pool, student_id)
        .await
        .map_err(|e| db_error("list invoices", e))?;
    Ok(Json(rows))
}

/// `POST /api/students/{id}/invoices`
#[instrument(skip_all, fields(student_id = student_id))]
pub async fn create_invoice(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(student_id): Path<i32>,
    Json(body): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let invoice = invoices::create(&state.db_pool, student_id, body)
        .await
        .map_err(|e| registrar_error("create invoice", e))?;

    info!(
        invoice_id = invoice.id,
        student_id,
        amount_cents = invoice.amount_cents,
        "invoice created"
    );
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// `GET /api/invoices/{id}`
#[instrument(skip_all, fields(invoice_id = id))]
pub async fn get_invoice(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let detail = invoices::get_detail(&state.db_pool, id)
        .await
        .map_err(|e| db_error("get invoice", e))?
        .or_not_found("Invoice", id)?;
    Ok(Json(detail))
}

/// `POST /api/invoices/{id}/payments`
#[instrument(skip_all, fields(invoice_id = id))]
pub async fn record_payment(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<NewPayment>,
) -> Result<(StatusCode, Json<InvoiceDetail>), ApiError> {
    let detail = invoices::record_payment(&state.db_pool, id, body)
        .await
        .map_err(|e| registrar_error("record payment", e))?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// `POST /api/invoices/{id}/void`
#[instrument(skip_all, fields(invoice_id = id))]
pub async fn void_invoice(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = invoices::void(&state.db_pool, id)
        .await
        .map_err(|e| registrar_error("void invoice", e))?;
    Ok(Json(invoice))
}
