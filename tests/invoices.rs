mod helpers;

use chrono::NaiveDate;
use helpers::{domain_error, student};
use registrar::data::invoices::{self, NewInvoice, NewPayment};
use registrar::data::models::InvoiceStatus;
use registrar::registrar::RegistrarError;
use sqlx::PgPool;

fn tuition(amount_cents: i64) -> NewInvoice {
    NewInvoice {
        description: "Fall tuition".to_owned(),
        amount_cents,
        due_date: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
    }
}

fn payment(amount_cents: i64) -> NewPayment {
    NewPayment {
        amount_cents,
        method: "card".to_owned(),
    }
}

#[sqlx::test]
async fn payments_settle_an_invoice(pool: PgPool) {
    let st = student(&pool, 1).await;
    let invoice = invoices::create(&pool, st.id, tuition(100_000)).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Open);

    let detail = invoices::record_payment(&pool, invoice.id, payment(40_000))
        .await
        .unwrap();
    assert_eq!(detail.paid_cents, 40_000);
    assert_eq!(detail.balance_cents, 60_000);
    assert_eq!(detail.invoice.status, InvoiceStatus::Open);

    let err = invoices::record_payment(&pool, invoice.id, payment(60_001))
        .await
        .unwrap_err();
    assert_eq!(
        domain_error(&err),
        Some(&RegistrarError::Overpayment {
            amount_cents: 60_001,
            balance_cents: 60_000
        })
    );

    let detail = invoices::record_payment(&pool, invoice.id, payment(60_000))
        .await
        .unwrap();
    assert_eq!(detail.balance_cents, 0);
    assert_eq!(detail.invoice.status, InvoiceStatus::Paid);
    assert_eq!(detail.payments.len(), 2);

    let err = invoices::record_payment(&pool, invoice.id, payment(1))
        .await
        .unwrap_err();
    assert!(matches!(
        domain_error(&err),
        Some(RegistrarError::InvoiceClosed { .. })
    ));
}

#[sqlx::test]
async fn void_only_untouched_open_invoices(pool: PgPool) {
    let st = student(&pool, 1).await;
    let untouched = invoices::create(&pool, st.id, tuition(5_000)).await.unwrap();
    let partly_paid = invoices::create(&pool, st.id, tuition(5_000)).await.unwrap();
    invoices::record_payment(&pool, partly_paid.id, payment(1_000))
        .await
        .unwrap();

    let voided = invoices::void(&pool, untouched.id).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Void);

    let err = invoices::void(&pool, untouched.id).await.unwrap_err();
    assert!(matches!(
        domain_error(&err),
        Some(RegistrarError::InvoiceClosed { .. })
    ));

    let err = invoices::void(&pool, partly_paid.id).await.unwrap_err();
    assert_eq!(domain_error(&err), Some(&RegistrarError::InvoiceHasPayments));

    let listed = invoices::list_for_student(&pool, st.id).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[sqlx::test]
async fn concurrent_payments_cannot_overpay(pool: PgPool) {
    let st = student(&pool, 1).await;
    let invoice = invoices::create(&pool, st.id, tuition(10_000)).await.unwrap();

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let pool = pool.clone();
        let id = invoice.id;
        set.spawn(async move { invoices::record_payment(&pool, id, payment(4_000)).await });
    }
    let mut accepted = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap().is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 2);

    let detail = invoices::get_detail(&pool, invoice.id).await.unwrap().unwrap();
    assert_eq!(detail.paid_cents, 8_000);
    assert_eq!(detail.balance_cents, 2_000);
}

#[sqlx::test]
async fn missing_invoice_and_student(pool: PgPool) {
    let err = invoices::record_payment(&pool, 999, payment(100)).await.unwrap_err();
    assert_eq!(domain_error(&err), Some(&RegistrarError::InvoiceNotFound(999)));

    let err = invoices::create(&pool, 999, tuition(100)).await.unwrap_err();
    assert_eq!(domain_error(&err), Some(&RegistrarError::StudentNotFound(999)));

    assert!(invoices::get_detail(&pool, 999).await.unwrap().is_none());
}
