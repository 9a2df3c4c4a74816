use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use std::sync::Arc;
use tera::Context;

use crate::certificates::verification::{verify, Verification};
use crate::error::AppError;
use crate::pdf::layout::format_award_date;
use crate::state::AppState;

/// Human-facing page behind every QR code.
pub async fn verify_page(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let (status, ctx) = match verify(&state.store, &code).await {
        Ok(verification) => (StatusCode::OK, verification_context(&code, Some(&verification))),
        Err(AppError::NotFound { .. } | AppError::Validation(_)) => {
            (StatusCode::NOT_FOUND, verification_context(&code, None))
        }
        Err(e) => {
            tracing::error!(error = %e, "Verification page lookup failed");
            let mut ctx = verification_context(&code, None);
            ctx.insert("outcome", "error");
            (StatusCode::INTERNAL_SERVER_ERROR, ctx)
        }
    };
    (status, render_template("verify.html", &ctx))
}

fn verification_context(code: &str, verification: Option<&Verification>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("code", code.trim());
    match verification {
        None => ctx.insert("outcome", "not_found"),
        Some(Verification::Valid(cert)) => {
            ctx.insert("outcome", "valid");
            ctx.insert("certificate_code", &cert.certificate_code);
            ctx.insert("student_name", &cert.student_name);
            ctx.insert("course_name", &cert.course_name);
            ctx.insert("institute_name", &cert.institute_name);
            ctx.insert("award_date", &format_award_date(cert.award_date));
            ctx.insert("issued_at", &cert.issued_at.format("%B %d, %Y").to_string());
        }
        Some(Verification::Revoked(cert)) => {
            ctx.insert("outcome", "revoked");
            ctx.insert("certificate_code", &cert.certificate_code);
            ctx.insert("student_name", &cert.student_name);
            ctx.insert("course_name", &cert.course_name);
            let revoked_at = cert
                .revoked_at
                .map(|at| at.format("%B %d, %Y").to_string())
                .unwrap_or_default();
            ctx.insert("revoked_at", &revoked_at);
        }
    }
    ctx
}

fn render_template(name: &str, ctx: &Context) -> Html<String> {
    let tera = crate::templates::get_tera();
    let rendered = tera.render(name, ctx).unwrap_or_else(|e| {
        tracing::error!(template = name, error = %e, "Template rendering failed");
        format!("Template error: {}", name)
    });
    Html(rendered)
}
