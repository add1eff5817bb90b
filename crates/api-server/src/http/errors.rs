use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use super::views::Views;

pub(super) const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while answering your question. Please try again.";
pub(super) const BLANK_QUERY_MESSAGE: &str = "Please enter a question.";

pub(super) fn error_page_response(views: &Views, status: StatusCode, message: &str) -> Response {
    match views.error_page(status, message) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            error!("failed to render error page: {err}");
            (status, message.to_string()).into_response()
        }
    }
}

pub(super) fn internal_error_response(views: &Views) -> Response {
    error_page_response(
        views,
        StatusCode::INTERNAL_SERVER_ERROR,
        GENERIC_FAILURE_MESSAGE,
    )
}

pub(super) fn blank_query_response(views: &Views) -> Response {
    error_page_response(views, StatusCode::BAD_REQUEST, BLANK_QUERY_MESSAGE)
}
