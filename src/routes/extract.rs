//! Request extractors whose rejections render through [`AppError`], so a
//! malformed body, path or query string gets the usual JSON envelope with a
//! 400 instead of axum's plain-text 422.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        routing::post,
    };
    use serde::Deserialize;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct LineBody {
        qty: i32,
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        page: Option<i64>,
    }

    async fn handler(
        AppPath(id): AppPath<Uuid>,
        AppQuery(filter): AppQuery<Filter>,
        AppJson(body): AppJson<LineBody>,
    ) -> String {
        format!("{id}:{:?}:{}", filter.page, body.qty)
    }

    fn app() -> Router {
        Router::new().route("/items/{id}", post(handler))
    }

    async fn send(
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::post(uri);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let response = app()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    const ID: &str = "7f0b1c1e-2a63-4c1e-9a53-1f1f3c0d8b11";

    #[tokio::test]
    async fn well_formed_requests_pass_through() {
        let response = app()
            .oneshot(
                Request::post(format!("/items/{ID}?page=2"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"qty":3}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_fields_are_a_json_400() {
        let (status, json) = send(&format!("/items/{ID}"), Some("application/json"), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["ok"], false);
        assert_eq!(json["data"]["error"], "bad_request");
    }

    #[tokio::test]
    async fn wrong_content_type_is_a_json_400() {
        let (status, json) = send(&format!("/items/{ID}"), None, r#"{"qty":1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["data"]["error"], "bad_request");
    }

    #[tokio::test]
    async fn bad_path_and_query_values_are_a_json_400() {
        let (status, json) =
            send("/items/not-a-uuid", Some("application/json"), r#"{"qty":1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["data"]["error"], "bad_request");

        let (status, json) = send(
            &format!("/items/{ID}?page=first"),
            Some("application/json"),
            r#"{"qty":1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["data"]["error"], "bad_request");
    }
}
