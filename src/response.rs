use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Envelope shared by every JSON response, success or failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    pub fn failure(message: impl Into<String>, data: T) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: Some(data),
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_envelope_carries_error_code() {
        let body = ApiResponse::failure("Forbidden", json!({ "error": "forbidden" }));
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["ok"], json!(false));
        assert_eq!(value["data"]["error"], json!("forbidden"));
        assert_eq!(value["meta"]["page"], json!(null));
    }

    #[test]
    fn paged_success_reports_totals() {
        let body = ApiResponse::success("Products", Vec::<u8>::new(), Some(Meta::new(2, 20, 41)));
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["ok"], json!(true));
        assert_eq!(value["meta"]["total"], json!(41));
    }
}
