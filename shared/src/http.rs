//! HTTP helpers for Lambda functions.

use chrono::{Duration, NaiveDate};
use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};
use validator::Validate;

use crate::{Error, Result};

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(
    status: u16,
    data: &T,
) -> std::result::Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Successful JSON envelope for handlers returning `shared::Result`.
pub fn reply<T: Serialize>(status: u16, data: T) -> Result<Response<Body>> {
    let body = serde_json::to_string(&ApiResponse::success(data))?;
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
}

/// Create an error response with the given status code and message.
pub fn error_response(
    status: u16,
    message: impl Into<String>,
) -> std::result::Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::<()>::error(message))
}

/// Create a downloadable binary response.
pub fn binary_response(content_type: &str, filename: &str, bytes: Vec<u8>) -> Result<Response<Body>> {
    Response::builder()
        .status(200)
        .header("content-type", content_type)
        .header(
            "content-disposition",
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::Binary(bytes))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
}

/// Error for requests no route matched.
pub fn route_not_found() -> Error {
    Error::NotFound("Route not found".to_string())
}

/// Turn a handler outcome into a response, mapping library errors onto their status.
pub fn respond(
    result: Result<Response<Body>>,
) -> std::result::Result<Response<Body>, lambda_http::Error> {
    match result {
        Ok(response) => Ok(response),
        Err(e) => {
            let status = e.status_code();
            if status >= 500 {
                error!(error = %e, status, "Request failed");
            } else {
                warn!(error = %e, status, "Request rejected");
            }
            error_response(status, e.public_message())
        }
    }
}

/// Parse a JSON request body.
pub fn json_body<T: DeserializeOwned>(body: &Body) -> Result<T> {
    serde_json::from_slice(body.as_ref())
        .map_err(|e| Error::Validation(format!("Invalid request body: {}", e)))
}

/// Parse a JSON request body and run its `validator` rules.
pub fn validated_body<T: DeserializeOwned + Validate>(body: &Body) -> Result<T> {
    let parsed: T = json_body(body)?;
    parsed.validate()?;
    Ok(parsed)
}

/// Split a request path into segments after `prefix`.
///
/// API Gateway may prepend the stage name, so anything before `prefix` is ignored.
/// Returns `None` when the path does not contain `prefix`.
pub fn path_segments<'a>(path: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let start = path.find(prefix)?;
    let rest = &path[start + prefix.len()..];
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    Some(rest.split('/').filter(|s| !s.is_empty()).collect())
}

/// Parse a UUID path parameter.
pub fn parse_id(raw: &str, what: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|_| Error::Validation(format!("Invalid {} id", what)))
}

/// Limit/offset pagination from query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 200;

    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            limit: limit
                .and_then(|l| l.parse::<i64>().ok())
                .map(|l| l.clamp(1, Self::MAX_LIMIT))
                .unwrap_or(defaults.limit),
            offset: offset
                .and_then(|o| o.parse::<i64>().ok())
                .map(|o| o.max(0))
                .unwrap_or(defaults.offset),
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(Error::Validation(format!(
                "Range end {} is before start {}",
                to, from
            )));
        }
        Ok(Self { from, to })
    }

    /// Parse `from`/`to` query values (`YYYY-MM-DD`); missing bounds take the defaults.
    pub fn from_query(
        from: Option<&str>,
        to: Option<&str>,
        default_from: NaiveDate,
        default_to: NaiveDate,
    ) -> Result<Self> {
        let from = from.map(parse_date).transpose()?.unwrap_or(default_from);
        let to = to.map(parse_date).transpose()?.unwrap_or(default_to);
        Self::new(from, to)
    }

    /// Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn ensure_max_days(&self, max: i64) -> Result<()> {
        if self.days() > max {
            return Err(Error::Validation(format!(
                "Date range may span at most {} days",
                max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Every date in the range, in order.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// `date` moved by `days`, failing with a validation error past the calendar's limits.
pub fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| Error::Validation(format!("Date {} is out of range", date)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(
            path_segments("/v1/children/abc/events", "/v1/children"),
            Some(vec!["abc", "events"])
        );
        assert_eq!(
            path_segments("/prod/v1/children", "/v1/children"),
            Some(vec![])
        );
        assert_eq!(path_segments("/v1/childrenx", "/v1/children"), None);
        assert_eq!(path_segments("/v1/events/1", "/v1/children"), None);
    }

    #[test]
    fn test_pagination() {
        assert_eq!(Pagination::from_query(None, None), Pagination::default());
        let p = Pagination::from_query(Some("1000"), Some("-5"));
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(p.offset, 0);
        let p = Pagination::from_query(Some("abc"), Some("20"));
        assert_eq!(p.limit, 50);
        assert_eq!(p.offset, 20);
    }

    #[test]
    fn test_date_range_from_query() {
        let range = DateRange::from_query(
            Some("2026-03-01"),
            None,
            date(2026, 1, 1),
            date(2026, 3, 31),
        )
        .unwrap();
        assert_eq!(range.from, date(2026, 3, 1));
        assert_eq!(range.days(), 31);
        assert_eq!(range.iter_days().count(), 31);
        assert!(range.contains(date(2026, 3, 31)));
        assert!(!range.contains(date(2026, 4, 1)));
    }

    #[test]
    fn test_date_range_rejects_inverted_and_bad_dates() {
        assert!(DateRange::new(date(2026, 2, 2), date(2026, 2, 1)).is_err());
        assert!(matches!(
            DateRange::from_query(Some("03/01/2026"), None, date(2026, 1, 1), date(2026, 1, 2)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_shift_days_at_calendar_edges() {
        assert_eq!(shift_days(date(2026, 10, 17), -5).unwrap(), date(2026, 10, 12));
        assert!(matches!(
            shift_days(NaiveDate::MAX, 1),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            shift_days(NaiveDate::MIN, -1),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_max_days() {
        let range = DateRange::new(date(2026, 1, 1), date(2026, 12, 31)).unwrap();
        assert!(range.ensure_max_days(365).is_ok());
        assert!(range.ensure_max_days(92).is_err());
    }

    #[test]
    fn test_respond_maps_status() {
        let response = respond(Err(Error::NotFound("Child".into()))).unwrap();
        assert_eq!(response.status(), 404);

        let response = respond(Err(Error::Internal("boom".into()))).unwrap();
        assert_eq!(response.status(), 500);
        let body = std::str::from_utf8(response.body().as_ref()).unwrap().to_string();
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("boom"));
    }

    #[test]
    fn test_reply_envelope() {
        let response = reply(201, serde_json::json!({ "id": 7 })).unwrap();
        assert_eq!(response.status(), 201);
        let body: serde_json::Value = serde_json::from_slice(response.body().as_ref()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 7);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_validated_body() {
        #[derive(Debug, serde::Deserialize, Validate)]
        struct Named {
            #[validate(length(min = 1))]
            name: String,
        }

        let ok: Named = validated_body(&Body::from(r#"{"name":"Ada"}"#)).unwrap();
        assert_eq!(ok.name, "Ada");
        assert!(matches!(
            validated_body::<Named>(&Body::from(r#"{"name":""}"#)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validated_body::<Named>(&Body::from("not json")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_binary_response_headers() {
        let response = binary_response("text/csv", "report.csv", b"a,b\n".to_vec()).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "text/csv");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"report.csv\""
        );
    }
}
