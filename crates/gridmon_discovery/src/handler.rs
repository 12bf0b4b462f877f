//! The discovery handler.

use actix_web::http::header::ContentType;
use actix_web::{web, HttpRequest, HttpResponse};

/// Service name shared by every request.
#[derive(Debug, Clone)]
pub struct ServiceName(pub String);

/// Body announcing the service name, with the name JSON-escaped.
pub fn discovery_body(name: &str) -> String {
    format!("{{\"serviceName\": {}}}", serde_json::Value::String(name.to_string()))
}

/// Answers any method with the service name.
pub async fn discovery(req: HttpRequest, name: web::Data<ServiceName>) -> HttpResponse {
    tracing::debug!(method = %req.method(), path = %req.path(), "Discovery request");
    HttpResponse::Ok().content_type(ContentType::json()).body(discovery_body(&name.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{header, Method, StatusCode};
    use actix_web::{test, App};

    #[::core::prelude::v1::test]
    fn test_body_escapes_name() {
        assert_eq!(discovery_body("gridmon"), r#"{"serviceName": "gridmon"}"#);
        assert_eq!(discovery_body("a\"b"), r#"{"serviceName": "a\"b"}"#);
    }

    #[actix_web::test]
    async fn test_any_method_returns_service_name() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ServiceName("gridmon".to_string())))
                .route("/", web::route().to(discovery)),
        )
        .await;

        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let req = test::TestRequest::default().method(method.clone()).uri("/").to_request();
            let resp = test::call_service(&app, req).await;

            assert_eq!(resp.status(), StatusCode::OK, "method {method}");
            assert_eq!(
                resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
                Some("application/json")
            );
            let body = test::read_body(resp).await;
            assert_eq!(body, r#"{"serviceName": "gridmon"}"#.as_bytes());
        }
    }

    #[actix_web::test]
    async fn test_other_paths_are_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ServiceName("gridmon".to_string())))
                .route("/discovery", web::route().to(discovery)),
        )
        .await;

        let req = test::TestRequest::get().uri("/elsewhere").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
