use std::sync::Arc;

use actix_web::http::header::{CACHE_CONTROL, RETRY_AFTER};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Deserialize;
use tracing::trace;

use crate::api::constants::{
    HEADER_BACKEND, HEADER_CACHE, HEADER_LOCATION, LOCATION_NOT_FOUND, TOO_MANY_QUERIES,
    UNKNOWN_CLIENT,
};
use crate::errors::WttrError;
use crate::services::{ClientIdentity, WeatherQuery, WeatherRequest, WeatherService};
use crate::utils::ip::{IpNetwork, extract_client_ip};

/// handler 共享状态
#[derive(Clone)]
pub struct WeatherState {
    pub service: Arc<WeatherService>,
    pub trusted_proxies: Arc<[IpNetwork]>,
}

impl WeatherState {
    /// `trusted_proxies` 已在配置加载时解析并校验
    pub fn new(service: Arc<WeatherService>, trusted_proxies: Vec<IpNetwork>) -> Self {
        Self {
            service,
            trusted_proxies: trusted_proxies.into(),
        }
    }
}

/// 查询参数；无法解析的 `days` 按默认值处理
#[derive(Debug, Default, Deserialize)]
pub struct WeatherParams {
    pub lang: Option<String>,
    pub days: Option<String>,
}

impl WeatherParams {
    fn to_query(&self) -> WeatherQuery {
        WeatherQuery::new(
            self.lang.as_deref(),
            self.days.as_deref().and_then(|d| d.trim().parse::<u8>().ok()),
        )
    }
}

pub struct WeatherApi;

impl WeatherApi {
    /// `GET /`：按客户端 IP 定位
    pub async fn current(
        req: HttpRequest,
        params: web::Query<WeatherParams>,
        state: web::Data<WeatherState>,
    ) -> impl Responder {
        Self::serve(&req, None, &params, &state).await
    }

    /// `GET /{location}`：坐标、地名或 IP
    pub async fn at_location(
        req: HttpRequest,
        path: web::Path<String>,
        params: web::Query<WeatherParams>,
        state: web::Data<WeatherState>,
    ) -> impl Responder {
        let location = path.into_inner();
        Self::serve(&req, Some(location), &params, &state).await
    }

    pub async fn favicon() -> impl Responder {
        HttpResponse::NotFound().finish()
    }

    async fn serve(
        req: &HttpRequest,
        location: Option<String>,
        params: &WeatherParams,
        state: &WeatherState,
    ) -> HttpResponse {
        let identity = client_identity(req, &state.trusted_proxies);
        trace!("Weather request from {}", identity);

        let request = WeatherRequest {
            identity,
            location,
            query: params.to_query(),
        };

        match state.service.handle(request).await {
            Ok(response) => HttpResponse::Ok()
                .content_type("application/json")
                .insert_header((HEADER_LOCATION, urlencoding::encode(&response.place).into_owned()))
                .insert_header((HEADER_BACKEND, response.payload.backend))
                .insert_header((
                    HEADER_CACHE,
                    if response.payload.cached { "HIT" } else { "MISS" },
                ))
                .body(response.payload.bytes),
            Err(e) => error_response(&e),
        }
    }
}

/// 客户端身份：规范化后的 IP，无法获取时为 `unknown`
fn client_identity(req: &HttpRequest, trusted_proxies: &[IpNetwork]) -> ClientIdentity {
    match extract_client_ip(req, trusted_proxies) {
        Some(ip) => ClientIdentity::new(ip.to_string()),
        None => ClientIdentity::new(UNKNOWN_CLIENT),
    }
}

pub fn error_response(err: &WttrError) -> HttpResponse {
    match err {
        WttrError::Blocked(_) => HttpResponse::Forbidden()
            .content_type("text/plain; charset=utf-8")
            .body("Forbidden"),
        WttrError::RateLimited {
            retry_after_secs, ..
        } => HttpResponse::TooManyRequests()
            .content_type("text/plain; charset=utf-8")
            .insert_header((RETRY_AFTER, retry_after_secs.to_string()))
            .insert_header((CACHE_CONTROL, "no-store"))
            .body(TOO_MANY_QUERIES),
        WttrError::LocationNotFound(_) => HttpResponse::NotFound()
            .content_type("text/plain; charset=utf-8")
            .body(LOCATION_NOT_FOUND),
        WttrError::ResolutionUnavailable(_) => HttpResponse::ServiceUnavailable()
            .content_type("text/plain; charset=utf-8")
            .body("Location service temporarily unavailable"),
        WttrError::BackendUnavailable(_) => HttpResponse::ServiceUnavailable()
            .content_type("text/plain; charset=utf-8")
            .body("Weather service temporarily unavailable"),
        _ => HttpResponse::InternalServerError()
            .content_type("text/plain; charset=utf-8")
            .body("Internal server error"),
    }
}

pub fn weather_routes() -> actix_web::Scope {
    web::scope("")
        .route("/", web::get().to(WeatherApi::current))
        .route("/favicon.ico", web::get().to(WeatherApi::favicon))
        .route("/{location}", web::get().to(WeatherApi::at_location))
}
