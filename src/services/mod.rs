//! Service layer
//!
//! Per-request components (blacklist, location aliases, rate limiter, geolocation,
//! weather backends, request logging) and the pipeline that wires them together.

pub mod aliases;
pub mod backend;
pub mod blacklist;
pub mod geoip;
pub mod http;
pub mod rate_limit;
pub mod request_log;
mod weather;

pub use backend::{BackendMode, BackendSelector, Payload, WeatherBackend, WeatherLocation, WeatherQuery};
pub use aliases::LocationAliases;
pub use blacklist::Blacklist;
pub use geoip::{
    GeoResolver, Location, LocationProvider, PlaceGeocoder, PlaceResolution, ProviderError, Resolution,
};
pub use rate_limit::{Admission, RateLimiter, RateWindow, Rejection};
pub use request_log::{ACCESS_LOG_TARGET, AccessOutcome, AlertSink, RequestLog, TracingAlertSink};
pub use weather::{ClientIdentity, WeatherRequest, WeatherResponse, WeatherService};
