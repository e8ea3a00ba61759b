pub mod weather;

pub use weather::{WeatherApi, WeatherParams, WeatherState, error_response, weather_routes};
