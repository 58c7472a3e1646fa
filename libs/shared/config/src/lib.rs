use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub queue_average_service_minutes: u32,
    pub queue_service_time_smoothing: Option<f64>,
    pub queue_event_buffer: usize,
    pub queue_archive_after_minutes: i64,
    pub queue_maintenance_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            queue_average_service_minutes: 15,
            queue_service_time_smoothing: None,
            queue_event_buffer: 256,
            queue_archive_after_minutes: 240,
            queue_maintenance_interval_seconds: 60,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| {
                warn!("SERVER_HOST not set, using default");
                defaults.server_host.clone()
            }),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            queue_average_service_minutes: parse_var(
                "QUEUE_AVERAGE_SERVICE_MINUTES",
                defaults.queue_average_service_minutes,
            ),
            queue_service_time_smoothing: match env::var("QUEUE_SERVICE_TIME_SMOOTHING") {
                Ok(raw) => match raw.parse::<f64>() {
                    Ok(alpha) => Some(alpha),
                    Err(_) => {
                        warn!("QUEUE_SERVICE_TIME_SMOOTHING is not a number, using fixed service time");
                        None
                    }
                },
                Err(_) => None,
            },
            queue_event_buffer: parse_var("QUEUE_EVENT_BUFFER", defaults.queue_event_buffer),
            queue_archive_after_minutes: parse_var(
                "QUEUE_ARCHIVE_AFTER_MINUTES",
                defaults.queue_archive_after_minutes,
            ),
            queue_maintenance_interval_seconds: parse_var(
                "QUEUE_MAINTENANCE_INTERVAL_SECONDS",
                defaults.queue_maintenance_interval_seconds,
            ),
        };

        if !config.is_valid_queue_config() {
            warn!("Queue configuration out of range - invalid values will be clamped");
        }

        config
    }

    pub fn is_valid_queue_config(&self) -> bool {
        self.queue_average_service_minutes > 0
            && self.queue_event_buffer > 0
            && self.queue_maintenance_interval_seconds > 0
            && self.queue_archive_after_minutes >= 0
            && self
                .queue_service_time_smoothing
                .map_or(true, |alpha| alpha > 0.0 && alpha <= 1.0)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
