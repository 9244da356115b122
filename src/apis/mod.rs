//! Public data APIs used for the web presence score.

pub mod reddit;
pub mod wikipedia;

pub use reddit::{RedditClient, RedditCredentials, RedditPresence};
pub use wikipedia::{WikipediaClient, WikipediaPresence};

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Logarithmic scaling with a soft cap at `k`: `min(max, log_{k+1}(v + 1) * max)`
pub fn log_scale(value: f64, max_points: f64, k: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    ((value + 1.0).ln() / (k + 1.0).ln() * max_points).min(max_points)
}

/// Full points at zero hours, half at `half_life_hours`
pub fn exp_decay(hours_since: Option<f64>, half_life_hours: f64, max_points: f64) -> f64 {
    match hours_since {
        Some(hours) => max_points * (-hours.max(0.0) * std::f64::consts::LN_2 / half_life_hours).exp(),
        None => 0.0,
    }
}

pub(crate) async fn send_json<T: DeserializeOwned>(service: &'static str, request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await.map_err(|e| ApiError::Network {
        service,
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(service, status = %status, "API call failed");
        return Err(ApiError::Status {
            service,
            status: status.as_u16(),
        });
    }

    response.json::<T>().await.map_err(|e| ApiError::Parse {
        service,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_scale_caps_at_max() {
        assert_eq!(log_scale(0.0, 7.5, 5000.0), 0.0);
        assert!((log_scale(5000.0, 7.5, 5000.0) - 7.5).abs() < 1e-9);
        assert_eq!(log_scale(1_000_000.0, 7.5, 5000.0), 7.5);
        let half = log_scale(70.0, 10.0, 5000.0);
        assert!(half > 4.0 && half < 6.0);
    }

    #[test]
    fn test_exp_decay_halves_at_half_life() {
        assert_eq!(exp_decay(Some(0.0), 72.0, 7.5), 7.5);
        assert!((exp_decay(Some(72.0), 72.0, 7.5) - 3.75).abs() < 1e-9);
        assert_eq!(exp_decay(None, 72.0, 7.5), 0.0);
    }
}
