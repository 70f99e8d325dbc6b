use std::time::Duration;

use keyed_limit::IntervalThrottle;
use keyed_limit::IntervalThrottleConfig;
use keyed_limit::LimiterError;
use keyed_limit::SlidingWindowConfig;
use keyed_limit::SlidingWindowLimiter;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn seconds(field: &str, secs: f64) -> PyResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| PyValueError::new_err(format!("{field}: {err}")))
}

fn count(field: &str, value: i64) -> PyResult<usize> {
    usize::try_from(value)
        .map_err(|_| PyValueError::new_err(format!("{field}: must not be negative, got {value}")))
}

fn config_error(err: LimiterError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Admits at most `max_requests` messages per user in any trailing `window_size`
/// seconds.
#[pyclass(name = "SlidingWindowRateLimiter")]
struct PySlidingWindow(SlidingWindowLimiter<String>);

#[pymethods]
impl PySlidingWindow {
    #[new]
    #[pyo3(signature = (window_size = 10.0, max_requests = 1))]
    fn new(window_size: f64, max_requests: i64) -> PyResult<Self> {
        let config = SlidingWindowConfig::new(
            count("max_requests", max_requests)?,
            seconds("window_size", window_size)?,
        );
        SlidingWindowLimiter::new(config)
            .map(PySlidingWindow)
            .map_err(config_error)
    }

    #[getter]
    fn window_size(&self) -> f64 {
        self.0.window_size().as_secs_f64()
    }

    #[getter]
    fn max_requests(&self) -> usize {
        self.0.max_requests()
    }

    fn can_send_message(&self, user_id: &str) -> bool {
        self.0.can_send(user_id)
    }

    fn record_message(&self, user_id: &str) -> bool {
        self.0.record(user_id)
    }

    /// Seconds until `user_id` may send again, `0.0` if it may send now.
    fn time_until_next_allowed(&self, user_id: &str) -> f64 {
        self.0.time_until_next_allowed(user_id).as_secs_f64()
    }
}

/// Admits a user's message once `min_interval` seconds have passed since their
/// last admitted one.
#[pyclass(name = "ThrottlingRateLimiter")]
struct PyIntervalThrottle(IntervalThrottle<String>);

#[pymethods]
impl PyIntervalThrottle {
    #[new]
    #[pyo3(signature = (min_interval = 10.0, retention = None))]
    fn new(min_interval: f64, retention: Option<f64>) -> PyResult<Self> {
        let mut config = IntervalThrottleConfig::new(seconds("min_interval", min_interval)?);
        if let Some(retention) = retention {
            config = config.with_retention(seconds("retention", retention)?);
        }
        IntervalThrottle::new(config)
            .map(PyIntervalThrottle)
            .map_err(config_error)
    }

    #[getter]
    fn min_interval(&self) -> f64 {
        self.0.min_interval().as_secs_f64()
    }

    #[getter]
    fn retention(&self) -> Option<f64> {
        self.0.retention().map(|retention| retention.as_secs_f64())
    }

    fn can_send_message(&self, user_id: &str) -> bool {
        self.0.can_send(user_id)
    }

    fn record_message(&self, user_id: &str) -> bool {
        self.0.record(user_id)
    }

    fn time_until_next_allowed(&self, user_id: &str) -> f64 {
        self.0.time_until_next_allowed(user_id).as_secs_f64()
    }

    /// Forget users that are no longer throttled. Returns how many were dropped.
    fn purge_stale(&self) -> usize {
        self.0.purge_stale()
    }
}

pub fn init_python_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySlidingWindow>()?;
    m.add_class::<PyIntervalThrottle>()?;
    Ok(())
}
