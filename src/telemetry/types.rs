use serde::{Deserialize, Serialize};

/// One decoded telemetry reading from the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Seconds since the session started, assigned on arrival
    pub t: f64,
    /// Instantaneous rotor speed
    pub rpm: f64,
    /// Controller's moving average of `rpm`
    pub moving_average_rpm: f64,
    /// Speed the controller is regulating towards
    pub setpoint_rpm: f64,
    /// Motor drive duty value
    pub pwm: i32,
    /// Percentage error between the moving average and the setpoint
    pub percent_error: f64,
}
