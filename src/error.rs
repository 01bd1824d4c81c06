use crate::platform::SensorKind;
use jni::JNIEnv;
use thiserror::Error;

/// Compass core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompassError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(SensorKind),

    #[error("Location provider failure: {0}")]
    LocationProviderFailure(String),

    #[error("Geocode lookup failed: {0}")]
    GeocodeLookupFailure(String),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Not running")]
    NotRunning,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Preference storage error: {0}")]
    StorageError(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for compass operations
pub type CompassResult<T> = Result<T, CompassError>;

impl CompassError {
    /// Poisoned-lock error for the named resource
    pub(crate) fn lock(what: &str) -> Self {
        CompassError::Internal(format!("Failed to acquire {} lock", what))
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &CompassError) -> CompassResult<()> {
    let exception_class = match error {
        CompassError::AlreadyRunning | CompassError::NotRunning => {
            "java/lang/IllegalStateException"
        }
        CompassError::InvalidState(_) | CompassError::InvalidParameters(_) => {
            "java/lang/IllegalArgumentException"
        }
        CompassError::SensorUnavailable(_)
        | CompassError::LocationProviderFailure(_)
        | CompassError::GeocodeLookupFailure(_)
        | CompassError::StorageError(_) => "java/io/IOException",
        CompassError::JniError(_) | CompassError::Internal(_) => "java/lang/RuntimeException",
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| CompassError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_unavailable_names_the_sensor() {
        let err = CompassError::SensorUnavailable(SensorKind::MagneticField);
        assert_eq!(err.to_string(), "Sensor unavailable: magnetometer");
    }

    #[test]
    fn test_lock_error_message() {
        let err = CompassError::lock("snapshot");
        assert_eq!(err, CompassError::Internal("Failed to acquire snapshot lock".to_string()));
    }
}
