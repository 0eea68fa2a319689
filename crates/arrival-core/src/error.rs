use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArrivalError {
    #[error("no action id: set an action before completing it")]
    MissingActionId,

    #[error("no destination: place or its coordinate is not set")]
    MissingPlace,

    #[error("store error: {0}")]
    Store(String),

    #[error("geofence controller is no longer running")]
    ControllerStopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArrivalError>;
