use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Not enough free virtual interfaces: need {needed}, {available} available")]
    NoFreeInterfaces { needed: usize, available: usize },

    #[error("Virtual interface {0} was claimed concurrently")]
    AllocationRace(i64),

    #[error("No ports left above {0}")]
    PortsExhausted(u16),

    #[error("NVR {nvr_id} still has {cameras} camera(s)")]
    NvrInUse { nvr_id: i64, cameras: usize },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
