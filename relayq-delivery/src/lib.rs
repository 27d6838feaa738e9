pub mod config;
pub mod error;
pub mod processor;
pub mod smtp_transport;
pub mod transport;
pub mod types;

pub use config::DeliveryConfig;
pub use error::{DeliveryError, FailureKind, TransportError};
pub use processor::{
    BatchEnd, BatchReport, DeliveryEngine, DeliveryProcessor, MAX_AUTH_FAILURES, remaining_delay,
    run_cleanup,
};
pub use smtp_transport::{Credentials, SmtpConfig, SmtpTransport};
pub use transport::{Session, Transport};
pub use types::SmtpTimeouts;
