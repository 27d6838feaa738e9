//! Configuration types shared between the SMTP client and the delivery engine.

pub mod tls;

pub use tls::{TlsCertificatePolicy, TlsConfig, TlsPolicy};
