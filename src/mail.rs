//! Outbound mail seam.
//!
//! Delivery itself is an external collaborator; the default implementation
//! just records the message so local runs and tests stay self-contained.

use tracing::info;

pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str);
}

/// Logs messages instead of delivering them.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) {
        info!(to = %to, subject = %subject, body_len = body.len(), "Mail queued");
    }
}
