/// Security plumbing shared by the proxy's request path:
/// - **Redaction** (`redaction`): precompiled regex patterns applied to every
///   outbound text segment
/// - **Audit** (`audit`): the per-request audit record attached before handler
///   dispatch and emitted as one structured JSON log line on return
pub mod audit;
pub mod redaction;

pub use audit::{new_shared, AuditInfo, AuditRecord, SharedAuditInfo};
pub use redaction::Redactor;
