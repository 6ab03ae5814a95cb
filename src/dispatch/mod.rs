//! Delivery engines: the throttled bulk dispatch loop and the bulk mail
//! loop, plus the jitter policy that paces the former.

pub mod bulk;
pub mod jitter;
pub mod mail;

pub use bulk::{DispatchEngine, DispatchReport, ProgressSink};
pub use jitter::{GapRange, JitterPolicy};
pub use mail::{BulkMailEngine, MailConfig, MailReport};
