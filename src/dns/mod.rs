//! DNS-related modules.

pub mod record;
pub mod registry;
pub mod upstream;

pub use record::{AnswerRecord, AnswerSource, record_kind};
pub use registry::{NetworkRegistry, NetworkRule};
pub use upstream::{ForwardingUpstream, SystemUpstream, Upstream};
