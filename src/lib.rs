//! sage bridge - suggestion scheduling and feedback correlation for chat sessions
//!
//! Ingests host chat events (user prompts, streamed assistant text, session
//! lifecycle, UI prompt appends) and:
//! - captures prompt/response pairs through the external `sage` tool
//! - debounces UI triggers into suggestion fetches and injects the result
//! - classifies the next prompt as accepted / steered / rejected against the
//!   suggestion that was shown
//! - detects `[[sage:prompt_key=...]]` markers the assistant echoes back
//!
//! All state is in memory; every external failure degrades to "no suggestion"
//! or "no feedback" and never reaches the host.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod error;
pub mod events;
pub mod feedback;
pub mod host;
pub mod marker;
pub mod scheduler;
pub mod sink;
pub mod suggestion;

pub use bridge::{CaptureState, Session, SuggestionBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use correlation::{analyze, CorrelationKind, CorrelationResult};
pub use error::{BridgeError, Result};
pub use events::HostEvent;
pub use host::{Host, LogEntry, LogLevel, MemoryHost};
pub use marker::extract_markers;
pub use sink::{CliSink, ExternalSink, MemorySink};
pub use suggestion::Suggestion;
