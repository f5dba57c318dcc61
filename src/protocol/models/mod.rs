pub mod audio;
pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use audio::{AudioConfig, InputAudioConfig, InputAudioTranscription};
pub use common::{ArbitraryJson, DEFAULT_MODEL, ItemStatus, JsonSchema, Role};
pub use items::{ContentPart, Item};
pub use response::ResponseConfig;
pub use session::{SessionConfig, SessionKind, SessionUpdate};
pub use tools::Tool;
