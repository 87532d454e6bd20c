//! Domain models shared by every stage of the companion
//!
//! - [`UserProfile`]: long-lived facts about the user
//! - [`DailyCheckIn`]: today's self-reported signals
//! - [`ConversationState`]: the chat itself and where it is in the flow

pub mod checkin;
pub mod conversation;
pub mod profile;

pub use checkin::*;
pub use conversation::*;
pub use profile::*;
