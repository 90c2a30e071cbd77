pub mod account;
pub mod event;
pub mod suppression;

pub use account::{PersonId, SuppressionSetting, TokenPair, UserConfig};
pub use event::{EventData, EventKind, InboundEvent, Resource, RoomType};
pub use suppression::{SuppressionKey, SuppressionWindow};
