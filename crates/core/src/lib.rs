pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod lifecycle;
pub mod platform;
pub mod qualify;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dispatch::{DigestOutcome, DispatchError, DispatchReport, ResponseDispatcher};
pub use domain::{InboundEvent, PersonId, SuppressionKey, SuppressionWindow, TokenPair, UserConfig};
pub use errors::{ApplicationError, InterfaceError};
pub use intake::{IntakeOutcome, IntakePipeline};
pub use lifecycle::{LifecycleManager, RefreshReport, SweepReport};
pub use platform::{Clock, MessagingPlatform, PlatformError, SystemClock};
pub use qualify::{Decision, EventQualifier, SkipReason};
pub use settings::{AccountService, SettingsError, SettingsForm, SettingsView};
pub use store::{AccountRepository, ConfigStore, StoreError, SuppressionRepository};
pub use webhook::VerifyError;
