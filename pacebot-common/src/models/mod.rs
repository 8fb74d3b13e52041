pub mod channel;
pub mod command;
pub mod platform;
pub mod relay;

pub use channel::{ChannelConfig, ChannelConfigPatch};
pub use command::{Command, CommandUsageLog};
pub use platform::Platform;
pub use relay::{RelayEnvelope, RelayEvent};
