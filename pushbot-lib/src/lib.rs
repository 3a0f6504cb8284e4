pub mod allocator;
pub mod bridge;
pub mod classifier;
pub mod command;
pub mod config;
pub mod constants;
pub mod control;
pub mod device;
pub mod error;
pub mod ethernet;
pub mod key;
pub mod protocol;
pub mod retina;
pub mod transport;

// Re-export the main entry points for easy access
pub use bridge::{BridgeHandler, BridgeOptions, Delivery, LiveEventBridge, ListenerExit};
pub use config::BridgeConfig;
pub use device::Device;
pub use error::PushBotError;
pub use protocol::MunichProtocol;
