//! Reachable devices and the user's selection among them.

mod registry;

pub use registry::DeviceRegistry;
