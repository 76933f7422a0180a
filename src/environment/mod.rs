//! Environment tamper monitoring (tab switches, fullscreen exits, focus
//! loss and clipboard or context-menu attempts).

pub mod monitor;

pub use monitor::{
    EnvironmentError, EnvironmentMonitor, EnvironmentSignal, HostEnvironment, ObservedSignal,
};
