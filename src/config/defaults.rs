//! Default value functions for configuration.

use std::net::IpAddr;

pub fn default_port() -> u16 {
    6667
}

pub fn default_nickname() -> String {
    "slircbot".to_string()
}

pub fn default_metrics_bind() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

pub fn default_handler_budget_ms() -> u64 {
    5_000
}

pub fn default_reconnect_delay_secs() -> u64 {
    10
}

pub fn default_max_reconnect_delay_secs() -> u64 {
    300
}

pub fn default_ping_interval_secs() -> u64 {
    120
}

pub fn default_send_queue() -> usize {
    256
}

pub fn default_quit_message() -> String {
    "Shutting Down".to_string()
}

pub fn default_version_reply() -> String {
    concat!("slircbot ", env!("CARGO_PKG_VERSION")).to_string()
}

/// `-` is the "no flag required" sentinel.
pub fn default_flag() -> String {
    "-".to_string()
}
