//! URL handling module for Price-Sync
//!
//! This module validates product source URLs and guards outgoing fetches
//! against server-side request forgery (loopback, private and reserved hosts).

mod guard;
mod source;

// Re-export main functions
pub use guard::{check_host, is_blocked_host, is_blocked_ip, HostResolver, StaticResolver, SystemResolver};
pub use source::{parse_source_url, source_host};
