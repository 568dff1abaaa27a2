//! TorWatch Tor Layer
//!
//! Provides the outbound transport and HTML extraction used by the probes:
//! - SOCKS5h proxied client (DNS resolution via Tor) and a direct clearweb client
//! - Canned-response fixture transport for offline replay
//! - Page content extraction (title, visible text)
//! - Search result extraction strategies

pub mod proxy;
pub mod fixture;
pub mod page;
pub mod results;

pub use proxy::*;
pub use fixture::*;
pub use page::*;
pub use results::*;
