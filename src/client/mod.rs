//! High-level orchestrator for a softphone line
//!
//! This module hosts the [`ClientManager`], the single component that wires
//! the signaling transport, the registration state machine, the admission
//! controller and the call registry together, and exposes the public control
//! surface to the presentation layer.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use softline_core::{ClientConfig, ClientManager};
//! # use softline_core::transport::SignalingTransportFactory;
//! # use softline_core::media::MediaEngine;
//! # async fn example(
//! #     transport_factory: Arc<dyn SignalingTransportFactory>,
//! #     media: Arc<dyn MediaEngine>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("wss://sip.example.com:7443", "alice", "secret");
//! let client = ClientManager::new(config, transport_factory, media)?;
//!
//! client.connect().await?;
//! // ... once the line is connected and registered:
//! let call_id = client.make_call("sip:bob@example.com", false).await?;
//!
//! for call in client.active_calls().await.iter() {
//!     println!("{} -> {:?}", call.remote_party, call.phase);
//! }
//!
//! client.hangup_call(&call_id).await?;
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod calls;
pub mod manager;
pub mod registration;

pub use manager::{ClientManager, ClientStats};

// Type alias for convenient use
pub type Client = ClientManager;
