//! Real-time Module
//!
//! Live connections, presence and room-scoped fan-out.
//!
//! - **`connection`** - connection IDs and outbound queues
//! - **`presence`** - which users hold at least one live connection
//! - **`rooms`** - which connections listen to which chat
//! - **`broadcast`** - queue one event on many connections
//! - **`gateway`** - the connection state machine tying the above to the chat store
//! - **`socket`** - the WebSocket transport in front of the gateway
//! - **`turns`** - per-key async turns (per-chat ordering, per-user presence)

pub mod broadcast;
pub mod connection;
pub mod gateway;
pub mod presence;
pub mod rooms;
pub mod socket;
pub mod turns;

pub use connection::{ConnectionHandle, ConnectionId, Delivery, DEFAULT_QUEUE_CAPACITY};
pub use gateway::{Connection, RealtimeGateway, DEFAULT_STORE_TIMEOUT};
pub use presence::PresenceTracker;
pub use rooms::RoomMembershipManager;
pub use socket::handle_socket_upgrade;
