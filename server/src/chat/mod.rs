//! Support chat core: event contracts, conversation store, routing,
//! typing relay, admin aggregation, and retention.

pub mod admin_view;
pub mod events;
pub mod messages;
pub mod presence;
pub mod retention;
pub mod router;
pub mod store;
