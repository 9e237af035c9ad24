//! Opaque identifier generation for sessions and checkpoints.
//!
//! Session and checkpoint ids are opaque strings at the storage layer;
//! we mint them as UUIDv4 so two users' locally-generated ids never
//! collide when their branches are fetched side by side.

use uuid::Uuid;

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_checkpoint_id() -> String {
    Uuid::new_v4().to_string()
}
