//! Server-generated identifiers.
//!
//! User and reference ids are UUIDv7 strings: opaque to clients, unique,
//! and sortable by creation time.

use uuid::Uuid;

/// Generate a new id (UUIDv7, hyphenated, 36 chars).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
