use uuid::Uuid;

/// Length of document and comment identifiers.
pub const ID_LEN: usize = 8;

/// A short opaque identifier: the first 8 hex digits of a random v4 UUID.
///
/// Collisions are possible (32 bits of entropy); callers that need
/// uniqueness check for an existing record before using the id.
pub fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}
