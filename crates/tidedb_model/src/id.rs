//! Locally generated document identifiers.

use rand::RngCore;

/// Length of a locally generated identifier, in characters.
pub const LOCAL_ID_LEN: usize = 24;

/// Generates a new local document identifier.
///
/// Local identifiers are 24 lowercase hexadecimal characters (12 random
/// bytes). They stand in for a document's `_id` until the backend confirms
/// the document and assigns a permanent identifier.
#[must_use]
pub fn local_id() -> String {
    let mut bytes = [0u8; LOCAL_ID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Returns true if `id` has the shape of a locally generated identifier.
///
/// This is a format check only; a backend-assigned identifier that happens
/// to be 24 lowercase hex characters is indistinguishable. The authoritative
/// marker for an unconfirmed document is `_kmd.local`.
#[must_use]
pub fn is_local_id_format(id: &str) -> bool {
    id.len() == LOCAL_ID_LEN
        && id
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
