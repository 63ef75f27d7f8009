//! Identifier and key generation.

use rand::Rng;
use std::sync::OnceLock;
use uuid::Uuid;

/// URL-safe alphabet for generated access keys.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Stable per-process node id for v1 uuid generation.
fn node_id() -> &'static [u8; 6] {
    static NODE: OnceLock<[u8; 6]> = OnceLock::new();
    NODE.get_or_init(|| {
        let mut node = [0u8; 6];
        rand::thread_rng().fill(&mut node[..]);
        // Set the multicast bit, as required for randomly generated node ids.
        node[0] |= 0x01;
        node
    })
}

/// A fresh server-side uid: a UUID-v1 as bare hex.
///
/// V1 uuids embed a monotonic timestamp, which keeps uids from the same
/// process roughly creation-ordered on disk.
#[must_use]
pub fn new_uid() -> String {
    Uuid::now_v1(node_id()).simple().to_string()
}

/// A generated access key: 6 to 12 URL-safe characters.
#[must_use]
pub fn new_key() -> String {
    let mut rng = rand::thread_rng();
    let length = rng.gen_range(6..=12);
    (0..length).map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char).collect()
}
