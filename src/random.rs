//! Random identifiers for isolating parallel tests

use rand::Rng;

/// Characters used by [`unique_id`]
const BASE62: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of [`unique_id`] output
pub const UNIQUE_ID_LEN: usize = 6;

/// Short random base-62 id, suitable as a namespace or resource suffix
pub fn unique_id() -> String {
    let mut rng = rand::thread_rng();
    (0..UNIQUE_ID_LEN)
        .map(|_| BASE62[rng.gen_range(0..BASE62.len())] as char)
        .collect()
}
