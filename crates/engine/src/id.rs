use rand::RngCore;

/// `bytes` random bytes as lower-case hex.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

/// A new record id such as `proof-3f9a0c1d2e4b5a69`.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", random_hex(8))
}
