use crate::types::jid::{self, Jid, MessageId};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Crockford-style alphabet used for linking codes (no 0/O/I/U).
const PAIRING_CODE_ALPHABET: &[u8; 32] = b"123456789ABCDEFGHJKLMNPQRSTVWXYZ";

pub fn generate_message_id(user_jid: Option<&Jid>) -> MessageId {
    let mut data = Vec::with_capacity(8 + 20 + 16);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    data.extend_from_slice(&timestamp.to_be_bytes());

    if let Some(jid) = user_jid {
        data.extend_from_slice(jid.user.as_bytes());
        data.extend_from_slice(b"@");
        data.extend_from_slice(jid::LEGACY_USER_SERVER.as_bytes());
    }

    let mut random_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut random_bytes);
    data.extend_from_slice(&random_bytes);

    let hash = Sha256::digest(&data);
    let truncated_hash = &hash[..9];

    format!(
        "3EB0{hash}",
        hash = hex::encode(truncated_hash).to_uppercase()
    )
}

/// Eight characters, five random bytes worth of entropy.
pub fn generate_pairing_code() -> String {
    let mut bytes = [0u8; 5];
    rand::rng().fill_bytes(&mut bytes);

    let mut bits: u64 = 0;
    for b in bytes {
        bits = (bits << 8) | u64::from(b);
    }
    (0..8)
        .rev()
        .map(|i| PAIRING_CODE_ALPHABET[((bits >> (i * 5)) & 0x1f) as usize] as char)
        .collect()
}
