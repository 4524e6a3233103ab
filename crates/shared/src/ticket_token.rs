//! Ticket codes: short human-readable identifiers (`TKT-XXXXXXXXXXXXXXXX`),
//! unique across all tickets. The signed payload lives in [`crate::ticket_jwt`].

use crate::crypto::random_string;

/// Prefix of every ticket code.
pub const TICKET_CODE_PREFIX: &str = "TKT-";

/// Number of random symbols after the prefix (16 symbols x 5 bits = 80 bits).
pub const TICKET_CODE_RANDOM_LEN: usize = 16;

/// Unambiguous alphabet: no 0/O or 1/I so codes survive being read aloud.
const TICKET_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generates a fresh ticket code from the OS CSPRNG.
pub fn generate_ticket_code() -> String {
    format!(
        "{}{}",
        TICKET_CODE_PREFIX,
        random_string(TICKET_CODE_ALPHABET, TICKET_CODE_RANDOM_LEN)
    )
}

/// Checks the shape of a ticket code without touching storage.
pub fn is_well_formed_ticket_code(code: &str) -> bool {
    match code.strip_prefix(TICKET_CODE_PREFIX) {
        Some(rest) => {
            rest.len() == TICKET_CODE_RANDOM_LEN
                && rest.bytes().all(|b| TICKET_CODE_ALPHABET.contains(&b))
        }
        None => false,
    }
}
