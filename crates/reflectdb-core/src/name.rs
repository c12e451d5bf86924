//! Identifier name hashing
//!
//! Every primitive in the database is identified by the 32-bit hash of its
//! fully-scoped name. The producer and the exporter must agree on this
//! function bit-for-bit: the exporter re-hashes synthesized names (for
//! example `Player::ConstructObject`) and expects them to match hashes
//! recorded by the producer. Collisions are not detected; two colliding
//! names are treated as the same name by every lookup.

/// 32-bit FNV-1a offset basis.
const FNV_OFFSET: u32 = 0x811c_9dc5;

/// 32-bit FNV-1a prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash an identifier name with 32-bit FNV-1a.
///
/// The empty string hashes to the offset basis, but hash value zero is
/// reserved to mean "no name" throughout the database, so producers never
/// register an empty name.
pub fn hash_name(text: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in text.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_name("Player"), hash_name("Player"));
        assert_ne!(hash_name("Player"), hash_name("player"));
    }

    #[test]
    fn test_scoped_names_differ() {
        assert_ne!(hash_name("game::Player"), hash_name("Player"));
        assert_ne!(
            hash_name("game::Player::ConstructObject"),
            hash_name("game::Player::DestructObject")
        );
    }

    #[test]
    fn test_known_vector() {
        // FNV-1a reference value for "a".
        assert_eq!(hash_name("a"), 0xe40c_292c);
        assert_eq!(hash_name(""), 0x811c_9dc5);
    }
}
