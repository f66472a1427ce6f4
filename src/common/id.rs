//! Peer identity, also used as the Kademlia key of a routing table entry.
use ed25519_dalek::VerifyingKey;
use rand::Rng;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

/// The size of peer ids in bytes.
pub const ID_SIZE: usize = 20;
pub const MAX_DISTANCE: u8 = ID_SIZE as u8 * 8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
/// Globally unique identifier of a remote peer.
pub struct PeerId(pub [u8; ID_SIZE]);

impl PeerId {
    pub fn random() -> PeerId {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        PeerId(random_bytes)
    }

    /// Derive a [PeerId] from a peer's ed25519 public key.
    ///
    /// The id is the sha1 digest of the 32 public key bytes, so the same key
    /// always maps to the same id.
    pub fn from_public_key(public_key: &VerifyingKey) -> PeerId {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(public_key.as_bytes());

        PeerId(hasher.digest().bytes())
    }

    /// Create a new PeerId from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<PeerId, InvalidPeerId> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(InvalidPeerId::InvalidSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(PeerId(tmp))
    }

    /// Simplified XOR distance between this PeerId and another.
    ///
    /// Distance to self is 0
    /// Distance to the furthest PeerId is 160
    /// Distance to a PeerId with 5 leading matching bits is 155
    pub fn distance(&self, other: &PeerId) -> u8 {
        for i in 0..ID_SIZE {
            let a = self.0[i];
            let b = other.0[i];

            if a != b {
                // leading zeros so far + leading zeros of this byte
                let leading_zeros = (i as u32 * 8 + (a ^ b).leading_zeros()) as u8;

                return MAX_DISTANCE - leading_zeros;
            }
        }

        0
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

impl FromStr for PeerId {
    type Err = InvalidPeerId;

    fn from_str(s: &str) -> Result<PeerId, Self::Err> {
        if s.len() % 2 != 0 {
            return Err(InvalidPeerId::OddNumberOfCharacters);
        }

        let mut bytes = Vec::with_capacity(s.len() / 2);

        for i in (0..s.len()).step_by(2) {
            let byte = s
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(InvalidPeerId::InvalidCharacter)?;

            bytes.push(byte);
        }

        PeerId::from_bytes(bytes)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Errors parsing a [PeerId].
pub enum InvalidPeerId {
    #[error("Invalid peer id size, expected 20, got {0}")]
    InvalidSize(usize),

    #[error("Hex encoding should have an even number of characters")]
    OddNumberOfCharacters,

    #[error("Invalid hex character")]
    InvalidCharacter,
}

#[cfg(test)]
mod test {
    use ed25519_dalek::SigningKey;

    use super::*;

    #[test]
    fn distance_to_self() {
        let id = PeerId::random();
        let distance = id.distance(&id);
        assert_eq!(distance, 0)
    }

    #[test]
    fn distance_to_id() {
        let id = PeerId([
            6, 57, 161, 226, 79, 186, 138, 166, 123, 35, 36, 80, 135, 38, 43, 55, 204, 101, 9, 46,
        ]);

        let target = PeerId([
            3, 91, 237, 44, 4, 68, 79, 156, 2, 7, 67, 60, 174, 96, 33, 195, 128, 221, 190, 182,
        ]);

        let distance = id.distance(&target);

        assert_eq!(distance, 155)
    }

    #[test]
    fn distance_to_random_id() {
        let id = PeerId::random();
        let target = PeerId::random();

        let distance = id.distance(&target);

        assert_ne!(distance, 0)
    }

    #[test]
    fn display_and_parse() {
        let id = PeerId::random();
        let parsed: PeerId = id.to_string().parse().unwrap();

        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 40);
    }

    #[test]
    fn parse_invalid() {
        assert_eq!(
            PeerId::from_str("abc"),
            Err(InvalidPeerId::OddNumberOfCharacters)
        );
        assert_eq!(
            PeerId::from_str("zz"),
            Err(InvalidPeerId::InvalidCharacter)
        );
        assert_eq!(PeerId::from_str("aabb"), Err(InvalidPeerId::InvalidSize(2)));
    }

    #[test]
    fn from_public_key_is_stable() {
        let signer = SigningKey::from_bytes(&[7; 32]);

        let a = PeerId::from_public_key(&signer.verifying_key());
        let b = PeerId::from_public_key(&signer.verifying_key());
        let other = PeerId::from_public_key(&SigningKey::from_bytes(&[8; 32]).verifying_key());

        assert_eq!(a, b);
        assert_ne!(a, other);
    }
}
