//! HMAC-SHA256 signing used by the digest ("complex") flavour of the handshake.
//!
//! A signed 1536 byte handshake block carries a 32 byte digest.  The digest slot lives at an
//! offset derived from four header bytes, and the digest covers every byte of the block except
//! the slot itself.  Two layouts exist in the wild: the offset bytes are either at 8..12 (slot
//! base 12) or at 772..776 (slot base 776).

use super::errors::HandshakeError;
use super::PACKET_SIZE;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DIGEST_LENGTH: usize = 32;

pub const GENUINE_FMS_KEY: &[u8] = b"Genuine Adobe Flash Media Server 001";
pub const GENUINE_FP_KEY: &[u8] = b"Genuine Adobe Flash Player 001";

const RANDOM_CRUD: [u8; 32] = [
    0xf0, 0xee, 0xc2, 0x4a, 0x80, 0x68, 0xbe, 0xe8, 0x2e, 0x00, 0xd0, 0xd1, 0x02, 0x9e, 0x7e, 0x57,
    0x6e, 0xec, 0x5d, 0x2d, 0x29, 0x80, 0x6f, 0xab, 0x93, 0xb8, 0xe6, 0x36, 0xcf, 0xeb, 0x31, 0xae,
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DigestScheme {
    /// Offset bytes at 8..12, slot based at 12
    Leading,
    /// Offset bytes at 772..776, slot based at 776
    Trailing,
}

impl DigestScheme {
    fn offset_source(self) -> (usize, usize) {
        match self {
            DigestScheme::Leading => (8, 12),
            DigestScheme::Trailing => (772, 776),
        }
    }
}

/// Returns the key extended with the 32 constant bytes used for the response packet
pub fn key_with_crud(key: &[u8]) -> Vec<u8> {
    let mut extended = Vec::with_capacity(key.len() + RANDOM_CRUD.len());
    extended.extend_from_slice(key);
    extended.extend_from_slice(&RANDOM_CRUD);
    extended
}

pub fn digest_offset(packet: &[u8], scheme: DigestScheme) -> usize {
    let (start, base) = scheme.offset_source();
    let sum: usize = packet[start..start + 4].iter().map(|x| *x as usize).sum();
    (sum % 728) + base
}

pub fn calculate_hmac(message: &[u8], key: &[u8]) -> Result<[u8; DIGEST_LENGTH], HandshakeError> {
    let mut mac = new_mac(key)?;
    mac.update(message);

    let mut digest = [0_u8; DIGEST_LENGTH];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// Writes a digest into the packet's slot for the given scheme and returns it
pub fn sign_packet(
    packet: &mut [u8],
    scheme: DigestScheme,
    key: &[u8],
) -> Result<[u8; DIGEST_LENGTH], HandshakeError> {
    let offset = digest_offset(packet, scheme);
    let mut mac = new_mac(key)?;
    mac.update(&packet[..offset]);
    mac.update(&packet[offset + DIGEST_LENGTH..]);

    let mut digest = [0_u8; DIGEST_LENGTH];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    packet[offset..offset + DIGEST_LENGTH].copy_from_slice(&digest);
    Ok(digest)
}

/// Looks for a valid digest in either slot layout.  Returns the digest and the scheme it was
/// found with, or `None` when the packet is not signed with the key.
pub fn find_valid_digest(
    packet: &[u8],
    key: &[u8],
) -> Result<Option<([u8; DIGEST_LENGTH], DigestScheme)>, HandshakeError> {
    if packet.len() != PACKET_SIZE {
        return Ok(None);
    }

    for scheme in [DigestScheme::Trailing, DigestScheme::Leading] {
        let offset = digest_offset(packet, scheme);
        let mut mac = new_mac(key)?;
        mac.update(&packet[..offset]);
        mac.update(&packet[offset + DIGEST_LENGTH..]);

        let provided = &packet[offset..offset + DIGEST_LENGTH];
        if mac.verify_slice(provided).is_ok() {
            let mut digest = [0_u8; DIGEST_LENGTH];
            digest.copy_from_slice(provided);
            return Ok(Some((digest, scheme)));
        }
    }

    Ok(None)
}

/// Builds the final (p2) packet answering a peer that sent us `peer_digest`: random bytes
/// followed by a signature keyed on the peer's digest.
pub fn create_response_packet(
    peer_digest: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, HandshakeError> {
    let mut packet = vec![0_u8; PACKET_SIZE];
    rand::thread_rng().fill(&mut packet[..PACKET_SIZE - DIGEST_LENGTH]);

    let challenge_key = calculate_hmac(peer_digest, &key_with_crud(key))?;
    let signature = calculate_hmac(&packet[..PACKET_SIZE - DIGEST_LENGTH], &challenge_key)?;
    packet[PACKET_SIZE - DIGEST_LENGTH..].copy_from_slice(&signature);
    Ok(packet)
}

fn new_mac(key: &[u8]) -> Result<HmacSha256, HandshakeError> {
    HmacSha256::new_from_slice(key).map_err(|_| HandshakeError::InvalidDigestKey)
}
