use near_sdk::env;

use crate::byte_utils::ByteUtils;

/// One guardian attestation from the VAA header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianSignature {
    pub index:     u8,
    pub signature: Vec<u8>,
}

// Verified Action Approval(VAA) envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVAA {
    pub version: u8,
    pub guardian_set_index: u32,
    pub signatures: Vec<GuardianSignature>,

    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: u16,
    pub emitter_address: Vec<u8>,
    pub sequence: u64,
    pub consistency_level: u8,
    pub payload: Vec<u8>,

    pub hash: Vec<u8>,
}

impl ParsedVAA {
    /* VAA format:

    header (length 6):
    0   uint8   version (0x01)
    1   uint32  guardian set index
    5   uint8   len signatures

    per signature (length 66):
    0   uint8       index of the signer (in guardian keys)
    1   [65]uint8   signature

    body:
    0   uint32      timestamp (unix in seconds)
    4   uint32      nonce
    8   uint16      emitter_chain
    10  [32]uint8   emitter_address
    42  uint64      sequence
    50  uint8       consistency_level
    51  []uint8     payload
    */

    pub const VERSION: u8 = 1;

    pub const HEADER_LEN: usize = 6;
    pub const SIGNATURE_LEN: usize = 66;

    pub const GUARDIAN_SET_INDEX_POS: usize = 1;
    pub const LEN_SIGNER_POS: usize = 5;

    pub const SIG_DATA_POS: usize = 1;
    pub const SIG_DATA_LEN: usize = 65;

    pub const VAA_NONCE_POS: usize = 4;
    pub const VAA_EMITTER_CHAIN_POS: usize = 8;
    pub const VAA_EMITTER_ADDRESS_POS: usize = 10;
    pub const VAA_SEQUENCE_POS: usize = 42;
    pub const VAA_CONSISTENCY_LEVEL_POS: usize = 50;
    pub const VAA_PAYLOAD_POS: usize = 51;

    /// Decodes the wire envelope. The digest over the body is computed here
    /// but signature verification is delegated to the attestation core.
    pub fn parse(data: &[u8]) -> Self {
        if data.len() < Self::HEADER_LEN {
            env::panic_str("TruncatedInput");
        }

        let version = data.get_u8(0);
        if version != Self::VERSION {
            env::panic_str("UnsupportedVersion");
        }

        let guardian_set_index = data.get_u32(Self::GUARDIAN_SET_INDEX_POS);
        let len_signers = data.get_u8(Self::LEN_SIGNER_POS) as usize;
        let body_offset = Self::HEADER_LEN + Self::SIGNATURE_LEN * len_signers;

        // The fixed part of the body must be complete; the payload may be empty.
        if data.len() < body_offset + Self::VAA_PAYLOAD_POS {
            env::panic_str("TruncatedInput");
        }

        // Guardian indices must be strictly increasing, duplicates are invalid.
        let mut signatures = Vec::with_capacity(len_signers);
        let mut last_index: i32 = -1;
        let mut pos = Self::HEADER_LEN;
        for _ in 0..len_signers {
            let index = data.get_u8(pos) as i32;
            if index <= last_index {
                env::panic_str("WrongGuardianIndexOrder");
            }
            last_index = index;

            signatures.push(GuardianSignature {
                index:     index as u8,
                signature: data.get_bytes(pos + Self::SIG_DATA_POS, Self::SIG_DATA_LEN).to_vec(),
            });
            pos += Self::SIGNATURE_LEN;
        }

        // Digest the quorum verifier checks the signatures against
        let body = &data[body_offset..];
        let hash = env::keccak256(&env::keccak256(body));

        let timestamp = data.get_u32(body_offset);
        let nonce = data.get_u32(body_offset + Self::VAA_NONCE_POS);
        let emitter_chain = data.get_u16(body_offset + Self::VAA_EMITTER_CHAIN_POS);
        let emitter_address = data
            .get_bytes32(body_offset + Self::VAA_EMITTER_ADDRESS_POS)
            .to_vec();
        let sequence = data.get_u64(body_offset + Self::VAA_SEQUENCE_POS);
        let consistency_level = data.get_u8(body_offset + Self::VAA_CONSISTENCY_LEVEL_POS);
        let payload = data[body_offset + Self::VAA_PAYLOAD_POS..].to_vec();

        ParsedVAA {
            version,
            guardian_set_index,
            signatures,
            timestamp,
            nonce,
            emitter_chain,
            emitter_address,
            sequence,
            consistency_level,
            payload,
            hash,
        }
    }
}
