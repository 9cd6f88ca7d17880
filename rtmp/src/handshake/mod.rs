//! The RTMP handshake.
//!
//! Both peers send a version byte (p0) plus a 1536 byte block (p1), then answer the other
//! side's block with one of their own (p2).  Once p2 has been received the handshake is done and
//! every following byte belongs to the chunk stream.
//!
//! Two flavours exist.  The simple flavour echoes the peer's p1 back as p2.  The digest flavour
//! signs p1 with a well known key and answers with a p2 keyed on the peer's digest.  A
//! `Handshake` always signs its own p1 and then adapts to whatever the peer does: if the peer's
//! p1 carries a valid digest the answer is a digest p2, otherwise it falls back to an echo.
//!
//! ```
//! use delay_relay_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
//!
//! let mut client = Handshake::new(PeerType::Client);
//! let mut server = Handshake::new(PeerType::Server);
//!
//! let c0_and_c1 = client.generate_outbound_p0_and_p1().unwrap();
//! let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();
//!
//! let s2 = match server.process_bytes(&c0_and_c1).unwrap() {
//!     HandshakeProcessResult::InProgress { response_bytes } => response_bytes,
//!     x => panic!("Unexpected result: {:?}", x),
//! };
//!
//! let c2 = match client.process_bytes(&s0_and_s1).unwrap() {
//!     HandshakeProcessResult::InProgress { response_bytes } => response_bytes,
//!     x => panic!("Unexpected result: {:?}", x),
//! };
//!
//! match client.process_bytes(&s2).unwrap() {
//!     HandshakeProcessResult::Completed { .. } => (),
//!     x => panic!("Unexpected result: {:?}", x),
//! }
//!
//! match server.process_bytes(&c2).unwrap() {
//!     HandshakeProcessResult::Completed { .. } => (),
//!     x => panic!("Unexpected result: {:?}", x),
//! }
//! ```

mod digest;
mod errors;

pub use self::errors::HandshakeError;

use self::digest::{DigestScheme, GENUINE_FMS_KEY, GENUINE_FP_KEY};
use rand::Rng;
use tracing::{debug, trace};

const RTMP_VERSION: u8 = 3;
const PACKET_SIZE: usize = 1536;
const SERVER_VERSION: [u8; 4] = [1, 2, 3, 4];
const CLIENT_VERSION: [u8; 4] = [9, 0, 124, 2];

/// Which side of the connection this handshake is for
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeerType {
    Server,
    Client,
}

/// Observable progress of the handshake
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandshakePhase {
    /// Nothing has been sent or received yet
    Uninitialized,
    /// Our p0 and p1 are out, waiting on the peer's p0 and p1
    Begun,
    /// Our p2 is out, waiting on the peer's p2
    Continued,
    Complete,
}

#[derive(PartialEq, Eq, Debug)]
pub enum HandshakeProcessResult {
    /// More bytes are needed.  `response_bytes` should be sent to the peer.
    InProgress { response_bytes: Vec<u8> },

    /// The handshake finished.  `response_bytes` should still be sent to the peer and
    /// `remaining_bytes` are the first bytes of the chunk stream.
    Completed {
        response_bytes: Vec<u8>,
        remaining_bytes: Vec<u8>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    NeedToSendP0AndP1,
    WaitingForPacket0,
    WaitingForPacket1,
    WaitingForPacket2,
    Complete,
}

pub struct Handshake {
    peer_type: PeerType,
    current_stage: Stage,
    my_p1: Vec<u8>,
    peer_signed: bool,
    buffer: Vec<u8>,
}

impl Handshake {
    pub fn new(peer_type: PeerType) -> Handshake {
        Handshake {
            peer_type,
            current_stage: Stage::NeedToSendP0AndP1,
            my_p1: Vec::new(),
            peer_signed: false,
            buffer: Vec::new(),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        match self.current_stage {
            Stage::NeedToSendP0AndP1 => HandshakePhase::Uninitialized,
            Stage::WaitingForPacket0 | Stage::WaitingForPacket1 => HandshakePhase::Begun,
            Stage::WaitingForPacket2 => HandshakePhase::Continued,
            Stage::Complete => HandshakePhase::Complete,
        }
    }

    /// True once the peer's p1 was found to carry a valid digest
    pub fn is_digest_mode(&self) -> bool {
        self.peer_signed
    }

    /// Creates the version byte and signed p1 that open the handshake
    pub fn generate_outbound_p0_and_p1(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.current_stage != Stage::NeedToSendP0AndP1 {
            return Err(HandshakeError::OutboundPacketsAlreadyGenerated);
        }

        let (version, key) = match self.peer_type {
            PeerType::Server => (SERVER_VERSION, GENUINE_FMS_KEY),
            PeerType::Client => (CLIENT_VERSION, GENUINE_FP_KEY),
        };

        let mut p1 = vec![0_u8; PACKET_SIZE];
        rand::thread_rng().fill(&mut p1[8..]);
        p1[4..8].copy_from_slice(&version);
        digest::sign_packet(&mut p1, DigestScheme::Leading, key)?;

        let mut bytes = Vec::with_capacity(PACKET_SIZE + 1);
        bytes.push(RTMP_VERSION);
        bytes.extend_from_slice(&p1);

        self.my_p1 = p1;
        self.current_stage = Stage::WaitingForPacket0;
        Ok(bytes)
    }

    /// Feeds bytes received from the peer into the handshake
    pub fn process_bytes(&mut self, data: &[u8]) -> Result<HandshakeProcessResult, HandshakeError> {
        if self.current_stage == Stage::Complete {
            return Err(HandshakeError::HandshakeAlreadyCompleted);
        }

        self.buffer.extend_from_slice(data);
        let mut response_bytes = Vec::new();

        loop {
            let starting_stage = self.current_stage;
            match self.current_stage {
                Stage::NeedToSendP0AndP1 => {
                    response_bytes.extend(self.generate_outbound_p0_and_p1()?);
                }

                Stage::WaitingForPacket0 => self.parse_p0()?,
                Stage::WaitingForPacket1 => {
                    if let Some(p2) = self.parse_p1()? {
                        response_bytes.extend(p2);
                    }
                }

                Stage::WaitingForPacket2 => self.parse_p2()?,
                Stage::Complete => break,
            }

            if starting_stage == self.current_stage {
                break;
            }
        }

        if self.current_stage == Stage::Complete {
            let remaining_bytes = std::mem::take(&mut self.buffer);
            debug!(
                peer_type = ?self.peer_type,
                digest = self.peer_signed,
                "Handshake completed"
            );

            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            })
        } else {
            Ok(HandshakeProcessResult::InProgress { response_bytes })
        }
    }

    fn parse_p0(&mut self) -> Result<(), HandshakeError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        match self.buffer.remove(0) {
            RTMP_VERSION => {
                self.current_stage = Stage::WaitingForPacket1;
                Ok(())
            }

            version => Err(HandshakeError::BadVersionId(version)),
        }
    }

    fn parse_p1(&mut self) -> Result<Option<Vec<u8>>, HandshakeError> {
        if self.buffer.len() < PACKET_SIZE {
            return Ok(None);
        }

        let peer_p1: Vec<u8> = self.buffer.drain(..PACKET_SIZE).collect();

        // Servers sign with the media server key and clients with the player key, so validate
        // the peer's block with the key belonging to the other role.
        let (peer_key, my_key) = match self.peer_type {
            PeerType::Server => (GENUINE_FP_KEY, GENUINE_FMS_KEY),
            PeerType::Client => (GENUINE_FMS_KEY, GENUINE_FP_KEY),
        };

        let response = match digest::find_valid_digest(&peer_p1, peer_key)? {
            Some((peer_digest, scheme)) => {
                trace!(?scheme, "Peer p1 carries a valid digest");
                self.peer_signed = true;
                digest::create_response_packet(&peer_digest, my_key)?
            }

            None => {
                trace!("Peer p1 is unsigned, echoing it back");
                self.peer_signed = false;
                peer_p1
            }
        };

        self.current_stage = Stage::WaitingForPacket2;
        Ok(Some(response))
    }

    fn parse_p2(&mut self) -> Result<(), HandshakeError> {
        if self.buffer.len() < PACKET_SIZE {
            return Ok(());
        }

        let peer_p2: Vec<u8> = self.buffer.drain(..PACKET_SIZE).collect();

        // A digest peer answers with a signature we have no need to check.  A simple peer must
        // echo our random block.
        if !self.peer_signed && peer_p2[8..] != self.my_p1[8..] {
            return Err(HandshakeError::IncorrectRandomData);
        }

        self.current_stage = Stage::Complete;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::digest::{self, DigestScheme, DIGEST_LENGTH, GENUINE_FMS_KEY, GENUINE_FP_KEY};
    use super::*;

    fn in_progress(result: HandshakeProcessResult) -> Vec<u8> {
        match result {
            HandshakeProcessResult::InProgress { response_bytes } => response_bytes,
            x => panic!("Expected in progress result, instead received {:?}", x),
        }
    }

    fn simple_p0_and_p1() -> Vec<u8> {
        let mut bytes = vec![0_u8; PACKET_SIZE + 1];
        bytes[0] = RTMP_VERSION;
        rand::thread_rng().fill(&mut bytes[9..]);
        bytes
    }

    #[test]
    fn outbound_packets_are_version_and_signed_block() {
        let mut handshake = Handshake::new(PeerType::Client);
        let bytes = handshake.generate_outbound_p0_and_p1().unwrap();

        assert_eq!(bytes.len(), PACKET_SIZE + 1);
        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[5..9], &CLIENT_VERSION);
        assert_eq!(handshake.phase(), HandshakePhase::Begun);

        let found = digest::find_valid_digest(&bytes[1..], GENUINE_FP_KEY).unwrap();
        assert!(found.is_some(), "Client p1 was not signed with the player key");
    }

    #[test]
    fn cannot_generate_outbound_packets_twice() {
        let mut handshake = Handshake::new(PeerType::Server);
        handshake.generate_outbound_p0_and_p1().unwrap();

        match handshake.generate_outbound_p0_and_p1() {
            Err(HandshakeError::OutboundPacketsAlreadyGenerated) => (),
            x => panic!("Expected already generated error, instead received {:?}", x),
        }
    }

    #[test]
    fn bad_version_byte_is_an_error() {
        let mut handshake = Handshake::new(PeerType::Server);
        handshake.generate_outbound_p0_and_p1().unwrap();

        match handshake.process_bytes(&[6]) {
            Err(HandshakeError::BadVersionId(6)) => (),
            x => panic!("Expected bad version error, instead received {:?}", x),
        }
    }

    #[test]
    fn two_handshakes_complete_against_each_other_in_digest_mode() {
        let mut client = Handshake::new(PeerType::Client);
        let mut server = Handshake::new(PeerType::Server);

        let c0_and_c1 = client.generate_outbound_p0_and_p1().unwrap();
        let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();

        let s2 = in_progress(server.process_bytes(&c0_and_c1).unwrap());
        let c2 = in_progress(client.process_bytes(&s0_and_s1).unwrap());
        assert_eq!(server.phase(), HandshakePhase::Continued);
        assert_eq!(client.phase(), HandshakePhase::Continued);
        assert!(server.is_digest_mode());
        assert!(client.is_digest_mode());

        match client.process_bytes(&s2).unwrap() {
            HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            } => {
                assert!(response_bytes.is_empty());
                assert!(remaining_bytes.is_empty());
            }

            x => panic!("Expected completed result, instead received {:?}", x),
        }

        match server.process_bytes(&c2).unwrap() {
            HandshakeProcessResult::Completed { .. } => (),
            x => panic!("Expected completed result, instead received {:?}", x),
        }

        assert_eq!(client.phase(), HandshakePhase::Complete);
        assert_eq!(server.phase(), HandshakePhase::Complete);
    }

    #[test]
    fn server_answers_signed_client_with_digest_response() {
        let mut c1 = vec![0_u8; PACKET_SIZE];
        rand::thread_rng().fill(&mut c1[..]);
        let client_digest =
            digest::sign_packet(&mut c1, DigestScheme::Trailing, GENUINE_FP_KEY).unwrap();

        let mut input = vec![RTMP_VERSION];
        input.extend_from_slice(&c1);

        let mut server = Handshake::new(PeerType::Server);
        let response = in_progress(server.process_bytes(&input).unwrap());

        // s0 + s1 + s2
        assert_eq!(response.len(), 1 + PACKET_SIZE * 2);
        let s2 = &response[1 + PACKET_SIZE..];
        let challenge_key =
            digest::calculate_hmac(&client_digest, &digest::key_with_crud(GENUINE_FMS_KEY))
                .unwrap();

        let expected =
            digest::calculate_hmac(&s2[..PACKET_SIZE - DIGEST_LENGTH], &challenge_key).unwrap();

        assert_eq!(&s2[PACKET_SIZE - DIGEST_LENGTH..], &expected[..]);
        assert!(server.is_digest_mode());
    }

    #[test]
    fn server_echoes_simple_client() {
        let mut server = Handshake::new(PeerType::Server);
        let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();

        let c0_and_c1 = simple_p0_and_p1();
        let s2 = in_progress(server.process_bytes(&c0_and_c1).unwrap());
        assert_eq!(&s2[..], &c0_and_c1[1..]);
        assert!(!server.is_digest_mode());

        let c2 = s0_and_s1[1..].to_vec();
        match server.process_bytes(&c2).unwrap() {
            HandshakeProcessResult::Completed { .. } => (),
            x => panic!("Expected completed result, instead received {:?}", x),
        }
    }

    #[test]
    fn simple_peer_with_wrong_echo_is_rejected() {
        let mut server = Handshake::new(PeerType::Server);
        let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();
        server.process_bytes(&simple_p0_and_p1()).unwrap();

        let mut c2 = s0_and_s1[1..].to_vec();
        c2[100] = c2[100].wrapping_add(1);

        match server.process_bytes(&c2) {
            Err(HandshakeError::IncorrectRandomData) => (),
            x => panic!("Expected incorrect random data error, instead received {:?}", x),
        }
    }

    #[test]
    fn client_falls_back_to_echo_when_server_is_unsigned() {
        let mut client = Handshake::new(PeerType::Client);
        let c0_and_c1 = client.generate_outbound_p0_and_p1().unwrap();

        let s0_and_s1 = simple_p0_and_p1();
        let c2 = in_progress(client.process_bytes(&s0_and_s1).unwrap());
        assert_eq!(&c2[..], &s0_and_s1[1..]);

        let s2 = c0_and_c1[1..].to_vec();
        match client.process_bytes(&s2).unwrap() {
            HandshakeProcessResult::Completed { .. } => (),
            x => panic!("Expected completed result, instead received {:?}", x),
        }
    }

    #[test]
    fn extra_bytes_after_p2_are_returned_on_completion() {
        let mut client = Handshake::new(PeerType::Client);
        let mut server = Handshake::new(PeerType::Server);

        let c0_and_c1 = client.generate_outbound_p0_and_p1().unwrap();
        let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();
        let s2 = in_progress(server.process_bytes(&c0_and_c1).unwrap());

        // The whole server side arrives in a single read with chunk data right behind it
        let mut input = s0_and_s1;
        input.extend(s2);
        input.extend(&[1, 2, 3]);

        match client.process_bytes(&input).unwrap() {
            HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            } => {
                assert_eq!(response_bytes.len(), PACKET_SIZE, "c2 missing from response");
                assert_eq!(remaining_bytes, vec![1, 2, 3]);
            }

            x => panic!("Expected completed result, instead received {:?}", x),
        }
    }

    #[test]
    fn bytes_arriving_one_at_a_time_still_complete() {
        let mut client = Handshake::new(PeerType::Client);
        let mut server = Handshake::new(PeerType::Server);

        let c0_and_c1 = client.generate_outbound_p0_and_p1().unwrap();
        let s0_and_s1 = server.generate_outbound_p0_and_p1().unwrap();

        let mut s2 = Vec::new();
        for byte in c0_and_c1 {
            s2.extend(in_progress(server.process_bytes(&[byte]).unwrap()));
        }

        let c2 = in_progress(client.process_bytes(&s0_and_s1).unwrap());
        client.process_bytes(&s2).unwrap();

        let (last, rest) = c2.split_last().unwrap();
        for byte in rest {
            in_progress(server.process_bytes(&[*byte]).unwrap());
        }

        match server.process_bytes(&[*last]).unwrap() {
            HandshakeProcessResult::Completed { .. } => (),
            x => panic!("Expected completed result, instead received {:?}", x),
        }
    }
}
