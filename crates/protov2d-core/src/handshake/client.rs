// ============================================
// File: crates/protov2d-core/src/handshake/client.rs
// ============================================
//! # Client-Side Handshake State Machine
//!
//! ## Creation Reason
//! Mirrors the server machine from the client's side: emits the
//! initial negotiation record, authenticates the server against the
//! pin set, performs the hybrid key agreement, and proves possession
//! of the session key.
//!
//! ## States
//! ```text
//! Idle ──initial()──► AwaitResponse (v2) ──► AwaitEstablished ──► Complete
//!          │
//!          └────────► V1AwaitKex ──► V1AwaitChallenge
//!                        ──► V1AwaitEstablished ──► Complete
//! ```
//!
//! The pin check happens on the server's key-exchange material,
//! strictly before any session signature leaves this machine.
//!
//! ## Last Modified
//! v0.1.0 - Initial client state machine

use std::sync::Arc;

use tracing::{debug, trace};

use protov2d_common::bytes::{from_hex, to_hex};

use super::pin::PinSet;
use super::v1_challenge;
use crate::crypto::aead::{aes_decrypt, aes_encrypt, AesKey, KeyStack};
use crate::crypto::exchange::{kem_encapsulate, DhKeyPair};
use crate::crypto::keys::HybridSignature;
use crate::crypto::{
    IdentityKeyPair, IdentityPublicKey, CHALLENGE_SIZE, DILITHIUM_SIGNATURE_SIZE,
    ED25519_SIGNATURE_SIZE, HYBRID_PUBLIC_KEY_SIZE, KYBER_PUBLIC_KEY_SIZE, SHA256_SIZE,
    X25519_PUBLIC_KEY_SIZE,
};
use crate::error::{CoreError, Result};
use crate::protocol::records::{
    decode_record, encode_record, ClientInit, EncryptionMode, V1Challenge, V1ClientKem,
    V1ClientProof, V1Established, V1ServerKex, VersionReject,
};
use crate::protocol::version::{PROTOCOL_V1, PROTOCOL_V2};
use crate::protocol::{
    ChannelTag, HS_CLIENT_COMPLETE, HS_ESTABLISHED, HS_SERVER_RESPONSE, RESPONSE_ENCRYPTED,
    RESPONSE_PLAINTEXT, RESPONSE_PLAINTEXT_REFUSED, RESPONSE_VERSION_REJECT,
};

// ============================================
// Result Types
// ============================================

/// Outcome of a completed client-side handshake.
#[derive(Debug)]
pub struct ClientHandshakeResult {
    /// Derived key stack (empty for plaintext sessions).
    pub key_stack: KeyStack,
    /// Whether the server created a fresh session (`false` = resumed).
    pub new_session: bool,
    /// Negotiated protocol version.
    pub version: u8,
}

/// Result of feeding one frame to the client state machine.
#[derive(Debug)]
pub enum ClientStep {
    /// Send this frame and keep reading.
    Send(Vec<u8>),
    /// Handshake complete.
    Complete(ClientHandshakeResult),
}

// ============================================
// States
// ============================================

enum State {
    Idle,
    AwaitResponse,
    V1AwaitKex,
    V1AwaitChallenge { key: AesKey },
    V1AwaitEstablished { key: AesKey },
    V2AwaitEstablished { stack: KeyStack },
    Done,
}

impl State {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitResponse => "AwaitResponse",
            Self::V1AwaitKex => "V1AwaitKex",
            Self::V1AwaitChallenge { .. } => "V1AwaitChallenge",
            Self::V1AwaitEstablished { .. } => "V1AwaitEstablished",
            Self::V2AwaitEstablished { .. } => "V2AwaitEstablished",
            Self::Done => "Done",
        }
    }
}

// ============================================
// ClientHandshake
// ============================================

/// Per-connection client handshake driver.
pub struct ClientHandshake {
    pins: PinSet,
    session_keys: Arc<IdentityKeyPair>,
    version: u8,
    supported: Vec<u8>,
    mode: EncryptionMode,
    state: State,
}

impl ClientHandshake {
    /// Creates a state machine for one connection attempt.
    ///
    /// `version` is the requested handshake version, `supported` the
    /// full list this client is willing to speak, and `mode` the
    /// encryption mode (usually [`PinSet::preferred_mode`]).
    #[must_use]
    pub fn new(
        pins: PinSet,
        session_keys: Arc<IdentityKeyPair>,
        version: u8,
        supported: Vec<u8>,
        mode: EncryptionMode,
    ) -> Self {
        Self {
            pins,
            session_keys,
            version,
            supported,
            mode,
            state: State::Idle,
        }
    }

    /// Builds the initial packet and arms the machine.
    ///
    /// # Errors
    /// Returns `RecordDecode` if the record cannot be encoded.
    pub fn initial(&mut self) -> Result<Vec<u8>> {
        let record = ClientInit::new(self.version, self.supported.clone(), self.mode);
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&encode_record(&record)?);

        self.state = if self.version == PROTOCOL_V1 {
            State::V1AwaitKex
        } else {
            State::AwaitResponse
        };
        Ok(frame)
    }

    /// Feeds one handshake frame through the machine.
    ///
    /// # Errors
    /// Any error fails the handshake. `VersionRejected` carries the
    /// server's supported list so the driver can decide on a v1
    /// fallback; everything else is terminal for this attempt.
    pub fn process(&mut self, frame: &[u8]) -> Result<ClientStep> {
        let body = strip_handshake_tag(frame)?;
        let state = std::mem::replace(&mut self.state, State::Done);
        trace!(state = state.name(), len = frame.len(), "handshake frame");

        let (next, step) = match state {
            State::AwaitResponse => self.on_response(body)?,
            State::V1AwaitKex => self.on_v1_kex(body)?,
            State::V1AwaitChallenge { key } => self.on_v1_challenge(body, key)?,
            State::V1AwaitEstablished { key } => self.on_v1_established(body, key)?,
            State::V2AwaitEstablished { stack } => Self::on_v2_established(body, stack)?,
            State::Idle => return Err(CoreError::UnexpectedFrame { state: "Idle" }),
            State::Done => return Err(CoreError::UnexpectedFrame { state: "Done" }),
        };

        self.state = next;
        Ok(step)
    }

    // ========================================
    // v2 Flow
    // ========================================

    fn on_response(&self, body: &[u8]) -> Result<(State, ClientStep)> {
        let (&packet, rest) = body.split_first().ok_or(CoreError::too_short(2, body.len()))?;
        if packet != HS_SERVER_RESPONSE {
            return Err(CoreError::UnexpectedFrame {
                state: "AwaitResponse",
            });
        }
        let (&response_mode, payload) =
            rest.split_first().ok_or(CoreError::too_short(3, body.len()))?;

        match response_mode {
            RESPONSE_ENCRYPTED => self.on_encrypted_response(payload),
            RESPONSE_PLAINTEXT => self.on_plaintext_response(payload),
            RESPONSE_PLAINTEXT_REFUSED => Err(CoreError::PlaintextRefused),
            RESPONSE_VERSION_REJECT => {
                let reject: VersionReject = decode_record(payload, "VersionReject")?;
                Err(CoreError::VersionRejected { supported: reject.0 })
            }
            other => Err(CoreError::malformed(format!(
                "unknown server response mode 0x{other:02x}"
            ))),
        }
    }

    fn on_encrypted_response(&self, payload: &[u8]) -> Result<(State, ClientStep)> {
        // Fixed layout: x25519(32) ∥ kyber(1568) ∥ sigC(64) ∥
        // sigPq(4595) ∥ challenge(64) ∥ pin material.
        let kex_len = X25519_PUBLIC_KEY_SIZE + KYBER_PUBLIC_KEY_SIZE;
        let fixed = kex_len + ED25519_SIGNATURE_SIZE + DILITHIUM_SIGNATURE_SIZE + CHALLENGE_SIZE;
        if payload.len() < fixed {
            return Err(CoreError::too_short(fixed, payload.len()));
        }

        let kex_material = &payload[..kex_len];
        let server_x25519 = &payload[..X25519_PUBLIC_KEY_SIZE];
        let server_kyber = &payload[X25519_PUBLIC_KEY_SIZE..kex_len];

        let mut offset = kex_len;
        let mut classic = [0u8; ED25519_SIGNATURE_SIZE];
        classic.copy_from_slice(&payload[offset..offset + ED25519_SIGNATURE_SIZE]);
        offset += ED25519_SIGNATURE_SIZE;
        let pq = payload[offset..offset + DILITHIUM_SIGNATURE_SIZE].to_vec();
        offset += DILITHIUM_SIGNATURE_SIZE;
        let challenge = &payload[offset..offset + CHALLENGE_SIZE];
        offset += CHALLENGE_SIZE;
        let pin_material = &payload[offset..];

        let signature = HybridSignature { classic, pq };

        // Identity check strictly before any session signature leaves.
        let verification_key: Option<Vec<u8>> = match self.mode {
            EncryptionMode::FullKey => {
                if pin_material.len() != HYBRID_PUBLIC_KEY_SIZE {
                    return Err(CoreError::malformed("full-key pin material length"));
                }
                self.pins.verify_full_key(pin_material)?;
                Some(pin_material.to_vec())
            }
            EncryptionMode::HashPin => {
                if pin_material.len() != SHA256_SIZE {
                    return Err(CoreError::malformed("hash pin material length"));
                }
                self.pins.resolve_hash(pin_material)?.map(<[u8]>::to_vec)
            }
            EncryptionMode::Plaintext => {
                return Err(CoreError::UnexpectedFrame {
                    state: "AwaitResponse",
                });
            }
        };

        if let Some(root) = verification_key {
            IdentityPublicKey::from_bytes(&root)?.verify(kex_material, &signature)?;
        }

        // Key agreement: classical DH plus Kyber encapsulation.
        let dh = DhKeyPair::generate();
        let k_classic = dh.shared_key(server_x25519)?;
        let (kyber_ct, k_pq) = kem_encapsulate(server_kyber)?;

        // Session proof, doubly sealed so both keys are imposed.
        let proof_sig = self.session_keys.sign(challenge);
        let mut proof = Vec::with_capacity(
            HYBRID_PUBLIC_KEY_SIZE + ED25519_SIGNATURE_SIZE + DILITHIUM_SIGNATURE_SIZE,
        );
        proof.extend_from_slice(&self.session_keys.public_key_bytes());
        proof.extend_from_slice(&proof_sig.to_bytes());

        let sealed = aes_encrypt(&aes_encrypt(&proof, &k_pq, true)?, &k_classic, true)?;

        let mut out = Vec::with_capacity(2 + X25519_PUBLIC_KEY_SIZE + kyber_ct.len() + sealed.len());
        out.push(ChannelTag::Handshake.as_byte());
        out.push(HS_CLIENT_COMPLETE);
        out.extend_from_slice(&dh.public_key_bytes());
        out.extend_from_slice(&kyber_ct);
        out.extend_from_slice(&sealed);

        debug!("v2 server identity verified, completion sent");
        Ok((
            State::V2AwaitEstablished {
                stack: KeyStack::new(vec![k_pq, k_classic]),
            },
            ClientStep::Send(out),
        ))
    }

    fn on_plaintext_response(&self, payload: &[u8]) -> Result<(State, ClientStep)> {
        if self.mode != EncryptionMode::Plaintext {
            return Err(CoreError::UnexpectedFrame {
                state: "AwaitResponse",
            });
        }
        if payload.len() != CHALLENGE_SIZE {
            return Err(CoreError::too_short(CHALLENGE_SIZE, payload.len()));
        }

        let proof_sig = self.session_keys.sign(payload);
        let mut out = Vec::with_capacity(2 + HYBRID_PUBLIC_KEY_SIZE + 64 + 4595);
        out.push(ChannelTag::Handshake.as_byte());
        out.push(HS_CLIENT_COMPLETE);
        out.extend_from_slice(&self.session_keys.public_key_bytes());
        out.extend_from_slice(&proof_sig.to_bytes());

        Ok((
            State::V2AwaitEstablished {
                stack: KeyStack::plaintext(),
            },
            ClientStep::Send(out),
        ))
    }

    fn on_v2_established(body: &[u8], stack: KeyStack) -> Result<(State, ClientStep)> {
        let payload = match body.split_first() {
            Some((&t, rest)) if t == HS_ESTABLISHED => rest,
            _ => {
                return Err(CoreError::UnexpectedFrame {
                    state: "V2AwaitEstablished",
                })
            }
        };
        let new_session = match payload {
            [0] => false,
            [1] => true,
            _ => return Err(CoreError::malformed("established flag")),
        };

        Ok((
            State::Done,
            ClientStep::Complete(ClientHandshakeResult {
                key_stack: stack,
                new_session,
                version: PROTOCOL_V2,
            }),
        ))
    }

    // ========================================
    // v1 Flow
    // ========================================

    fn on_v1_kex(&self, body: &[u8]) -> Result<(State, ClientStep)> {
        let record: V1ServerKex = decode_record(body, "V1ServerKex")?;
        record.validate()?;

        let eph_pq_pub = from_hex(&record.1)?;
        let composite = from_hex(&record.2)?;
        let root_public = from_hex(&record.3)?;

        // Pin enforcement before anything else leaves this side.
        self.pins.verify_full_key(&root_public)?;

        let signature = HybridSignature::from_v1_composite(&composite)?;
        IdentityPublicKey::from_bytes(&root_public)?.verify(&eph_pq_pub, &signature)?;

        let (kyber_ct, key) = kem_encapsulate(&eph_pq_pub)?;

        let mut out = vec![ChannelTag::Handshake.as_byte()];
        out.extend_from_slice(&encode_record(&V1ClientKem::new(to_hex(&kyber_ct)))?);

        debug!("v1 server identity verified, KEM ciphertext sent");
        Ok((State::V1AwaitChallenge { key }, ClientStep::Send(out)))
    }

    fn on_v1_challenge(&self, body: &[u8], key: AesKey) -> Result<(State, ClientStep)> {
        let plain = aes_decrypt(body, &key, false)?;
        let record: V1Challenge = decode_record(&plain, "V1Challenge")?;
        record.validate()?;

        let challenge = v1_challenge(&record.1);
        let signature = self.session_keys.sign(&challenge);

        let proof = V1ClientProof::new(
            to_hex(&self.session_keys.public_key_bytes()),
            to_hex(&signature.to_v1_composite()),
        );
        let sealed = aes_encrypt(&encode_record(&proof)?, &key, false)?;

        let mut out = vec![ChannelTag::Handshake.as_byte()];
        out.extend_from_slice(&sealed);

        Ok((State::V1AwaitEstablished { key }, ClientStep::Send(out)))
    }

    fn on_v1_established(&self, body: &[u8], key: AesKey) -> Result<(State, ClientStep)> {
        let plain = aes_decrypt(body, &key, false)?;
        let record: V1Established = decode_record(&plain, "V1Established")?;
        record.validate()?;

        Ok((
            State::Done,
            ClientStep::Complete(ClientHandshakeResult {
                key_stack: KeyStack::new(vec![key]),
                new_session: record.new_session(),
                version: PROTOCOL_V1,
            }),
        ))
    }
}

fn strip_handshake_tag(frame: &[u8]) -> Result<&[u8]> {
    match frame.split_first() {
        Some((&tag, body)) if tag == ChannelTag::Handshake.as_byte() => Ok(body),
        Some((&tag, _)) => Err(CoreError::malformed(format!(
            "expected handshake tag, got 0x{tag:02x}"
        ))),
        None => Err(CoreError::too_short(1, 0)),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::super::server::{ServerHandshake, ServerStep};
    use super::super::session_id_for;
    use super::*;
    use crate::crypto::sha256;
    use crate::protocol::version::uses_digest;

    /// Drives both machines against each other in memory and returns
    /// the results from each side.
    fn run_handshake(
        server: &mut ServerHandshake,
        client: &mut ClientHandshake,
    ) -> Result<(crate::handshake::HandshakeResult, ClientHandshakeResult)> {
        let mut to_server = client.initial()?;
        loop {
            let step = server.process(&to_server)?;
            let to_client = match step {
                ServerStep::Reply(frame) => frame,
                ServerStep::Reject { error, .. } => return Err(error),
                ServerStep::Complete(result) => {
                    let reply = result.established_reply(true)?;
                    match client.process(&reply)? {
                        ClientStep::Complete(client_result) => {
                            return Ok((result, client_result))
                        }
                        ClientStep::Send(_) => {
                            return Err(CoreError::malformed("client kept talking"))
                        }
                    }
                }
            };
            match client.process(&to_client)? {
                ClientStep::Send(frame) => to_server = frame,
                ClientStep::Complete(_) => {
                    return Err(CoreError::malformed("client finished early"))
                }
            }
        }
    }

    fn root() -> Arc<IdentityKeyPair> {
        Arc::new(IdentityKeyPair::generate())
    }

    fn session() -> Arc<IdentityKeyPair> {
        Arc::new(IdentityKeyPair::generate())
    }

    #[test]
    fn test_v2_full_key_handshake() {
        let root = root();
        let session_keys = session();
        let pins = PinSet::single_hash(sha256(&root.public_key_bytes()).to_vec()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client = ClientHandshake::new(
            pins.clone(),
            Arc::clone(&session_keys),
            2,
            vec![1, 2],
            pins.preferred_mode(false),
        );

        let (server_result, client_result) =
            run_handshake(&mut server, &mut client).unwrap();

        assert_eq!(server_result.version, PROTOCOL_V2);
        assert_eq!(client_result.version, PROTOCOL_V2);
        assert!(client_result.new_session);
        assert_eq!(server_result.session_public, session_keys.public_key_bytes());
        assert_eq!(
            server_result.session_id,
            session_id_for(&session_keys.public_key_bytes(), 2)
        );

        // Both sides derived the same two-key stack.
        assert_eq!(server_result.key_stack.len(), 2);
        assert_eq!(client_result.key_stack.len(), 2);
        let sealed = client_result.key_stack.seal(b"smoke", true).unwrap();
        assert_eq!(server_result.key_stack.open(&sealed, true).unwrap(), b"smoke");
    }

    #[test]
    fn test_v2_hash_mode_handshake() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();
        assert_eq!(pins.preferred_mode(false), EncryptionMode::HashPin);

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client =
            ClientHandshake::new(pins, session(), 2, vec![1, 2], EncryptionMode::HashPin);

        let (server_result, client_result) =
            run_handshake(&mut server, &mut client).unwrap();
        assert_eq!(server_result.key_stack.len(), 2);
        assert_eq!(client_result.key_stack.len(), 2);
    }

    #[test]
    fn test_v1_handshake() {
        let root = root();
        let session_keys = session();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client = ClientHandshake::new(
            pins,
            Arc::clone(&session_keys),
            1,
            vec![1],
            EncryptionMode::HashPin,
        );

        let (server_result, client_result) =
            run_handshake(&mut server, &mut client).unwrap();

        assert_eq!(server_result.version, PROTOCOL_V1);
        assert_eq!(client_result.version, PROTOCOL_V1);
        assert_eq!(server_result.key_stack.len(), 1);
        assert_eq!(client_result.key_stack.len(), 1);
        assert!(!uses_digest(server_result.version));

        // v1 session IDs use the Dilithium half only.
        assert_eq!(
            server_result.session_id,
            session_id_for(&session_keys.public_key_bytes(), 1)
        );

        let sealed = client_result.key_stack.seal(b"legacy", false).unwrap();
        assert_eq!(
            server_result.key_stack.open(&sealed, false).unwrap(),
            b"legacy"
        );
    }

    #[test]
    fn test_v2_plaintext_handshake() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), true);
        let mut client =
            ClientHandshake::new(pins, session(), 2, vec![2], EncryptionMode::Plaintext);

        let (server_result, client_result) =
            run_handshake(&mut server, &mut client).unwrap();
        assert!(server_result.key_stack.is_plaintext());
        assert!(client_result.key_stack.is_plaintext());
    }

    #[test]
    fn test_pin_mismatch_aborts_before_proof() {
        let root = root();
        let other = IdentityKeyPair::generate();
        let pins = PinSet::single_hash(sha256(&other.public_key_bytes()).to_vec()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client =
            ClientHandshake::new(pins, session(), 2, vec![1, 2], EncryptionMode::FullKey);

        let initial = client.initial().unwrap();
        let response = match server.process(&initial).unwrap() {
            ServerStep::Reply(frame) => frame,
            other => panic!("expected reply, got {other:?}"),
        };

        // The client must refuse to continue: no completion frame.
        assert!(matches!(
            client.process(&response),
            Err(CoreError::PinMismatch)
        ));
    }

    #[test]
    fn test_tampered_server_signature_rejected() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client =
            ClientHandshake::new(pins, session(), 2, vec![1, 2], EncryptionMode::FullKey);

        let initial = client.initial().unwrap();
        let mut response = match server.process(&initial).unwrap() {
            ServerStep::Reply(frame) => frame,
            other => panic!("expected reply, got {other:?}"),
        };

        // Flip a byte inside the classical signature (offset 1603 + 3-byte header).
        response[3 + 1600 + 10] ^= 0xFF;
        assert!(matches!(
            client.process(&response),
            Err(CoreError::SignatureVerification)
        ));
    }

    #[test]
    fn test_version_reject_surfaces_supported_list() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client =
            ClientHandshake::new(pins, session(), 7, vec![7], EncryptionMode::HashPin);

        let initial = client.initial().unwrap();
        let reply = match server.process(&initial).unwrap() {
            ServerStep::Reject { reply, .. } => reply,
            other => panic!("expected reject, got {other:?}"),
        };

        match client.process(&reply) {
            Err(CoreError::VersionRejected { supported }) => {
                assert_eq!(supported, vec![1, 2]);
            }
            other => panic!("expected version reject, got {other:?}"),
        }
    }

    #[test]
    fn test_v1_sentinel_tampering_rejected() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client =
            ClientHandshake::new(pins, session(), 1, vec![1], EncryptionMode::HashPin);

        let initial = client.initial().unwrap();
        let response = match server.process(&initial).unwrap() {
            ServerStep::Reply(frame) => frame,
            other => panic!("expected reply, got {other:?}"),
        };

        // Rewrite the composite signature hex so the sentinel is off.
        let record: V1ServerKex = decode_record(&response[1..], "V1ServerKex").unwrap();
        let mut composite = from_hex(&record.2).unwrap();
        composite[ED25519_SIGNATURE_SIZE] = 0x00;
        let tampered = V1ServerKex::new(record.1.clone(), to_hex(&composite), record.3.clone());
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&encode_record(&tampered).unwrap());

        assert!(matches!(
            client.process(&frame),
            Err(CoreError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_resumed_flag_propagates() {
        let root = root();
        let pins = PinSet::single_key(root.public_key_bytes()).unwrap();

        let mut server = ServerHandshake::new(Arc::clone(&root), false);
        let mut client = ClientHandshake::new(
            pins,
            session(),
            2,
            vec![1, 2],
            EncryptionMode::HashPin,
        );

        let mut to_server = client.initial().unwrap();
        let result = loop {
            match server.process(&to_server).unwrap() {
                ServerStep::Reply(frame) => match client.process(&frame).unwrap() {
                    ClientStep::Send(frame) => to_server = frame,
                    ClientStep::Complete(_) => unreachable!(),
                },
                ServerStep::Complete(result) => break result,
                ServerStep::Reject { .. } => unreachable!(),
            }
        };

        // Session table says "resumed": the client must see new_session = false.
        let reply = result.established_reply(false).unwrap();
        match client.process(&reply).unwrap() {
            ClientStep::Complete(client_result) => assert!(!client_result.new_session),
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
