// ============================================
// File: crates/protov2d-core/src/handshake/server.rs
// ============================================
//! # Server-Side Handshake State Machine
//!
//! ## Creation Reason
//! Drives one connection's handshake on the server: version
//! negotiation, key agreement, and verification of the client's
//! session-key proof, for both protocol generations.
//!
//! ## States
//! ```text
//! AwaitInit ──[1,1,..]──► V1AwaitKem ──► V1AwaitProof ──► Complete
//!     │
//!     └─────[1,2,..]──► V2AwaitCompletion ─────────────► Complete
//!                        (encrypted or plaintext)
//! ```
//! Version rejection and plaintext refusal terminate with a reply the
//! caller sends before closing. Every other failure is an error the
//! caller maps to a silent close; no partial state leaks.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ephemeral key pairs live only inside the state variant that
//!   needs them and are dropped on transition
//! - The established reply is built by the session layer via
//!   [`HandshakeResult::established_reply`], after the session table
//!   decides fresh-vs-resumed
//!
//! ## Last Modified
//! v0.1.0 - Initial server state machine

use std::sync::Arc;

use tracing::{debug, trace};

use protov2d_common::bytes::{from_hex, to_hex};

use super::{session_id_for, v1_challenge, HandshakeResult};
use crate::crypto::aead::{aes_decrypt, aes_encrypt, AesKey, KeyStack};
use crate::crypto::exchange::{DhKeyPair, KemKeyPair};
use crate::crypto::keys::HybridSignature;
use crate::crypto::{
    random_array, random_string, sha256, IdentityKeyPair, IdentityPublicKey, CHALLENGE_SIZE,
    DILITHIUM_SIGNATURE_SIZE, ED25519_SIGNATURE_SIZE, HYBRID_PUBLIC_KEY_SIZE,
    KYBER_CIPHERTEXT_SIZE, X25519_PUBLIC_KEY_SIZE,
};
use crate::error::{CoreError, Result};
use crate::protocol::records::{
    decode_record, encode_record, ClientInit, EncryptionMode, V1Challenge, V1ClientKem,
    V1ClientProof, V1ServerKex, VersionReject,
};
use crate::protocol::version::{is_supported, PROTOCOL_V1, PROTOCOL_V2, SUPPORTED_VERSIONS};
use crate::protocol::{
    ChannelTag, HS_CLIENT_COMPLETE, HS_SERVER_RESPONSE, RESPONSE_ENCRYPTED, RESPONSE_PLAINTEXT,
    RESPONSE_PLAINTEXT_REFUSED, RESPONSE_VERSION_REJECT,
};

// ============================================
// Steps
// ============================================

/// Result of feeding one frame to the server state machine.
#[derive(Debug)]
pub enum ServerStep {
    /// Send this frame and keep reading.
    Reply(Vec<u8>),
    /// Send this frame, then close the transport; negotiation ended.
    Reject {
        /// Frame to send before closing.
        reply: Vec<u8>,
        /// Why the handshake was rejected.
        error: CoreError,
    },
    /// Handshake complete; hand the result to the session layer.
    Complete(HandshakeResult),
}

// ============================================
// States
// ============================================

enum State {
    AwaitInit,
    V1AwaitKem {
        kem: KemKeyPair,
    },
    V1AwaitProof {
        key: AesKey,
        challenge: [u8; 64],
    },
    V2AwaitCompletion {
        dh: DhKeyPair,
        kem: KemKeyPair,
        challenge: [u8; CHALLENGE_SIZE],
    },
    V2AwaitPlainCompletion {
        challenge: [u8; CHALLENGE_SIZE],
    },
    Done,
}

impl State {
    const fn name(&self) -> &'static str {
        match self {
            Self::AwaitInit => "AwaitInit",
            Self::V1AwaitKem { .. } => "V1AwaitKem",
            Self::V1AwaitProof { .. } => "V1AwaitProof",
            Self::V2AwaitCompletion { .. } => "V2AwaitCompletion",
            Self::V2AwaitPlainCompletion { .. } => "V2AwaitPlainCompletion",
            Self::Done => "Done",
        }
    }
}

// ============================================
// ServerHandshake
// ============================================

/// Per-connection server handshake driver.
pub struct ServerHandshake {
    identity: Arc<IdentityKeyPair>,
    allow_plaintext: bool,
    state: State,
}

impl ServerHandshake {
    /// Creates a fresh state machine for one incoming transport.
    #[must_use]
    pub fn new(identity: Arc<IdentityKeyPair>, allow_plaintext: bool) -> Self {
        Self {
            identity,
            allow_plaintext,
            state: State::AwaitInit,
        }
    }

    /// Feeds one handshake frame through the machine.
    ///
    /// # Errors
    /// Any error fails the handshake; the caller must close the
    /// transport and discard this machine.
    pub fn process(&mut self, frame: &[u8]) -> Result<ServerStep> {
        let body = strip_handshake_tag(frame)?;
        let state = std::mem::replace(&mut self.state, State::Done);
        trace!(state = state.name(), len = frame.len(), "handshake frame");

        let (next, step) = match state {
            State::AwaitInit => self.on_init(body)?,
            State::V1AwaitKem { kem } => self.on_v1_kem(body, kem)?,
            State::V1AwaitProof { key, challenge } => self.on_v1_proof(body, key, &challenge)?,
            State::V2AwaitCompletion { dh, kem, challenge } => {
                self.on_v2_completion(body, &dh, &kem, &challenge)?
            }
            State::V2AwaitPlainCompletion { challenge } => {
                self.on_v2_plain_completion(body, &challenge)?
            }
            State::Done => {
                return Err(CoreError::UnexpectedFrame { state: "Done" });
            }
        };

        self.state = next;
        Ok(step)
    }

    // ========================================
    // Initial Packet
    // ========================================

    fn on_init(&self, body: &[u8]) -> Result<(State, ServerStep)> {
        let init: ClientInit = decode_record(body, "ClientInit")?;
        init.validate()?;

        let requested = init.handshake_version();
        debug!(version = requested, "handshake init");

        if !is_supported(requested) || !init.supported_versions().iter().any(|v| is_supported(*v)) {
            let mut reply = vec![
                ChannelTag::Handshake.as_byte(),
                HS_SERVER_RESPONSE,
                RESPONSE_VERSION_REJECT,
            ];
            reply.extend_from_slice(&encode_record(&VersionReject(
                SUPPORTED_VERSIONS.to_vec(),
            ))?);
            return Ok((
                State::Done,
                ServerStep::Reject {
                    reply,
                    error: CoreError::UnsupportedVersion { requested },
                },
            ));
        }

        if requested == PROTOCOL_V1 {
            return self.v1_kex_response();
        }

        match init.encryption_mode()? {
            EncryptionMode::Plaintext => {
                if !self.allow_plaintext {
                    let reply = vec![
                        ChannelTag::Handshake.as_byte(),
                        HS_SERVER_RESPONSE,
                        RESPONSE_PLAINTEXT_REFUSED,
                    ];
                    return Ok((
                        State::Done,
                        ServerStep::Reject {
                            reply,
                            error: CoreError::PlaintextRefused,
                        },
                    ));
                }
                let challenge: [u8; CHALLENGE_SIZE] = random_array();
                let mut reply = vec![
                    ChannelTag::Handshake.as_byte(),
                    HS_SERVER_RESPONSE,
                    RESPONSE_PLAINTEXT,
                ];
                reply.extend_from_slice(&challenge);
                Ok((
                    State::V2AwaitPlainCompletion { challenge },
                    ServerStep::Reply(reply),
                ))
            }
            mode => self.v2_kex_response(mode),
        }
    }

    // ========================================
    // v2 Flow
    // ========================================

    fn v2_kex_response(&self, mode: EncryptionMode) -> Result<(State, ServerStep)> {
        let dh = DhKeyPair::generate();
        let kem = KemKeyPair::generate();
        let challenge: [u8; CHALLENGE_SIZE] = random_array();

        let mut kex_material =
            Vec::with_capacity(X25519_PUBLIC_KEY_SIZE + kem.public_key_bytes().len());
        kex_material.extend_from_slice(&dh.public_key_bytes());
        kex_material.extend_from_slice(kem.public_key_bytes());

        let signature = self.identity.sign(&kex_material);
        let root_public = self.identity.public_key_bytes();

        let mut reply = Vec::with_capacity(3 + kex_material.len() + 64 + 4595 + 64 + 2624);
        reply.push(ChannelTag::Handshake.as_byte());
        reply.push(HS_SERVER_RESPONSE);
        reply.push(RESPONSE_ENCRYPTED);
        reply.extend_from_slice(&kex_material);
        reply.extend_from_slice(&signature.classic);
        reply.extend_from_slice(&signature.pq);
        reply.extend_from_slice(&challenge);
        match mode {
            EncryptionMode::FullKey => reply.extend_from_slice(&root_public),
            _ => reply.extend_from_slice(&sha256(&root_public)),
        }

        Ok((
            State::V2AwaitCompletion { dh, kem, challenge },
            ServerStep::Reply(reply),
        ))
    }

    fn on_v2_completion(
        &self,
        body: &[u8],
        dh: &DhKeyPair,
        kem: &KemKeyPair,
        challenge: &[u8; CHALLENGE_SIZE],
    ) -> Result<(State, ServerStep)> {
        let payload = strip_packet_type(body, HS_CLIENT_COMPLETE, "V2AwaitCompletion")?;

        let min = X25519_PUBLIC_KEY_SIZE + KYBER_CIPHERTEXT_SIZE + 1;
        if payload.len() < min {
            return Err(CoreError::too_short(min, payload.len()));
        }

        let client_x25519 = &payload[..X25519_PUBLIC_KEY_SIZE];
        let kyber_ct =
            &payload[X25519_PUBLIC_KEY_SIZE..X25519_PUBLIC_KEY_SIZE + KYBER_CIPHERTEXT_SIZE];
        let sealed = &payload[X25519_PUBLIC_KEY_SIZE + KYBER_CIPHERTEXT_SIZE..];

        let k_classic = dh.shared_key(client_x25519)?;
        let k_pq = kem.decapsulate(kyber_ct)?;

        // The double envelope imposes both keys: classical outermost.
        let inner = aes_decrypt(sealed, &k_classic, true)?;
        let proof = aes_decrypt(&inner, &k_pq, true)?;

        let (session_public, signature) = split_session_proof(&proof)?;
        let session_key = IdentityPublicKey::from_bytes(session_public)?;
        session_key.verify(challenge, &signature)?;

        let result = HandshakeResult {
            session_public: session_public.to_vec(),
            session_id: session_id_for(session_public, PROTOCOL_V2),
            version: PROTOCOL_V2,
            key_stack: KeyStack::new(vec![k_pq, k_classic]),
        };
        debug!(session_id = %result.session_id, "v2 handshake verified");
        Ok((State::Done, ServerStep::Complete(result)))
    }

    fn on_v2_plain_completion(
        &self,
        body: &[u8],
        challenge: &[u8; CHALLENGE_SIZE],
    ) -> Result<(State, ServerStep)> {
        let payload = strip_packet_type(body, HS_CLIENT_COMPLETE, "V2AwaitPlainCompletion")?;

        let (session_public, signature) = split_session_proof(payload)?;
        let session_key = IdentityPublicKey::from_bytes(session_public)?;
        session_key.verify(challenge, &signature)?;

        let result = HandshakeResult {
            session_public: session_public.to_vec(),
            session_id: session_id_for(session_public, PROTOCOL_V2),
            version: PROTOCOL_V2,
            key_stack: KeyStack::plaintext(),
        };
        debug!(session_id = %result.session_id, "v2 plaintext handshake verified");
        Ok((State::Done, ServerStep::Complete(result)))
    }

    // ========================================
    // v1 Flow
    // ========================================

    fn v1_kex_response(&self) -> Result<(State, ServerStep)> {
        let kem = KemKeyPair::generate();
        let signature = self.identity.sign(kem.public_key_bytes());

        let record = V1ServerKex::new(
            to_hex(kem.public_key_bytes()),
            to_hex(&signature.to_v1_composite()),
            to_hex(&self.identity.public_key_bytes()),
        );
        let mut reply = vec![ChannelTag::Handshake.as_byte()];
        reply.extend_from_slice(&encode_record(&record)?);

        Ok((State::V1AwaitKem { kem }, ServerStep::Reply(reply)))
    }

    fn on_v1_kem(&self, body: &[u8], kem: KemKeyPair) -> Result<(State, ServerStep)> {
        let record: V1ClientKem = decode_record(body, "V1ClientKem")?;
        record.validate()?;

        let ciphertext = from_hex(&record.1)?;
        let key = kem.decapsulate(&ciphertext)?;

        let nonce = random_string(64);
        let challenge = v1_challenge(&nonce);

        let sealed = aes_encrypt(&encode_record(&V1Challenge::new(nonce))?, &key, false)?;
        let mut reply = vec![ChannelTag::Handshake.as_byte()];
        reply.extend_from_slice(&sealed);

        Ok((
            State::V1AwaitProof { key, challenge },
            ServerStep::Reply(reply),
        ))
    }

    fn on_v1_proof(
        &self,
        body: &[u8],
        key: AesKey,
        challenge: &[u8; 64],
    ) -> Result<(State, ServerStep)> {
        let plain = aes_decrypt(body, &key, false)?;
        let record: V1ClientProof = decode_record(&plain, "V1ClientProof")?;
        record.validate()?;

        let session_public = from_hex(&record.1)?;
        if session_public.len() != HYBRID_PUBLIC_KEY_SIZE {
            return Err(CoreError::key_parse("v1 session public key length"));
        }
        let composite = from_hex(&record.2)?;
        let signature = HybridSignature::from_v1_composite(&composite)?;

        let session_key = IdentityPublicKey::from_bytes(&session_public)?;
        session_key.verify(challenge, &signature)?;

        let result = HandshakeResult {
            session_id: session_id_for(&session_public, PROTOCOL_V1),
            session_public,
            version: PROTOCOL_V1,
            key_stack: KeyStack::new(vec![key]),
        };
        debug!(session_id = %result.session_id, "v1 handshake verified");
        Ok((State::Done, ServerStep::Complete(result)))
    }
}

// ============================================
// Frame Helpers
// ============================================

fn strip_handshake_tag(frame: &[u8]) -> Result<&[u8]> {
    match frame.split_first() {
        Some((&tag, body)) if tag == ChannelTag::Handshake.as_byte() => Ok(body),
        Some((&tag, _)) => Err(CoreError::malformed(format!(
            "expected handshake tag, got 0x{tag:02x}"
        ))),
        None => Err(CoreError::too_short(1, 0)),
    }
}

fn strip_packet_type<'a>(
    body: &'a [u8],
    expected: u8,
    state: &'static str,
) -> Result<&'a [u8]> {
    match body.split_first() {
        Some((&t, rest)) if t == expected => Ok(rest),
        Some(_) => Err(CoreError::UnexpectedFrame { state }),
        None => Err(CoreError::too_short(1, 0)),
    }
}

/// Splits `sessionPub(2624) ∥ sigClassic(64) ∥ sigPq(4595)`.
fn split_session_proof(proof: &[u8]) -> Result<(&[u8], HybridSignature)> {
    let expected = HYBRID_PUBLIC_KEY_SIZE + ED25519_SIGNATURE_SIZE + DILITHIUM_SIGNATURE_SIZE;
    if proof.len() != expected {
        return Err(CoreError::too_short(expected, proof.len()));
    }
    let session_public = &proof[..HYBRID_PUBLIC_KEY_SIZE];
    let signature = HybridSignature::from_bytes(&proof[HYBRID_PUBLIC_KEY_SIZE..])?;
    Ok((session_public, signature))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ServerHandshake {
        ServerHandshake::new(Arc::new(IdentityKeyPair::generate()), false)
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut hs = machine();
        let init = encode_record(&ClientInit::new(9, vec![9], EncryptionMode::HashPin)).unwrap();
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&init);

        match hs.process(&frame).unwrap() {
            ServerStep::Reject { reply, error } => {
                assert_eq!(reply[2], RESPONSE_VERSION_REJECT);
                let reject: VersionReject =
                    decode_record(&reply[3..], "VersionReject").unwrap();
                assert_eq!(reject.0, SUPPORTED_VERSIONS.to_vec());
                assert!(matches!(error, CoreError::UnsupportedVersion { requested: 9 }));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn test_refuses_plaintext_by_default() {
        let mut hs = machine();
        let init =
            encode_record(&ClientInit::new(2, vec![2], EncryptionMode::Plaintext)).unwrap();
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&init);

        match hs.process(&frame).unwrap() {
            ServerStep::Reject { reply, error } => {
                assert_eq!(reply, vec![0x02, 0x02, RESPONSE_PLAINTEXT_REFUSED]);
                assert!(matches!(error, CoreError::PlaintextRefused));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn test_v2_response_layout() {
        let mut hs = machine();
        let init = encode_record(&ClientInit::new(2, vec![1, 2], EncryptionMode::FullKey)).unwrap();
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&init);

        let reply = match hs.process(&frame).unwrap() {
            ServerStep::Reply(r) => r,
            other => panic!("expected reply, got {other:?}"),
        };

        // 3-byte header, then the documented fixed offsets.
        assert_eq!(&reply[..2], &[0x02, 0x02]);
        assert_eq!(reply[2], RESPONSE_ENCRYPTED);
        assert_eq!(reply.len(), 6326 + HYBRID_PUBLIC_KEY_SIZE);
    }

    #[test]
    fn test_v2_hash_mode_pin_material() {
        let mut hs = machine();
        let init = encode_record(&ClientInit::new(2, vec![2], EncryptionMode::HashPin)).unwrap();
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&init);

        let reply = match hs.process(&frame).unwrap() {
            ServerStep::Reply(r) => r,
            other => panic!("expected reply, got {other:?}"),
        };
        assert_eq!(reply.len(), 6326 + 32);
    }

    #[test]
    fn test_non_handshake_tag_rejected() {
        let mut hs = machine();
        assert!(hs.process(&[0x03, 0x00]).is_err());
        assert!(hs.process(&[]).is_err());
    }

    #[test]
    fn test_garbage_init_rejected() {
        let mut hs = machine();
        assert!(hs.process(&[0x02, 0xC1, 0xC1]).is_err());
    }

    #[test]
    fn test_frame_after_done_rejected() {
        let mut hs = machine();
        let init = encode_record(&ClientInit::new(9, vec![9], EncryptionMode::HashPin)).unwrap();
        let mut frame = vec![ChannelTag::Handshake.as_byte()];
        frame.extend_from_slice(&init);
        let _ = hs.process(&frame).unwrap();

        assert!(matches!(
            hs.process(&frame),
            Err(CoreError::UnexpectedFrame { .. })
        ));
    }
}
