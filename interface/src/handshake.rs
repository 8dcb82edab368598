use std::net::SocketAddr;

use ring::{constant_time, hmac, rand};

use ghostnet_shared::{GameInstant, NetConnection};

use crate::error::InterfaceError;

/// Issues and checks the digests a server hands out in challenge
/// responses. A connect request must echo the digest issued to its source
/// address, so a spoofed source cannot complete the handshake.
///
/// The digest is an HMAC-SHA256 over the address and connect sequence,
/// truncated to 64 bits.
pub(crate) struct ChallengeDigest {
    key: hmac::Key,
}

impl ChallengeDigest {
    pub fn new() -> Result<Self, InterfaceError> {
        let rng = rand::SystemRandom::new();
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &rng)
            .map_err(|_| InterfaceError::KeyGenerationFailed)?;
        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    pub fn compute(&self, address: &SocketAddr, connect_sequence: u32) -> u64 {
        let mut context = hmac::Context::with_key(&self.key);
        match address {
            SocketAddr::V4(address) => context.update(&address.ip().octets()),
            SocketAddr::V6(address) => context.update(&address.ip().octets()),
        }
        context.update(&address.port().to_le_bytes());
        context.update(&connect_sequence.to_le_bytes());
        let tag = context.sign();

        let mut truncated = [0u8; 8];
        truncated.copy_from_slice(&tag.as_ref()[..8]);
        u64::from_le_bytes(truncated)
    }

    pub fn verify(&self, address: &SocketAddr, connect_sequence: u32, digest: u64) -> bool {
        let expected = self.compute(address, connect_sequence).to_le_bytes();
        constant_time::verify_slices_are_equal(&expected, &digest.to_le_bytes()).is_ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HandshakeState {
    AwaitingChallengeResponse,
    AwaitingConnectAccept { digest: u64 },
}

/// A connection this side initiated that the server has not accepted yet
pub(crate) struct PendingConnection {
    pub address: SocketAddr,
    pub connect_sequence: u32,
    pub state: HandshakeState,
    pub retries_left: u32,
    pub next_send_time: GameInstant,
    pub connection: NetConnection,
}
