#![allow(dead_code)]

pub mod server;

use std::sync::{Arc, Mutex};

use scom_auth::{BoxError, ChallengeResponder, Credentials, NegotiatorBuilder};

/// Token the scripted responder sends on the first leg.
pub const NEGOTIATE_TOKEN: &[u8] = b"NTLMSSP\0\x01\0\0\0scripted";

/// Prefix of the token the scripted responder sends on the third leg; the
/// server's challenge follows it.
pub const AUTHENTICATE_PREFIX: &[u8] = b"NTLMSSP\0\x03\0\0\0";

/// A responder that echoes the server's challenge back, so the mock server
/// can check the legs arrived in order.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    pub seen_challenges: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChallengeResponder for ScriptedResponder {
    fn negotiate_message(&mut self) -> Result<Vec<u8>, BoxError> {
        Ok(NEGOTIATE_TOKEN.to_vec())
    }

    fn authenticate_message(&mut self, challenge: &[u8]) -> Result<Vec<u8>, BoxError> {
        self.seen_challenges.lock().unwrap().push(challenge.to_vec());
        let mut message = AUTHENTICATE_PREFIX.to_vec();
        message.extend_from_slice(challenge);
        Ok(message)
    }
}

pub fn scripted(builder: NegotiatorBuilder) -> NegotiatorBuilder {
    builder.ntlm_responder(|_credentials: &Credentials, _spn: &str| {
        Ok(Box::new(ScriptedResponder::default()) as Box<dyn ChallengeResponder>)
    })
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
