// src/auth/ntlm.rs

//! NTLM message source for the HTTP handshake.
//!
//! The handshake driver only moves opaque tokens between the server and a
//! [`ChallengeResponder`]. [`SspiResponder`] produces real NTLMv2 messages with
//! the `sspi` crate; tests substitute scripted responders.

use std::fmt;

use sspi::{
    AuthIdentity, BufferType, ClientRequestFlags, CredentialUse, DataRepresentation, Ntlm,
    SecurityBuffer, Sspi, SspiImpl, Username,
};

use super::Credentials;
use crate::error::{self, BoxError, Result};

/// Client side of an NTLM exchange, one instance per negotiation.
pub trait ChallengeResponder: Send {
    /// First leg: the NEGOTIATE_MESSAGE sent after the server's bare challenge.
    fn negotiate_message(&mut self) -> std::result::Result<Vec<u8>, BoxError>;

    /// Third leg: the AUTHENTICATE_MESSAGE answering the server's
    /// CHALLENGE_MESSAGE.
    fn authenticate_message(&mut self, challenge: &[u8]) -> std::result::Result<Vec<u8>, BoxError>;
}

/// NTLMv2 through the `sspi` NTLM security package.
pub struct SspiResponder {
    ntlm: Ntlm,
    credentials_handle: <Ntlm as SspiImpl>::CredentialsHandle,
    target_name: String,
}

impl SspiResponder {
    /// Acquires an outbound credentials handle for `credentials`.
    ///
    /// `target_name` is the service principal, `HTTP/<host>` for web servers.
    pub fn new(credentials: &Credentials, target_name: impl Into<String>) -> Result<Self> {
        let username = Username::parse(credentials.principal())
            .map_err(|_| error::negotiate("principal is not a valid account name"))?;
        let identity = AuthIdentity {
            username,
            password: credentials.secret().to_owned().into(),
        };

        let mut ntlm = Ntlm::new();
        let acquired = ntlm
            .acquire_credentials_handle()
            .with_credential_use(CredentialUse::Outbound)
            .with_auth_data(&identity)
            .execute(&mut ntlm)
            .map_err(error::negotiate)?;

        Ok(Self {
            ntlm,
            credentials_handle: acquired.credentials_handle,
            target_name: target_name.into(),
        })
    }

    fn step(&mut self, input: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        let mut input_buffer = vec![SecurityBuffer::new(input.to_vec(), BufferType::Token)];
        let mut output_buffer = vec![SecurityBuffer::new(Vec::new(), BufferType::Token)];

        let status = {
            let mut builder = self
                .ntlm
                .initialize_security_context()
                .with_credentials_handle(&mut self.credentials_handle)
                .with_context_requirements(
                    ClientRequestFlags::ALLOCATE_MEMORY | ClientRequestFlags::CONFIDENTIALITY,
                )
                .with_target_data_representation(DataRepresentation::Native)
                .with_target_name(&self.target_name)
                .with_input(&mut input_buffer)
                .with_output(&mut output_buffer);

            self.ntlm
                .initialize_security_context_impl(&mut builder)
                .and_then(|mut generator| generator.resolve_to_result())
                .map_err(BoxError::from)?
                .status
        };
        log::debug!("NTLM context step finished: {:?}", status);

        let token = output_buffer
            .pop()
            .map(|buffer| buffer.buffer)
            .unwrap_or_default();
        if token.is_empty() {
            return Err("NTLM package produced an empty token".into());
        }
        Ok(token)
    }
}

impl fmt::Debug for SspiResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SspiResponder")
            .field("target_name", &self.target_name)
            .finish()
    }
}

impl ChallengeResponder for SspiResponder {
    fn negotiate_message(&mut self) -> std::result::Result<Vec<u8>, BoxError> {
        self.step(&[])
    }

    fn authenticate_message(&mut self, challenge: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        if challenge.is_empty() {
            return Err("server sent an empty NTLM challenge".into());
        }
        self.step(challenge)
    }
}
