//! `TimeStampReq` construction.
//!
//! ```text
//! TimeStampReq ::= SEQUENCE {
//!    version         INTEGER { v1(1) },
//!    messageImprint  MessageImprint,
//!    reqPolicy       TSAPolicyId OPTIONAL,
//!    nonce           INTEGER OPTIONAL,
//!    certReq         BOOLEAN DEFAULT FALSE,
//!    extensions      [0] IMPLICIT Extensions OPTIONAL }
//! ```

use der::asn1::{AnyRef, Null, ObjectIdentifier, OctetStringRef};
use der::{Encode, Tag};
use rand::RngCore;
use rand::rngs::OsRng;
use tessera_crypto::{ContentHash, oid};

use crate::error::{TimestampError, TimestampResult};

/// A timestamp request for one SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRequest {
    digest: ContentHash,
    nonce: u64,
    policy: Option<ObjectIdentifier>,
    cert_req: bool,
}

impl TimestampRequest {
    /// Request a token over `digest` with a fresh random nonce.
    #[must_use]
    pub fn new(digest: ContentHash) -> Self {
        Self {
            digest,
            nonce: OsRng.next_u64(),
            policy: None,
            cert_req: true,
        }
    }

    /// Ask for a specific TSA policy, given in dotted form.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Malformed`] if the OID is not valid.
    pub fn with_policy(mut self, dotted: &str) -> TimestampResult<Self> {
        let policy = dotted
            .parse::<ObjectIdentifier>()
            .map_err(|e| TimestampError::Malformed(format!("policy OID {dotted}: {e}")))?;
        self.policy = Some(policy);
        Ok(self)
    }

    /// Override the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// The digest being timestamped.
    #[must_use]
    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    /// The request nonce.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The requested policy.
    #[must_use]
    pub fn policy(&self) -> Option<ObjectIdentifier> {
        self.policy
    }

    /// Encode as DER.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Der`] if encoding fails.
    pub fn to_der(&self) -> TimestampResult<Vec<u8>> {
        let algorithm = sequence(&[oid::SHA256.to_der()?, Null.to_der()?])?;
        let imprint = sequence(&[
            algorithm,
            OctetStringRef::new(self.digest.as_bytes())?.to_der()?,
        ])?;
        let mut fields = vec![1u8.to_der()?, imprint];
        if let Some(policy) = self.policy {
            fields.push(policy.to_der()?);
        }
        fields.push(self.nonce.to_der()?);
        if self.cert_req {
            fields.push(true.to_der()?);
        }
        Ok(sequence(&fields)?)
    }
}

fn sequence(fields: &[Vec<u8>]) -> der::Result<Vec<u8>> {
    AnyRef::new(Tag::Sequence, &fields.concat())?.to_der()
}
