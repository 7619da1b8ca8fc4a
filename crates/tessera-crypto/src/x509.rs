//! X.509 certificate parsing and self-signed issuance.
//!
//! Certificates are read with `x509-parser` and issued with `rcgen`. Only
//! what signature and timestamp checks need is kept: serial, issuer and
//! subject names, validity, `SubjectPublicKeyInfo`, subject key identifier
//! and extended key usage. Chain building and revocation are out of scope.

use chrono::{DateTime, Duration, Utc};
use der::asn1::{AnyRef, BitStringRef, ObjectIdentifier};
use der::pem::LineEnding;
use der::{Decode, Reader};
use rand::RngCore;
use rand::rngs::OsRng;
use rcgen::{BasicConstraints, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa};
use x509_parser::prelude::{FromDer, ParsedExtension, X509Certificate};

use crate::error::{CryptoError, CryptoResult};
use crate::keypair::{DigestAlgorithm, KeyPair, PublicKey, RsaScheme};
use crate::oid;

const PEM_LABEL: &str = "CERTIFICATE";

/// A parsed X.509 certificate that keeps its original encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    raw: Vec<u8>,
    tbs: Vec<u8>,
    serial: Vec<u8>,
    issuer: Vec<u8>,
    subject: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    spki: Vec<u8>,
    signature_algorithm: ObjectIdentifier,
    signature: Vec<u8>,
    subject_key_id: Option<Vec<u8>>,
    extended_key_usage: Option<Vec<ObjectIdentifier>>,
    common_name: Option<String>,
}

/// Options for [`Certificate::self_signed`].
#[derive(Debug, Clone)]
pub struct CertificateParams {
    /// Subject and issuer common name.
    pub common_name: String,
    /// Optional organization name.
    pub organization: Option<String>,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// Extended key usage purposes; empty means no extension.
    pub extended_key_usage: Vec<ObjectIdentifier>,
}

impl CertificateParams {
    /// Valid from now for `valid_for`.
    #[must_use]
    pub fn new(common_name: impl Into<String>, valid_for: Duration) -> Self {
        let now = Utc::now();
        Self {
            common_name: common_name.into(),
            organization: None,
            not_before: now,
            not_after: now.checked_add_signed(valid_for).unwrap_or(now),
            extended_key_usage: Vec::new(),
        }
    }
}

fn invalid(reason: impl Into<String>) -> CryptoError {
    CryptoError::InvalidCertificate(reason.into())
}

impl Certificate {
    /// Parse a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Der`] or [`CryptoError::InvalidCertificate`] for
    /// any structural problem, including trailing bytes.
    pub fn from_der(raw: &[u8]) -> CryptoResult<Self> {
        let (rest, cert) = X509Certificate::from_der(raw).map_err(|e| invalid(e.to_string()))?;
        if !rest.is_empty() {
            return Err(invalid(format!("{} trailing bytes", rest.len())));
        }
        let (tbs, signature_algorithm, signature) = signed_parts(raw)?;

        let mut subject_key_id = None;
        let mut extended_key_usage = None;
        for extension in cert.extensions() {
            match extension.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    subject_key_id = Some(id.0.to_vec());
                },
                ParsedExtension::ExtendedKeyUsage(_) => {
                    extended_key_usage = Some(Vec::<ObjectIdentifier>::from_der(extension.value)?);
                },
                _ => {},
            }
        }

        let validity = cert.validity();
        Ok(Self {
            raw: raw.to_vec(),
            tbs: tbs.to_vec(),
            serial: magnitude(cert.raw_serial()).to_vec(),
            issuer: cert.issuer().as_raw().to_vec(),
            subject: cert.subject().as_raw().to_vec(),
            common_name: cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_owned),
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
            spki: cert.public_key().raw.to_vec(),
            signature_algorithm,
            signature: signature.to_vec(),
            subject_key_id,
            extended_key_usage,
        })
    }

    /// Parse a PEM `CERTIFICATE` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a well-formed certificate.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let (label, der) =
            der::pem::decode_vec(pem.trim().as_bytes()).map_err(der::Error::from)?;
        if label != PEM_LABEL {
            return Err(invalid(format!("expected a {PEM_LABEL} block, found {label}")));
        }
        Self::from_der(&der)
    }

    /// Encode as PEM.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Der`] if encoding fails.
    pub fn to_pem(&self) -> CryptoResult<String> {
        der::pem::encode_string(PEM_LABEL, LineEnding::LF, &self.raw)
            .map_err(|e| CryptoError::Der(e.into()))
    }

    /// Issue a self-signed certificate for `keypair`.
    ///
    /// The certificate is a v3 CA certificate signed with
    /// sha256WithRSAEncryption, carrying a subject key identifier and,
    /// when requested, an extended key usage extension.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidCertificate`] if issuance fails.
    pub fn self_signed(keypair: &KeyPair, params: &CertificateParams) -> CryptoResult<Self> {
        let pem = keypair.to_pem(None)?;
        let signer = rcgen::KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| invalid(format!("signing key: {e}")))?;

        let mut serial = [0u8; 16];
        OsRng.fill_bytes(&mut serial);
        serial[0] &= 0x7f;
        serial[0] |= 0x01;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, params.common_name.as_str());
        if let Some(org) = &params.organization {
            name.push(DnType::OrganizationName, org.as_str());
        }

        let mut request = rcgen::CertificateParams::default();
        request.distinguished_name = name;
        request.serial_number = Some(rcgen::SerialNumber::from(serial.to_vec()));
        request.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        request.not_before = offset_time(params.not_before)?;
        request.not_after = offset_time(params.not_after)?;
        request.extended_key_usages = params
            .extended_key_usage
            .iter()
            .map(|usage| key_purpose(*usage))
            .collect();

        let issued = request
            .self_signed(&signer)
            .map_err(|e| invalid(format!("issuance: {e}")))?;
        Self::from_der(issued.der())
    }

    /// Full DER encoding.
    #[must_use]
    pub fn to_der(&self) -> &[u8] {
        &self.raw
    }

    /// DER encoding of the `TBSCertificate`.
    #[must_use]
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    /// Serial number magnitude bytes.
    #[must_use]
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// DER encoding of the issuer `Name`.
    #[must_use]
    pub fn issuer(&self) -> &[u8] {
        &self.issuer
    }

    /// DER encoding of the subject `Name`.
    #[must_use]
    pub fn subject(&self) -> &[u8] {
        &self.subject
    }

    /// Subject common name, if present.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Start of validity.
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of validity.
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `at` lies inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Subject key identifier extension value.
    #[must_use]
    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    /// Extended key usage purposes, or `None` if the extension is absent.
    #[must_use]
    pub fn extended_key_usage(&self) -> Option<&[ObjectIdentifier]> {
        self.extended_key_usage.as_deref()
    }

    /// DER `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn spki(&self) -> &[u8] {
        &self.spki
    }

    /// Decode the subject public key.
    ///
    /// # Errors
    ///
    /// Returns an error for non-RSA or undersized keys.
    pub fn public_key(&self) -> CryptoResult<PublicKey> {
        PublicKey::from_der(&self.spki)
    }

    /// Check the certificate's own signature against `issuer_key`.
    ///
    /// Only the RSA PKCS#1 v1.5 SHA-2 family is recognised.
    #[must_use]
    pub fn is_signed_by(&self, issuer_key: &PublicKey) -> bool {
        let algorithm = match self.signature_algorithm {
            a if a == oid::SHA256_WITH_RSA => DigestAlgorithm::Sha256,
            a if a == oid::SHA384_WITH_RSA => DigestAlgorithm::Sha384,
            a if a == oid::SHA512_WITH_RSA => DigestAlgorithm::Sha512,
            _ => return false,
        };
        issuer_key.verify_prehashed(
            RsaScheme::Pkcs1v15(algorithm),
            &algorithm.digest(&self.tbs),
            &self.signature,
        )
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.common_name)
            .field("serial", &hex::encode(&self.serial))
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// The signed `TBSCertificate` bytes, the outer signature algorithm and the
/// signature value.
fn signed_parts(raw: &[u8]) -> der::Result<(&[u8], ObjectIdentifier, &[u8])> {
    AnyRef::from_der(raw)?.sequence(|cert| {
        let tbs = cert.tlv_bytes()?;
        let algorithm = cert.decode::<AnyRef<'_>>()?.sequence(|alg| {
            let algorithm = alg.decode::<ObjectIdentifier>()?;
            if !alg.is_finished() {
                alg.decode::<AnyRef<'_>>()?;
            }
            Ok(algorithm)
        })?;
        let signature = cert.decode::<BitStringRef<'_>>()?;
        Ok((tbs, algorithm, signature.raw_bytes()))
    })
}

/// Strip the sign octet from a positive INTEGER encoding.
fn magnitude(bytes: &[u8]) -> &[u8] {
    match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => bytes,
    }
}

fn timestamp(secs: i64) -> CryptoResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid("validity out of range"))
}

fn offset_time(at: DateTime<Utc>) -> CryptoResult<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| invalid(format!("validity {at}: {e}")))
}

fn key_purpose(usage: ObjectIdentifier) -> ExtendedKeyUsagePurpose {
    if usage == oid::KP_TIME_STAMPING {
        ExtendedKeyUsagePurpose::TimeStamping
    } else {
        ExtendedKeyUsagePurpose::Other(usage.arcs().map(u64::from).collect())
    }
}
