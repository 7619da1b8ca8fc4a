//! `TimeStampResp` and CMS token parsing.
//!
//! The parser is strict: every structure must be complete, correctly
//! tagged and followed by no trailing bytes. Anything unexpected is an
//! error, never a default.

use std::fmt;

use chrono::{DateTime, Utc};
use der::asn1::{AnyRef, ObjectIdentifier, OctetStringRef};
use der::{Decode, Reader, SliceReader, Tag, TagNumber, Tagged};
use tessera_crypto::{Certificate, oid};

use crate::asn1::{
    algorithm_identifier, context, context_primitive, contents, generalized_time, integer,
    next_is, parse_single, skip_optional,
};
use crate::error::{TimestampError, TimestampResult};

/// RFC 3161 `PKIStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiStatus {
    /// 0
    Granted,
    /// 1
    GrantedWithMods,
    /// 2
    Rejection,
    /// 3
    Waiting,
    /// 4
    RevocationWarning,
    /// 5
    RevocationNotification,
    /// Out-of-range value.
    Unknown(u64),
}

impl PkiStatus {
    fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Granted,
            1 => Self::GrantedWithMods,
            2 => Self::Rejection,
            3 => Self::Waiting,
            4 => Self::RevocationWarning,
            5 => Self::RevocationNotification,
            other => Self::Unknown(other),
        }
    }

    /// Whether a token was issued.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted | Self::GrantedWithMods)
    }
}

impl fmt::Display for PkiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::GrantedWithMods => write!(f, "grantedWithMods"),
            Self::Rejection => write!(f, "rejection"),
            Self::Waiting => write!(f, "waiting"),
            Self::RevocationWarning => write!(f, "revocationWarning"),
            Self::RevocationNotification => write!(f, "revocationNotification"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// A parsed `TimeStampResp`.
#[derive(Debug, Clone)]
pub struct TimestampResponse {
    raw: Vec<u8>,
    status: PkiStatus,
    status_text: Option<String>,
    token: Option<TimestampToken>,
}

impl TimestampResponse {
    /// Parse a DER `TimeStampResp`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Der`] or [`TimestampError::Malformed`] for
    /// any structural anomaly, including a granted status with no token.
    pub fn from_der(raw: &[u8]) -> TimestampResult<Self> {
        let mut fields = parse_single(raw, Tag::Sequence)?;

        let mut status_info = contents(fields.decode()?, Tag::Sequence)?;
        let status = PkiStatus::from_code(status_info.decode::<u64>()?);
        let mut status_text = None;
        if next_is(&status_info, Tag::Sequence) {
            let mut texts = contents(status_info.decode()?, Tag::Sequence)?;
            let mut parts = Vec::new();
            while !texts.is_finished() {
                parts.push(texts.decode::<String>()?);
            }
            status_text = Some(parts.join("; "));
        }
        skip_optional(&mut status_info, Tag::BitString)?;
        status_info.finish(())?;

        let token = if next_is(&fields, Tag::Sequence) {
            Some(TimestampToken::from_content_info(fields.decode()?)?)
        } else {
            None
        };
        fields.finish(())?;

        if status.is_granted() && token.is_none() {
            return Err(TimestampError::Malformed(
                "status granted but no token present".into(),
            ));
        }

        Ok(Self {
            raw: raw.to_vec(),
            status,
            status_text,
            token,
        })
    }

    /// The exact bytes this response was parsed from.
    #[must_use]
    pub fn to_der(&self) -> &[u8] {
        &self.raw
    }

    /// Reported status.
    #[must_use]
    pub fn status(&self) -> PkiStatus {
        self.status
    }

    /// Free text attached to the status.
    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// The token, if one was issued.
    #[must_use]
    pub fn token(&self) -> Option<&TimestampToken> {
        self.token.as_ref()
    }

    /// The token of a granted response.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Rejected`] when the TSA did not grant.
    pub fn granted_token(&self) -> TimestampResult<&TimestampToken> {
        match (&self.token, self.status.is_granted()) {
            (Some(token), true) => Ok(token),
            _ => Err(TimestampError::Rejected {
                status: self.status.to_string(),
                text: self.status_text.clone().unwrap_or_default(),
            }),
        }
    }
}

/// The CMS `SignedData` carrying a `TSTInfo`.
#[derive(Debug, Clone)]
pub struct TimestampToken {
    tst_info_der: Vec<u8>,
    tst_info: TstInfo,
    signer: SignerInfo,
    certificates: Vec<Certificate>,
}

impl TimestampToken {
    fn from_content_info(content_info: AnyRef<'_>) -> TimestampResult<Self> {
        let mut ci = contents(content_info, Tag::Sequence)?;
        let content_type = ci.decode::<ObjectIdentifier>()?;
        if content_type != oid::ID_SIGNED_DATA {
            return Err(TimestampError::Malformed(format!(
                "content type {content_type} is not signedData"
            )));
        }
        let mut explicit = contents(ci.decode()?, context(TagNumber::N0))?;
        let signed_data = explicit.decode::<AnyRef<'_>>()?;
        explicit.finish(())?;
        ci.finish(())?;

        let mut sd = contents(signed_data, Tag::Sequence)?;
        sd.decode::<u64>()?;
        contents(sd.decode()?, Tag::Set)?;

        let mut encap = contents(sd.decode()?, Tag::Sequence)?;
        let econtent_type = encap.decode::<ObjectIdentifier>()?;
        if econtent_type != oid::ID_CT_TST_INFO {
            return Err(TimestampError::Malformed(format!(
                "encapsulated content type {econtent_type} is not id-ct-TSTInfo"
            )));
        }
        let mut econtent = contents(encap.decode()?, context(TagNumber::N0))?;
        let octets = econtent.decode::<OctetStringRef<'_>>()?;
        econtent.finish(())?;
        encap.finish(())?;
        let tst_info_der = octets.as_bytes();
        let tst_info = TstInfo::from_der(tst_info_der)?;

        let mut certificates = Vec::new();
        if next_is(&sd, context(TagNumber::N0)) {
            let mut list = contents(sd.decode()?, context(TagNumber::N0))?;
            while !list.is_finished() {
                certificates.push(Certificate::from_der(list.tlv_bytes()?)?);
            }
        }
        skip_optional(&mut sd, context(TagNumber::N1))?;

        let mut signer_infos = contents(sd.decode()?, Tag::Set)?;
        let signer = SignerInfo::parse(signer_infos.decode()?)?;
        if !signer_infos.is_finished() {
            return Err(TimestampError::Malformed(
                "more than one SignerInfo".into(),
            ));
        }
        sd.finish(())?;

        Ok(Self {
            tst_info_der: tst_info_der.to_vec(),
            tst_info,
            signer,
            certificates,
        })
    }

    /// Exact DER bytes of the encapsulated `TSTInfo`.
    #[must_use]
    pub fn tst_info_der(&self) -> &[u8] {
        &self.tst_info_der
    }

    /// The decoded `TSTInfo`.
    #[must_use]
    pub fn tst_info(&self) -> &TstInfo {
        &self.tst_info
    }

    /// The single `SignerInfo`.
    #[must_use]
    pub fn signer(&self) -> &SignerInfo {
        &self.signer
    }

    /// Certificates bundled in the token.
    #[must_use]
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Find the bundled certificate named by the signer identifier.
    #[must_use]
    pub fn signer_certificate(&self) -> Option<&Certificate> {
        self.certificates
            .iter()
            .find(|cert| self.signer.sid.matches(cert))
    }
}

/// Decoded `TSTInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    /// Structure version.
    pub version: u64,
    /// TSA policy.
    pub policy: ObjectIdentifier,
    /// Imprint hash algorithm.
    pub imprint_algorithm: ObjectIdentifier,
    /// Imprinted digest.
    pub hashed_message: Vec<u8>,
    /// Serial number magnitude.
    pub serial: Vec<u8>,
    /// Time the token was generated.
    pub gen_time: DateTime<Utc>,
    /// Nonce magnitude, if the TSA echoed one.
    pub nonce: Option<Vec<u8>>,
}

impl TstInfo {
    fn from_der(bytes: &[u8]) -> TimestampResult<Self> {
        let mut fields = parse_single(bytes, Tag::Sequence)?;
        let version = fields.decode::<u64>()?;
        let policy = fields.decode::<ObjectIdentifier>()?;

        let mut imprint = contents(fields.decode()?, Tag::Sequence)?;
        let (imprint_algorithm, _) = algorithm_identifier(imprint.decode()?)?;
        let hashed_message = imprint.decode::<OctetStringRef<'_>>()?.as_bytes().to_vec();
        imprint.finish(())?;

        let serial = integer(fields.decode()?)?;
        let gen_time = generalized_time(fields.decode()?)?;
        skip_optional(&mut fields, Tag::Sequence)?;
        skip_optional(&mut fields, Tag::Boolean)?;
        let nonce = if next_is(&fields, Tag::Integer) {
            Some(integer(fields.decode()?)?)
        } else {
            None
        };
        skip_optional(&mut fields, context(TagNumber::N0))?;
        skip_optional(&mut fields, context(TagNumber::N1))?;
        fields.finish(())?;

        Ok(Self {
            version,
            policy,
            imprint_algorithm,
            hashed_message,
            serial,
            gen_time,
            nonce,
        })
    }

    /// Dotted policy OID.
    #[must_use]
    pub fn policy_string(&self) -> String {
        self.policy.to_string()
    }

    /// Hex serial number.
    #[must_use]
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    /// Whether the echoed nonce equals `nonce`.
    #[must_use]
    pub fn nonce_matches(&self, nonce: u64) -> bool {
        let expected = nonce.to_be_bytes();
        let first = expected
            .iter()
            .position(|byte| *byte != 0)
            .unwrap_or(expected.len().saturating_sub(1));
        self.nonce.as_deref() == expected.get(first..)
    }
}

/// How a `SignerInfo` names its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier {
    /// Issuer `Name` DER and serial magnitude.
    IssuerAndSerial {
        /// Issuer name, full DER.
        issuer: Vec<u8>,
        /// Serial number magnitude.
        serial: Vec<u8>,
    },
    /// Subject key identifier.
    SubjectKeyId(Vec<u8>),
}

impl SignerIdentifier {
    /// Whether `cert` is the one identified.
    #[must_use]
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            Self::IssuerAndSerial { issuer, serial } => {
                cert.issuer() == issuer.as_slice() && cert.serial() == serial.as_slice()
            },
            Self::SubjectKeyId(ski) => cert.subject_key_id() == Some(ski.as_slice()),
        }
    }
}

/// Decoded CMS `SignerInfo`.
#[derive(Debug, Clone)]
pub struct SignerInfo {
    /// Certificate identifier.
    pub sid: SignerIdentifier,
    /// Digest algorithm.
    pub digest_algorithm: ObjectIdentifier,
    /// Full DER of the `[0] IMPLICIT` signed attributes.
    pub signed_attrs: Vec<u8>,
    /// Value of the content-type attribute.
    pub content_type: Option<ObjectIdentifier>,
    /// Value of the message-digest attribute.
    pub message_digest: Option<Vec<u8>>,
    /// Signature algorithm.
    pub signature_algorithm: ObjectIdentifier,
    /// Raw DER of the signature algorithm parameters, if any.
    pub signature_params: Option<Vec<u8>>,
    /// Signature value.
    pub signature: Vec<u8>,
}

impl SignerInfo {
    fn parse(value: AnyRef<'_>) -> TimestampResult<Self> {
        let mut fields = contents(value, Tag::Sequence)?;
        fields.decode::<u64>()?;

        let sid = match fields.peek_tag()? {
            Tag::Sequence => {
                let mut ias = contents(fields.decode()?, Tag::Sequence)?;
                let issuer = ias.tlv_bytes()?;
                AnyRef::from_der(issuer)?.tag().assert_eq(Tag::Sequence)?;
                let serial = integer(ias.decode()?)?;
                ias.finish(())?;
                SignerIdentifier::IssuerAndSerial {
                    issuer: issuer.to_vec(),
                    serial,
                }
            },
            tag if tag == context_primitive(TagNumber::N0) => {
                SignerIdentifier::SubjectKeyId(fields.decode::<AnyRef<'_>>()?.value().to_vec())
            },
            other => {
                return Err(TimestampError::Malformed(format!(
                    "unsupported signer identifier tag {other}"
                )));
            },
        };

        let (digest_algorithm, _) = algorithm_identifier(fields.decode()?)?;

        if !next_is(&fields, context(TagNumber::N0)) {
            return Err(TimestampError::Malformed(
                "SignerInfo has no signed attributes".into(),
            ));
        }
        let signed_attrs = fields.tlv_bytes()?;
        let (content_type, message_digest) =
            parse_signed_attrs(AnyRef::from_der(signed_attrs)?.value())?;

        let (signature_algorithm, signature_params) = algorithm_identifier(fields.decode()?)?;
        let signature = fields.decode::<OctetStringRef<'_>>()?.as_bytes().to_vec();
        skip_optional(&mut fields, context(TagNumber::N1))?;
        fields.finish(())?;

        Ok(Self {
            sid,
            digest_algorithm,
            signed_attrs: signed_attrs.to_vec(),
            content_type,
            message_digest,
            signature_algorithm,
            signature_params,
            signature,
        })
    }

    /// Signed attributes re-tagged as `SET OF`, which is what was signed.
    #[must_use]
    pub fn signed_attrs_for_signature(&self) -> Vec<u8> {
        let mut bytes = self.signed_attrs.clone();
        if let Some(first) = bytes.first_mut() {
            *first = u8::from(Tag::Set);
        }
        bytes
    }
}

type Attrs = (Option<ObjectIdentifier>, Option<Vec<u8>>);

fn parse_signed_attrs(content: &[u8]) -> TimestampResult<Attrs> {
    let mut reader = SliceReader::new(content)?;
    let mut content_type = None;
    let mut message_digest = None;
    while !reader.is_finished() {
        let mut attr = contents(reader.decode()?, Tag::Sequence)?;
        let attr_type = attr.decode::<ObjectIdentifier>()?;
        let mut values = contents(attr.decode()?, Tag::Set)?;
        attr.finish(())?;

        if attr_type == oid::ID_CONTENT_TYPE {
            let value = values.decode::<ObjectIdentifier>()?;
            single_value(values)?;
            set_once(&mut content_type, value, attr_type)?;
        } else if attr_type == oid::ID_MESSAGE_DIGEST {
            let value = values.decode::<OctetStringRef<'_>>()?.as_bytes().to_vec();
            single_value(values)?;
            set_once(&mut message_digest, value, attr_type)?;
        }
    }
    Ok((content_type, message_digest))
}

fn single_value(values: SliceReader<'_>) -> TimestampResult<()> {
    values
        .finish(())
        .map_err(|_| TimestampError::Malformed("signed attribute with multiple values".into()))
}

fn set_once<T>(slot: &mut Option<T>, value: T, attr_type: ObjectIdentifier) -> TimestampResult<()> {
    if slot.replace(value).is_some() {
        return Err(TimestampError::Malformed(format!(
            "duplicate signed attribute {attr_type}"
        )));
    }
    Ok(())
}
