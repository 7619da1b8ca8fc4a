//! An in-process RFC 3161 timestamp authority.
//!
//! [`TestTsa`] signs real CMS tokens assembled with the `der` encoders, and
//! can deliberately produce the malformed variants that verification must
//! reject.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use der::asn1::{
    AnyRef, Null, ObjectIdentifier, OctetStringRef, UintRef, UtcTime, Utf8StringRef,
};
use der::{Decode, Encode, Reader, Tag, TagNumber, Tagged};
use sha2::{Digest, Sha256};
use tessera_crypto::{Certificate, CertificateParams, ContentHash, DigestAlgorithm, KeyPair, oid};

use crate::keys;

/// Policy OID stamped into every token.
pub const TEST_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1.1");

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_MGF1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.8");

/// Which token to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVariant {
    /// Well-formed, PKCS#1 v1.5 signature, certificate bundled.
    Valid,
    /// Well-formed, RSASSA-PSS signature.
    Pss,
    /// Signer identified by subject key identifier.
    SubjectKeyId,
    /// No certificates bundled.
    WithoutCertificates,
    /// Validly signed attributes whose message digest covers a different
    /// `TSTInfo` than the one encapsulated.
    Grafted,
    /// Content-type attribute names id-data instead of id-ct-TSTInfo.
    WrongContentType,
    /// Signature bytes corrupted.
    BadSignature,
    /// Status `rejection`, no token.
    Rejected,
}

/// A timestamp authority with a self-signed certificate.
#[derive(Debug)]
pub struct TestTsa {
    key: KeyPair,
    certificate: Certificate,
    serial: AtomicU64,
}

impl TestTsa {
    /// Common name on the TSA certificate.
    pub const COMMON_NAME: &'static str = "Tessera Test TSA";

    /// A TSA whose certificate is valid now.
    #[must_use]
    pub fn new() -> Self {
        Self::with_key(keys::tsa())
    }

    /// A TSA using `key`.
    ///
    /// # Panics
    ///
    /// Panics if certificate generation fails.
    #[must_use]
    pub fn with_key(key: KeyPair) -> Self {
        let now = Utc::now();
        Self::with_validity(key, now - Duration::hours(1), now + Duration::days(1))
    }

    /// A TSA whose certificate expired yesterday.
    #[must_use]
    pub fn expired() -> Self {
        let now = Utc::now();
        Self::with_validity(keys::tsa(), now - Duration::days(10), now - Duration::days(1))
    }

    fn with_validity(key: KeyPair, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        let params = CertificateParams {
            common_name: Self::COMMON_NAME.to_string(),
            organization: Some("Tessera".to_string()),
            not_before,
            not_after,
            extended_key_usage: vec![oid::KP_TIME_STAMPING],
        };
        let certificate =
            Certificate::self_signed(&key, &params).expect("TSA certificate generation failed");
        Self {
            key,
            certificate,
            serial: AtomicU64::new(1),
        }
    }

    /// The TSA certificate.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Answer a DER `TimeStampReq`, echoing its imprint and nonce.
    #[must_use]
    pub fn respond_to_request(&self, request: &[u8], variant: TokenVariant) -> Vec<u8> {
        let imprint = Self::imprint_of(request).unwrap_or_default();
        self.respond(&imprint, Self::nonce_of(request), variant)
    }

    /// Hashed message of a DER `TimeStampReq`.
    #[must_use]
    pub fn imprint_of(request: &[u8]) -> Option<Vec<u8>> {
        AnyRef::from_der(request)
            .ok()?
            .sequence(|req| {
                req.decode::<u8>()?;
                let hashed = req.sequence(|imprint| {
                    imprint.decode::<AnyRef<'_>>()?;
                    Ok(imprint.decode::<OctetStringRef<'_>>()?.as_bytes().to_vec())
                })?;
                while !req.is_finished() {
                    req.decode::<AnyRef<'_>>()?;
                }
                Ok(hashed)
            })
            .ok()
    }

    /// Nonce of a DER `TimeStampReq`.
    #[must_use]
    pub fn nonce_of(request: &[u8]) -> Option<u64> {
        AnyRef::from_der(request)
            .ok()?
            .sequence(|req| {
                req.decode::<u8>()?;
                req.decode::<AnyRef<'_>>()?;
                let mut nonce = None;
                while !req.is_finished() {
                    let field = req.decode::<AnyRef<'_>>()?;
                    if field.tag() == Tag::Integer && nonce.is_none() {
                        nonce = Some(field.decode_as::<u64>()?);
                    }
                }
                Ok(nonce)
            })
            .ok()?
    }

    /// Build a DER `TimeStampResp` over `imprint`.
    ///
    /// # Panics
    ///
    /// Panics if signing or encoding fails.
    #[must_use]
    pub fn respond(&self, imprint: &[u8], nonce: Option<u64>, variant: TokenVariant) -> Vec<u8> {
        if variant == TokenVariant::Rejected {
            let text = Utf8StringRef::new("request rejected by test TSA").expect("UTF-8 text");
            let status = sequence(&[&encode(&2u8), &sequence(&[&encode(&text)])]);
            return sequence(&[&status]);
        }

        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let tst_info = Self::tst_info(imprint, nonce, serial, 0);

        let digested = if variant == TokenVariant::Grafted {
            // Signed attributes describe some other token content.
            Self::tst_info(imprint, nonce, serial.wrapping_add(1000), 3600)
        } else {
            tst_info.clone()
        };
        let content_type = if variant == TokenVariant::WrongContentType {
            ID_DATA
        } else {
            oid::ID_CT_TST_INFO
        };

        let signed_attrs = tlv(
            Tag::Set,
            &[
                attribute(oid::ID_CONTENT_TYPE, &encode(&content_type)),
                attribute(oid::ID_SIGNING_TIME, &encode(&utc_time(Utc::now()))),
                attribute(oid::ID_MESSAGE_DIGEST, &octets(&Sha256::digest(&digested))),
            ]
            .concat(),
        );
        let attrs_hash = Sha256::digest(&signed_attrs);

        let (signature_algorithm, mut signature) = if variant == TokenVariant::Pss {
            let hash = ContentHash::try_from_slice(&attrs_hash).expect("SHA-256 length");
            let signature = self.key.sign(&hash).expect("PSS signing failed");
            (pss_algorithm(self.key.public_key().bits()), signature.as_bytes().to_vec())
        } else {
            let signature = self
                .key
                .sign_pkcs1v15(DigestAlgorithm::Sha256, &attrs_hash)
                .expect("PKCS#1 signing failed");
            (algorithm(oid::RSA_ENCRYPTION), signature)
        };
        if variant == TokenVariant::BadSignature {
            if let Some(byte) = signature.get_mut(10) {
                *byte ^= 0x01;
            }
        }

        let sid = if variant == TokenVariant::SubjectKeyId {
            tlv(
                Tag::ContextSpecific {
                    constructed: false,
                    number: TagNumber::N0,
                },
                self.certificate.subject_key_id().unwrap_or_default(),
            )
        } else {
            let serial = UintRef::new(self.certificate.serial()).expect("certificate serial");
            sequence(&[self.certificate.issuer(), &encode(&serial)])
        };

        // [0] IMPLICIT replaces the SET tag.
        let mut implicit_attrs = signed_attrs;
        implicit_attrs[0] = u8::from(explicit_tag(TagNumber::N0));

        let signer_info = sequence(&[
            &encode(&if variant == TokenVariant::SubjectKeyId { 3u8 } else { 1u8 }),
            &sid,
            &algorithm(oid::SHA256),
            &implicit_attrs,
            &signature_algorithm,
            &octets(&signature),
        ]);

        let encap = sequence(&[
            &encode(&oid::ID_CT_TST_INFO),
            &explicit(TagNumber::N0, &octets(&tst_info)),
        ]);
        let digest_algorithms = tlv(Tag::Set, &algorithm(oid::SHA256));

        let mut signed_data_parts: Vec<Vec<u8>> = vec![encode(&3u8), digest_algorithms, encap];
        if variant != TokenVariant::WithoutCertificates {
            signed_data_parts.push(explicit(TagNumber::N0, self.certificate.to_der()));
        }
        signed_data_parts.push(tlv(Tag::Set, &signer_info));
        let signed_data = tlv(Tag::Sequence, &signed_data_parts.concat());

        let content_info = sequence(&[
            &encode(&oid::ID_SIGNED_DATA),
            &explicit(TagNumber::N0, &signed_data),
        ]);
        let status = sequence(&[&encode(&0u8)]);
        sequence(&[&status, &content_info])
    }

    fn tst_info(imprint: &[u8], nonce: Option<u64>, serial: u64, skew_secs: i64) -> Vec<u8> {
        // Millisecond precision, as many public TSAs emit.
        let gen_time = Utc::now()
            .checked_add_signed(Duration::seconds(skew_secs))
            .expect("generation time in range")
            .format("%Y%m%d%H%M%S%.3fZ")
            .to_string();
        let mut parts: Vec<Vec<u8>> = vec![
            encode(&1u8),
            encode(&TEST_POLICY),
            sequence(&[&algorithm(oid::SHA256), &octets(imprint)]),
            encode(&serial),
            tlv(Tag::GeneralizedTime, gen_time.as_bytes()),
        ];
        if let Some(nonce) = nonce {
            parts.push(encode(&nonce));
        }
        tlv(Tag::Sequence, &parts.concat())
    }
}

impl Default for TestTsa {
    fn default() -> Self {
        Self::new()
    }
}

fn tlv(tag: Tag, content: &[u8]) -> Vec<u8> {
    AnyRef::new(tag, content)
        .and_then(|value| value.to_der())
        .expect("DER encoding")
}

fn encode(value: &impl Encode) -> Vec<u8> {
    value.to_der().expect("DER encoding")
}

fn sequence(fields: &[&[u8]]) -> Vec<u8> {
    tlv(Tag::Sequence, &fields.concat())
}

fn octets(bytes: &[u8]) -> Vec<u8> {
    encode(&OctetStringRef::new(bytes).expect("octet string length"))
}

const fn explicit_tag(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number,
    }
}

fn explicit(number: TagNumber, inner: &[u8]) -> Vec<u8> {
    tlv(explicit_tag(number), inner)
}

fn algorithm(algorithm: ObjectIdentifier) -> Vec<u8> {
    sequence(&[&encode(&algorithm), &encode(&Null)])
}

fn attribute(attr_type: ObjectIdentifier, value: &[u8]) -> Vec<u8> {
    sequence(&[&encode(&attr_type), &tlv(Tag::Set, value)])
}

fn utc_time(at: DateTime<Utc>) -> UtcTime {
    let secs = u64::try_from(at.timestamp()).expect("time after 1970");
    UtcTime::from_unix_duration(std::time::Duration::from_secs(secs)).expect("UTCTime range")
}

fn pss_algorithm(bits: usize) -> Vec<u8> {
    let salt_len = u64::try_from(bits.div_ceil(8).saturating_sub(34)).expect("salt length");
    let sha256 = algorithm(oid::SHA256);
    let mgf1 = sequence(&[&encode(&ID_MGF1), &sha256]);
    let params = sequence(&[
        &explicit(TagNumber::N0, &sha256),
        &explicit(TagNumber::N1, &mgf1),
        &explicit(TagNumber::N2, &encode(&salt_len)),
    ]);
    sequence(&[&encode(&oid::RSASSA_PSS), &params])
}
