//! Strict timestamp token verification.
//!
//! Four gates run in order and each one must pass before the next runs:
//!
//! 1. **Structure**: the response parses completely and was granted.
//! 2. **Imprint**: the token covers SHA-256 of exactly the expected data.
//! 3. **Grafting**: the signed attributes bind the encapsulated `TSTInfo`
//!    (content type and message digest).
//! 4. **Signature**: the signed attributes verify under a valid TSA
//!    certificate authorised for timestamping.
//!
//! Certificate revocation is not checked.

use chrono::{DateTime, Utc};
use der::{Reader, Tag, TagNumber};
use serde::Serialize;
use tessera_crypto::{Certificate, ContentHash, DigestAlgorithm, RsaScheme, oid};
use tracing::{debug, warn};

use crate::asn1::{algorithm_identifier, context, contents, next_is, parse_single, skip_optional};
use crate::error::{TimestampError, TimestampResult};
use crate::response::{SignerInfo, TimestampResponse, TimestampToken};

/// Default PSS salt length when parameters omit it.
const DEFAULT_PSS_SALT_LEN: u64 = 20;

/// Verification gates, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Response and token structure.
    Structure,
    /// Message imprint matches the expected digest.
    Imprint,
    /// Signed attributes bind the encapsulated content.
    Grafting,
    /// CMS signature and certificate checks.
    Signature,
}

impl Gate {
    /// All gates in order.
    pub const ALL: [Gate; 4] = [Self::Structure, Self::Imprint, Self::Grafting, Self::Signature];
}

/// Outcome of one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    /// Which gate.
    pub gate: Gate,
    /// Whether it passed.
    pub passed: bool,
    /// Human-readable detail.
    pub detail: String,
}

/// Options for [`verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// TSA certificate to use instead of the one bundled in the token.
    pub tsa_certificate: Option<Certificate>,
    /// Instant the certificate must be valid at. Defaults to now.
    pub at: Option<DateTime<Utc>>,
}

/// Result of verifying a timestamp token.
#[derive(Debug)]
pub struct TimestampVerification {
    /// True only if every gate passed.
    pub verified: bool,
    /// Gates that ran, in order. Gates after a failure are absent.
    pub gates: Vec<GateOutcome>,
    /// The first failure.
    pub error: Option<TimestampError>,
    /// Token generation time, once structure passed.
    pub gen_time: Option<DateTime<Utc>>,
    /// Token serial number in hex.
    pub serial: Option<String>,
    /// Dotted TSA policy OID.
    pub policy: Option<String>,
    /// Common name of the TSA certificate used.
    pub tsa_name: Option<String>,
}

impl TimestampVerification {
    fn new() -> Self {
        Self {
            verified: false,
            gates: Vec::with_capacity(Gate::ALL.len()),
            error: None,
            gen_time: None,
            serial: None,
            policy: None,
            tsa_name: None,
        }
    }

    fn pass(&mut self, gate: Gate, detail: impl Into<String>) {
        let detail = detail.into();
        debug!(?gate, %detail, "Timestamp gate passed");
        self.gates.push(GateOutcome {
            gate,
            passed: true,
            detail,
        });
    }

    fn fail(mut self, gate: Gate, error: TimestampError) -> Self {
        warn!(?gate, %error, "Timestamp gate failed");
        self.gates.push(GateOutcome {
            gate,
            passed: false,
            detail: error.to_string(),
        });
        self.error = Some(error);
        self.verified = false;
        self
    }

    /// The gate that failed, if any.
    #[must_use]
    pub fn failed_gate(&self) -> Option<Gate> {
        self.gates.iter().find(|g| !g.passed).map(|g| g.gate)
    }

    /// Convert into a `Result`, keeping the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing gate.
    pub fn into_result(self) -> TimestampResult<Self> {
        match self.error {
            Some(error) => Err(error),
            None if self.verified => Ok(self),
            None => Err(TimestampError::Malformed(
                "verification did not complete".into(),
            )),
        }
    }
}

/// Verify a DER `TimeStampResp` against the digest it should cover.
///
/// Never panics on malformed input and never reports success unless all
/// four gates passed.
#[must_use]
pub fn verify(
    response_der: &[u8],
    expected_digest: &ContentHash,
    options: &VerifyOptions,
) -> TimestampVerification {
    let mut result = TimestampVerification::new();

    // Gate 1
    let response = match TimestampResponse::from_der(response_der) {
        Ok(response) => response,
        Err(e) => return result.fail(Gate::Structure, e),
    };
    let token = match response.granted_token() {
        Ok(token) => token,
        Err(e) => return result.fail(Gate::Structure, e),
    };
    let info = token.tst_info();
    result.gen_time = Some(info.gen_time);
    result.serial = Some(info.serial_hex());
    result.policy = Some(info.policy_string());
    result.pass(
        Gate::Structure,
        format!("status {}, generated {}", response.status(), info.gen_time),
    );

    // Gate 2
    if let Err(e) = check_imprint(token, expected_digest) {
        return result.fail(Gate::Imprint, e);
    }
    result.pass(Gate::Imprint, "imprint equals SHA-256 of the covered data");

    // Gate 3
    if let Err(e) = check_binding(token) {
        return result.fail(Gate::Grafting, e);
    }
    result.pass(Gate::Grafting, "signed attributes bind the TSTInfo");

    // Gate 4
    match check_signature(token, options) {
        Ok(cert) => {
            result.tsa_name = cert.common_name().map(str::to_string);
            result.pass(
                Gate::Signature,
                format!(
                    "signed by {}",
                    cert.common_name().unwrap_or("unnamed TSA certificate")
                ),
            );
        },
        Err(e) => return result.fail(Gate::Signature, e),
    }

    result.verified = true;
    result
}

fn check_imprint(token: &TimestampToken, expected: &ContentHash) -> TimestampResult<()> {
    let info = token.tst_info();
    if info.imprint_algorithm != oid::SHA256 {
        return Err(TimestampError::UnsupportedImprintAlgorithm(
            info.imprint_algorithm.to_string(),
        ));
    }
    if info.hashed_message != expected.as_bytes() {
        return Err(TimestampError::ImprintMismatch {
            token: hex::encode(&info.hashed_message),
            expected: expected.to_hex(),
        });
    }
    Ok(())
}

fn check_binding(token: &TimestampToken) -> TimestampResult<()> {
    let signer = token.signer();
    match signer.content_type {
        Some(ct) if ct == oid::ID_CT_TST_INFO => {},
        Some(ct) => {
            return Err(TimestampError::GraftingDetected(format!(
                "content-type attribute is {ct}"
            )));
        },
        None => {
            return Err(TimestampError::GraftingDetected(
                "content-type attribute missing".into(),
            ));
        },
    }
    let claimed = signer.message_digest.as_deref().ok_or_else(|| {
        TimestampError::GraftingDetected("message-digest attribute missing".into())
    })?;
    let algorithm = DigestAlgorithm::from_oid(signer.digest_algorithm).ok_or_else(|| {
        TimestampError::GraftingDetected(format!(
            "unsupported signer digest algorithm {}",
            signer.digest_algorithm
        ))
    })?;
    let actual = algorithm.digest(token.tst_info_der());
    if actual != claimed {
        return Err(TimestampError::GraftingDetected(format!(
            "message-digest {} does not match {} of the TSTInfo ({})",
            hex::encode(claimed),
            algorithm.name(),
            hex::encode(&actual)
        )));
    }
    Ok(())
}

fn check_signature<'t>(
    token: &'t TimestampToken,
    options: &'t VerifyOptions,
) -> TimestampResult<&'t Certificate> {
    let cert = match &options.tsa_certificate {
        Some(cert) => cert,
        None => token
            .signer_certificate()
            .ok_or(TimestampError::CertificateNotFound)?,
    };

    let at = options.at.unwrap_or_else(Utc::now);
    if !cert.is_valid_at(at) {
        return Err(TimestampError::CertificateRejected(format!(
            "not valid at {at} (valid {} to {})",
            cert.not_before(),
            cert.not_after()
        )));
    }
    if let Some(usages) = cert.extended_key_usage() {
        if !usages.contains(&oid::KP_TIME_STAMPING) {
            return Err(TimestampError::CertificateRejected(
                "extended key usage lacks id-kp-timeStamping".into(),
            ));
        }
    }

    let scheme = signature_scheme(token.signer())?;
    let digest = match scheme {
        RsaScheme::Pkcs1v15(d) | RsaScheme::Pss { digest: d, .. } => d,
    };
    let public_key = cert
        .public_key()
        .map_err(|e| TimestampError::CertificateRejected(e.to_string()))?;
    let signed = token.signer().signed_attrs_for_signature();
    if public_key.verify_prehashed(scheme, &digest.digest(&signed), &token.signer().signature) {
        Ok(cert)
    } else {
        Err(TimestampError::SignatureInvalid(format!(
            "{scheme:?} signature over signed attributes does not verify"
        )))
    }
}

fn signature_scheme(signer: &SignerInfo) -> TimestampResult<RsaScheme> {
    let alg = signer.signature_algorithm;
    if alg == oid::RSA_ENCRYPTION {
        let digest = DigestAlgorithm::from_oid(signer.digest_algorithm).ok_or_else(|| {
            TimestampError::SignatureInvalid(format!(
                "unsupported digest algorithm {}",
                signer.digest_algorithm
            ))
        })?;
        return Ok(RsaScheme::Pkcs1v15(digest));
    }
    if alg == oid::SHA256_WITH_RSA {
        return Ok(RsaScheme::Pkcs1v15(DigestAlgorithm::Sha256));
    }
    if alg == oid::SHA384_WITH_RSA {
        return Ok(RsaScheme::Pkcs1v15(DigestAlgorithm::Sha384));
    }
    if alg == oid::SHA512_WITH_RSA {
        return Ok(RsaScheme::Pkcs1v15(DigestAlgorithm::Sha512));
    }
    if alg == oid::RSASSA_PSS {
        return pss_scheme(signer.signature_params.as_deref());
    }
    Err(TimestampError::SignatureInvalid(format!(
        "unsupported signature algorithm {alg}"
    )))
}

/// Decode `RSASSA-PSS-params`. SHA-1 defaults are not accepted.
fn pss_scheme(params: Option<&[u8]>) -> TimestampResult<RsaScheme> {
    let unsupported = |why: &str| TimestampError::SignatureInvalid(format!("PSS parameters: {why}"));
    let params = params.ok_or_else(|| unsupported("absent (SHA-1 default)"))?;
    let mut fields = parse_single(params, Tag::Sequence)?;

    if !next_is(&fields, context(TagNumber::N0)) {
        return Err(unsupported("hash defaults to SHA-1"));
    }
    let mut hash = contents(fields.decode()?, context(TagNumber::N0))?;
    let (hash_oid, _) = algorithm_identifier(hash.decode()?)?;
    hash.finish(())?;
    let digest = DigestAlgorithm::from_oid(hash_oid)
        .ok_or_else(|| unsupported(&format!("hash {hash_oid}")))?;

    skip_optional(&mut fields, context(TagNumber::N1))?;
    let salt_len = if next_is(&fields, context(TagNumber::N2)) {
        let mut salt = contents(fields.decode()?, context(TagNumber::N2))?;
        let value = salt.decode::<u64>()?;
        salt.finish(value)?
    } else {
        DEFAULT_PSS_SALT_LEN
    };
    skip_optional(&mut fields, context(TagNumber::N3))?;
    fields.finish(())?;

    let salt_len = usize::try_from(salt_len).map_err(|_| unsupported("salt length"))?;
    Ok(RsaScheme::Pss { digest, salt_len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tessera_test::tsa::{TestTsa, TokenVariant};

    fn digest() -> ContentHash {
        ContentHash::hash(b"audit log contents")
    }

    #[test]
    fn test_valid_token_passes_all_gates() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), Some(42), TokenVariant::Valid);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert!(result.verified, "{:?}", result.error);
        assert_eq!(result.gates.len(), 4);
        assert!(result.gen_time.is_some());
        assert_eq!(result.tsa_name.as_deref(), Some(TestTsa::COMMON_NAME));
    }

    #[test]
    fn test_pss_and_key_id_tokens_pass() {
        let tsa = TestTsa::new();
        for variant in [TokenVariant::Pss, TokenVariant::SubjectKeyId] {
            let response = tsa.respond(digest().as_bytes(), None, variant);
            let result = verify(&response, &digest(), &VerifyOptions::default());
            assert!(result.verified, "{variant:?}: {:?}", result.error);
        }
    }

    #[test]
    fn test_wrong_digest_fails_imprint() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Valid);
        let other = ContentHash::hash(b"different log");
        let result = verify(&response, &other, &VerifyOptions::default());
        assert!(!result.verified);
        assert_eq!(result.failed_gate(), Some(Gate::Imprint));
        assert!(matches!(
            result.error,
            Some(TimestampError::ImprintMismatch { .. })
        ));
    }

    #[test]
    fn test_grafted_token_rejected() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Grafted);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert!(!result.verified);
        assert_eq!(result.failed_gate(), Some(Gate::Grafting));
        assert!(matches!(
            result.error,
            Some(TimestampError::GraftingDetected(_))
        ));
        // Later gates never ran.
        assert_eq!(result.gates.len(), 3);
    }

    #[test]
    fn test_wrong_content_type_attribute_rejected() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::WrongContentType);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert_eq!(result.failed_gate(), Some(Gate::Grafting));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::BadSignature);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert_eq!(result.failed_gate(), Some(Gate::Signature));
        assert!(matches!(
            result.error,
            Some(TimestampError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let tsa = TestTsa::expired();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Valid);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert_eq!(result.failed_gate(), Some(Gate::Signature));
        assert!(matches!(
            result.error,
            Some(TimestampError::CertificateRejected(_))
        ));

        // Checking at a time inside the window succeeds.
        let options = VerifyOptions {
            tsa_certificate: None,
            at: Some(tsa.certificate().not_before() + Duration::seconds(1)),
        };
        assert!(verify(&response, &digest(), &options).verified);
    }

    #[test]
    fn test_external_certificate_must_match() {
        let tsa = TestTsa::new();
        let other = TestTsa::with_key(tessera_test::keys::secondary());
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::WithoutCertificates);

        let missing = verify(&response, &digest(), &VerifyOptions::default());
        assert!(matches!(
            missing.error,
            Some(TimestampError::CertificateNotFound)
        ));

        let good = VerifyOptions {
            tsa_certificate: Some(tsa.certificate().clone()),
            at: None,
        };
        assert!(verify(&response, &digest(), &good).verified);

        let wrong = VerifyOptions {
            tsa_certificate: Some(other.certificate().clone()),
            at: None,
        };
        assert_eq!(
            verify(&response, &digest(), &wrong).failed_gate(),
            Some(Gate::Signature)
        );
    }

    #[test]
    fn test_rejected_status_fails_structure() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Rejected);
        let result = verify(&response, &digest(), &VerifyOptions::default());
        assert_eq!(result.failed_gate(), Some(Gate::Structure));
        assert!(matches!(result.error, Some(TimestampError::Rejected { .. })));
    }

    #[test]
    fn test_garbage_and_truncation_never_pass() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Valid);
        for cut in [0, 1, 10, response.len() / 2, response.len().saturating_sub(1)] {
            let result = verify(&response[..cut], &digest(), &VerifyOptions::default());
            assert!(!result.verified);
            assert_eq!(result.failed_gate(), Some(Gate::Structure));
        }
        let mut trailing = response.clone();
        trailing.push(0);
        assert!(!verify(&trailing, &digest(), &VerifyOptions::default()).verified);
    }

    #[test]
    fn test_into_result() {
        let tsa = TestTsa::new();
        let response = tsa.respond(digest().as_bytes(), None, TokenVariant::Grafted);
        let err = verify(&response, &digest(), &VerifyOptions::default())
            .into_result()
            .unwrap_err();
        assert!(matches!(err, TimestampError::GraftingDetected(_)));
    }
}
