//! Detached XML-DSig verification for XISF headers (§4.I): C14N digest of
//! the referenced payload, then RSA verification of `SignedInfo` against
//! the embedded `RSAKeyValue`.

use std::string::String;
use std::vec::Vec;

use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{XisfError as Error, XisfResult as Result};
use crate::xisf::xml::{NodeRef, XmlArena, XmlNode};

/// How a parser reacts to signature verification outcomes (§4.I step c).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Verification failure is a hard error.
    Require,
    /// Verification failure is reported through the warning sink only.
    Warn,
    /// Signature elements are not even inspected.
    Ignore,
}

/// Outcome of evaluating a unit's `<Signature>` element, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureVerdict {
    /// No `<Signature>` element was present in the header.
    NotPresent,
    /// Present and the policy allowed skipping verification.
    Ignored,
    /// Digest and RSA verification both succeeded.
    Verified,
    /// Verification failed; the policy was `Warn` so parsing continued.
    Unverified(String),
}

enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    fn from_uri(uri: &str) -> Result<Self> {
        Ok(if uri.ends_with("sha1") {
            DigestAlgorithm::Sha1
        } else if uri.ends_with("sha256") {
            DigestAlgorithm::Sha256
        } else if uri.ends_with("sha512") {
            DigestAlgorithm::Sha512
        } else {
            return Err(Error::Signature("unsupported DigestMethod algorithm"));
        })
    }

    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// Canonicalize `node` to bytes following a C14N-inspired subset: children
/// in document order, attributes lexicographically sorted by name, text
/// content taken verbatim. Supports this crate's own writer output
/// losslessly; does not implement the XML namespace axis or attribute
/// value normalization of full C14N 1.0 (see DESIGN.md).
pub fn canonicalize(arena: &XmlArena, idx: NodeRef) -> String {
    let mut out = String::new();
    write_node(arena, idx, &mut out);
    out
}

fn write_node(arena: &XmlArena, idx: NodeRef, out: &mut String) {
    let node: &XmlNode = arena.get(idx);
    out.push('<');
    out.push_str(&node.tag);
    let mut attrs = node.attrs.clone();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    for (k, v) in &attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&escape_attr(v));
        out.push('"');
    }
    if node.children.is_empty() && node.text.is_empty() {
        out.push_str("></");
        out.push_str(&node.tag);
        out.push('>');
        return;
    }
    out.push('>');
    out.push_str(&escape_text(&node.text));
    for &child in &node.children {
        write_node(arena, child, out);
    }
    out.push_str("</");
    out.push_str(&node.tag);
    out.push('>');
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn base64_decode(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact).map_err(|_| Error::Signature("malformed base64 in Signature element"))
}

/// Verify the `<Signature>` element found at `signature_idx`, whose digest
/// `Reference` must point (via `URI="#uid"`) at the node carrying the
/// signed payload. `policy` decides whether a failure is an `Err` or a
/// logged [`SignatureVerdict::Unverified`].
pub fn verify(arena: &XmlArena, signature_idx: NodeRef, policy: SignaturePolicy) -> Result<SignatureVerdict> {
    if policy == SignaturePolicy::Ignore {
        return Ok(SignatureVerdict::Ignored);
    }
    match verify_inner(arena, signature_idx) {
        Ok(()) => Ok(SignatureVerdict::Verified),
        Err(e) => match policy {
            SignaturePolicy::Require => Err(e),
            SignaturePolicy::Warn => Ok(SignatureVerdict::Unverified(e.to_string())),
            SignaturePolicy::Ignore => unreachable!(),
        },
    }
}

fn verify_inner(arena: &XmlArena, signature_idx: NodeRef) -> Result<()> {
    let signature = arena.get(signature_idx);
    let signed_info_idx = *signature
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "SignedInfo")
        .ok_or(Error::Signature("Signature missing SignedInfo"))?;
    let signed_info = arena.get(signed_info_idx);

    // (a) payload digest.
    let reference_idx = *signed_info
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "Reference")
        .ok_or(Error::Signature("SignedInfo missing Reference"))?;
    let reference = arena.get(reference_idx);
    let uri = reference.attr("URI").ok_or(Error::Signature("Reference missing URI"))?;
    let target_uid = uri.strip_prefix('#').ok_or(Error::Signature("Reference URI is not a fragment id"))?;
    let target_idx = *arena.uids.get(target_uid).ok_or(Error::Signature("Reference URI points to an unknown uid"))?;

    let digest_method_idx = *reference
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "DigestMethod")
        .ok_or(Error::Signature("Reference missing DigestMethod"))?;
    let digest_algorithm = DigestAlgorithm::from_uri(arena.get(digest_method_idx).attr("Algorithm").unwrap_or(""))?;

    let digest_value_idx = *reference
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "DigestValue")
        .ok_or(Error::Signature("Reference missing DigestValue"))?;
    let expected_digest = base64_decode(arena.get(digest_value_idx).text.trim())?;

    let canonical_payload = canonicalize(arena, target_idx);
    let actual_digest = digest_algorithm.digest(canonical_payload.as_bytes());
    if actual_digest != expected_digest {
        return Err(Error::Signature("payload digest mismatch"));
    }

    // (b) SignedInfo / RSA verification.
    let signature_method_idx = *signed_info
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "SignatureMethod")
        .ok_or(Error::Signature("SignedInfo missing SignatureMethod"))?;
    let method_uri = arena.get(signature_method_idx).attr("Algorithm").unwrap_or("");
    let sig_digest_algorithm = DigestAlgorithm::from_uri(method_uri)?;

    let signature_value_idx = *signature
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "SignatureValue")
        .ok_or(Error::Signature("Signature missing SignatureValue"))?;
    let signature_bytes = base64_decode(arena.get(signature_value_idx).text.trim())?;

    let key_info_idx = *signature
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "KeyInfo")
        .ok_or(Error::Signature("Signature missing KeyInfo"))?;
    let (modulus, exponent) = find_rsa_key(arena, key_info_idx)?;

    let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&modulus), BigUint::from_bytes_be(&exponent))
        .map_err(|_| Error::Signature("malformed RSA public key"))?;
    let _ = public_key.n();

    let canonical_signed_info = canonicalize(arena, signed_info_idx);
    let signed_info_digest = sig_digest_algorithm.digest(canonical_signed_info.as_bytes());

    let scheme = match sig_digest_algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };
    public_key
        .verify(scheme, &signed_info_digest, &signature_bytes)
        .map_err(|_| Error::Signature("RSA signature verification failed"))
}

fn find_rsa_key(arena: &XmlArena, key_info_idx: NodeRef) -> Result<(Vec<u8>, Vec<u8>)> {
    let key_value_idx = *arena
        .get(key_info_idx)
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "KeyValue")
        .ok_or(Error::Signature("KeyInfo missing KeyValue"))?;
    let rsa_key_value_idx = *arena
        .get(key_value_idx)
        .children
        .iter()
        .find(|&&c| arena.get(c).tag == "RSAKeyValue")
        .ok_or(Error::Signature("KeyValue missing RSAKeyValue"))?;
    let rsa_node = arena.get(rsa_key_value_idx);
    let modulus_idx = *rsa_node.children.iter().find(|&&c| arena.get(c).tag == "Modulus").ok_or(Error::Signature("RSAKeyValue missing Modulus"))?;
    let exponent_idx = *rsa_node.children.iter().find(|&&c| arena.get(c).tag == "Exponent").ok_or(Error::Signature("RSAKeyValue missing Exponent"))?;
    Ok((base64_decode(arena.get(modulus_idx).text.trim())?, base64_decode(arena.get(exponent_idx).text.trim())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xisf::xml::parse;

    #[test]
    fn canonicalize_sorts_attributes() {
        let arena = parse(r#"<xisf version="1.0"><Image b="2" a="1"/></xisf>"#).unwrap();
        let root = arena.root;
        let image_idx = arena.get(root).children[0];
        let c14n = canonicalize(&arena, image_idx);
        assert_eq!(c14n, r#"<Image a="1" b="2"></Image>"#);
    }

    #[test]
    fn missing_signed_info_is_rejected() {
        let arena = parse(r#"<xisf version="1.0"><Signature/></xisf>"#).unwrap();
        let sig_idx = arena.get(arena.root).children[0];
        assert!(verify(&arena, sig_idx, SignaturePolicy::Require).is_err());
    }
}
