//! Secret validator: fixed-width digest set gating a capability key

use std::collections::BTreeSet;

use sha2::{Digest, Sha512};

use crate::error::{AccessError, AccessResult};

/// Width of a registered secret digest (SHA-512)
pub const DIGEST_LEN: usize = 64;

pub type SecretDigest = [u8; DIGEST_LEN];

/// Digest a raw caller secret into the form stored in a validator
pub fn digest(secret: &[u8]) -> SecretDigest {
    let hash = Sha512::digest(secret);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hash);
    out
}

/// Convert a byte slice into a digest, rejecting any other width
pub fn to_digest(bytes: &[u8]) -> AccessResult<SecretDigest> {
    bytes
        .try_into()
        .map_err(|_| AccessError::InvalidDigestLength {
            expected: DIGEST_LEN,
            actual: bytes.len(),
        })
}

/// Immutable set of accepted secret digests
///
/// Ordered so that serialized forms list digests in a stable order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretValidator {
    digests: BTreeSet<SecretDigest>,
}

impl SecretValidator {
    /// Build from already-sized digests
    pub fn new(digests: impl IntoIterator<Item = SecretDigest>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    /// Build from untrusted byte strings; every entry must be exactly 64 bytes
    pub fn from_digests<B: AsRef<[u8]>>(digests: impl IntoIterator<Item = B>) -> AccessResult<Self> {
        let digests = digests
            .into_iter()
            .map(|d| to_digest(d.as_ref()))
            .collect::<AccessResult<BTreeSet<_>>>()?;
        Ok(Self { digests })
    }

    /// Build from raw secrets, hashing each one
    pub fn from_secrets<B: AsRef<[u8]>>(secrets: impl IntoIterator<Item = B>) -> Self {
        Self::new(secrets.into_iter().map(|s| digest(s.as_ref())))
    }

    /// Check a presented digest for membership
    ///
    /// Errors (rather than returning `false`) when the presented value is not
    /// exactly `DIGEST_LEN` bytes.
    pub fn validate(&self, presented: &[u8]) -> AccessResult<bool> {
        let presented = to_digest(presented)?;
        Ok(self.digests.contains(&presented))
    }

    /// Hash a raw secret and check the result for membership
    pub fn validate_secret(&self, secret: &[u8]) -> bool {
        self.digests.contains(&digest(secret))
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecretDigest> {
        self.digests.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_membership() {
        let validator = SecretValidator::from_secrets([b"open sesame".as_slice()]);

        assert!(validator.validate(&digest(b"open sesame")).unwrap());
        assert!(!validator.validate(&digest(b"open barley")).unwrap());
    }

    #[test]
    fn test_validate_rejects_wrong_width() {
        let validator = SecretValidator::from_secrets([b"s".as_slice()]);

        let result = validator.validate(&[0u8; 32]);
        assert!(matches!(
            result,
            Err(AccessError::InvalidDigestLength {
                expected: 64,
                actual: 32
            })
        ));

        // Truncated prefix of a valid digest must not match
        let valid = digest(b"s");
        assert!(validator.validate(&valid[..63]).is_err());
    }

    #[test]
    fn test_from_digests_rejects_wrong_width() {
        let good = digest(b"a").to_vec();
        let bad = vec![7u8; 65];

        assert!(SecretValidator::from_digests([good.clone()]).is_ok());
        let result = SecretValidator::from_digests([good, bad]);
        assert!(matches!(
            result,
            Err(AccessError::InvalidDigestLength { actual: 65, .. })
        ));
    }

    #[test]
    fn test_validate_secret_hashes_input() {
        let validator = SecretValidator::new([digest(b"pw1"), digest(b"pw2")]);

        assert!(validator.validate_secret(b"pw1"));
        assert!(validator.validate_secret(b"pw2"));
        assert!(!validator.validate_secret(b"pw3"));
        assert_eq!(validator.len(), 2);
    }
}
