//! Per-host staking key material.

use std::collections::HashMap;
use std::fmt::Write as _;

use rand::RngCore;

use super::error::DomainError;
use super::id::HostId;

const SECRET_LEN: usize = 32;

/// Secrets a node needs to take part in consensus.
///
/// Generated locally, once per host, and never shared between hosts.
#[derive(Clone, PartialEq, Eq)]
pub struct StakingKeys {
    signer: [u8; SECRET_LEN],
    staking: [u8; SECRET_LEN],
}

impl std::fmt::Debug for StakingKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingKeys")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

impl StakingKeys {
    /// Draw fresh secrets from `rng`.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut signer = [0u8; SECRET_LEN];
        let mut staking = [0u8; SECRET_LEN];
        rng.fill_bytes(&mut signer);
        rng.fill_bytes(&mut staking);
        Self { signer, staking }
    }

    /// Rebuild from the hex encodings written by [`Self::signer_hex`] and
    /// [`Self::staking_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidKeyMaterial`] on malformed input.
    pub fn from_hex(signer: &str, staking: &str) -> Result<Self, DomainError> {
        Ok(Self {
            signer: decode(signer.trim())?,
            staking: decode(staking.trim())?,
        })
    }

    #[must_use]
    pub fn signer_hex(&self) -> String {
        encode(&self.signer)
    }

    #[must_use]
    pub fn staking_hex(&self) -> String {
        encode(&self.staking)
    }

    /// Short identifier safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut out = encode(&self.staking[..4]);
        out.push(':');
        out.push_str(&encode(&self.signer[..4]));
        out
    }
}

fn encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn decode(hex: &str) -> Result<[u8; SECRET_LEN], DomainError> {
    if hex.len() != SECRET_LEN * 2 {
        return Err(DomainError::InvalidKeyMaterial(format!(
            "expected {} hex characters, got {}",
            SECRET_LEN * 2,
            hex.len()
        )));
    }
    let mut out = [0u8; SECRET_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = hex.get(i * 2..i * 2 + 2).unwrap_or_default();
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|e| DomainError::InvalidKeyMaterial(e.to_string()))?;
    }
    Ok(out)
}

/// Reject any two hosts holding identical secrets.
///
/// # Errors
///
/// Returns [`DomainError::DuplicateKeyMaterial`] naming the first colliding pair.
pub fn ensure_unique<'a>(
    keys: impl IntoIterator<Item = (&'a HostId, &'a StakingKeys)>,
) -> Result<(), DomainError> {
    let mut seen: HashMap<[u8; SECRET_LEN], &HostId> = HashMap::new();
    for (host, material) in keys {
        for secret in [material.signer, material.staking] {
            if let Some(first) = seen.insert(secret, host) {
                if first != host {
                    return Err(DomainError::DuplicateKeyMaterial {
                        first: first.clone(),
                        second: host.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn hex_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys = StakingKeys::generate(&mut rng);
        let back = StakingKeys::from_hex(&keys.signer_hex(), &keys.staking_hex()).unwrap();
        assert_eq!(back, keys);
        assert_eq!(keys.fingerprint().len(), 17);
    }

    #[test]
    fn rejects_short_hex() {
        assert!(StakingKeys::from_hex("abcd", "abcd").is_err());
    }

    #[test]
    fn duplicate_material_is_detected() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = StakingKeys::generate(&mut rng);
        let b = StakingKeys::generate(&mut rng);
        let ha = HostId::new("a");
        let hb = HostId::new("b");
        let hc = HostId::new("c");

        assert!(ensure_unique([(&ha, &a), (&hb, &b)]).is_ok());
        let err = ensure_unique([(&ha, &a), (&hb, &b), (&hc, &a)]).unwrap_err();
        assert_eq!(
            err,
            DomainError::DuplicateKeyMaterial {
                first: ha,
                second: hc
            }
        );
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let keys = StakingKeys::generate(&mut StdRng::seed_from_u64(3));
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains(&keys.signer_hex()));
    }
}
