//! [`KeyVault`] as owner-only files, one directory per host.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use crate::adapter::outbound::cloud::keyfile::write_private_key;
use crate::domain::id::HostId;
use crate::domain::keys::StakingKeys;
use crate::error::{Error, Result};
use crate::port::outbound::store::KeyVault;

const SIGNER_FILE: &str = "signer.key";
const STAKER_FILE: &str = "staker.key";

/// Staking keys under `<root>/<host>/`, hex encoded, mode 0600.
#[derive(Debug, Clone)]
pub struct FileKeyVault {
    root: PathBuf,
}

impl FileKeyVault {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, host: &HostId) -> PathBuf {
        self.root.join(host.as_str().replace(['/', '\\'], "_"))
    }
}

impl KeyVault for FileKeyVault {
    fn load(&self, host: &HostId) -> Result<Option<StakingKeys>> {
        let dir = self.dir(host);
        let signer = match fs::read_to_string(dir.join(SIGNER_FILE)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let staker = fs::read_to_string(dir.join(STAKER_FILE))?;
        Ok(Some(StakingKeys::from_hex(&signer, &staker)?))
    }

    fn store(&self, host: &HostId, keys: &StakingKeys) -> Result<()> {
        let dir = self.dir(host);
        write_private_key(&dir.join(STAKER_FILE), &keys.staking_hex())?;
        write_private_key(&dir.join(SIGNER_FILE), &keys.signer_hex())?;
        debug!(host = %host, fingerprint = %keys.fingerprint(), "Staking keys stored");
        Ok(())
    }

    fn key_files(&self, host: &HostId) -> Result<Vec<(PathBuf, &'static str)>> {
        let dir = self.dir(host);
        let files = vec![(dir.join(SIGNER_FILE), SIGNER_FILE), (dir.join(STAKER_FILE), STAKER_FILE)];
        if let Some((missing, _)) = files.iter().find(|(path, _)| !path.exists()) {
            return Err(Error::State(format!("no staking key at {}", missing.display())));
        }
        Ok(files)
    }

    fn remove(&self, host: &HostId) -> Result<()> {
        match fs::remove_dir_all(self.dir(host)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn stored_keys_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileKeyVault::new(dir.path());
        let host = HostId::new("i-1");
        let keys = StakingKeys::generate(&mut StdRng::seed_from_u64(1));

        assert!(vault.load(&host).unwrap().is_none());
        vault.store(&host, &keys).unwrap();
        assert_eq!(vault.load(&host).unwrap(), Some(keys));

        let files = vault.key_files(&host).unwrap();
        assert_eq!(files.iter().map(|(_, name)| *name).collect::<Vec<_>>(), [SIGNER_FILE, STAKER_FILE]);
    }

    #[test]
    fn key_files_require_stored_keys() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileKeyVault::new(dir.path());
        assert!(matches!(vault.key_files(&HostId::new("i-9")), Err(Error::State(_))));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileKeyVault::new(dir.path());
        let host = HostId::new("i-1");
        vault.store(&host, &StakingKeys::generate(&mut StdRng::seed_from_u64(2))).unwrap();
        vault.remove(&host).unwrap();
        vault.remove(&host).unwrap();
        assert!(vault.load(&host).unwrap().is_none());
    }
}
