//! Private key files on the operator's machine.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Write `material` to `path`, readable only by the owner.
///
/// `ssh` refuses keys with looser permissions.
pub fn write_private_key(path: &Path, material: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(material.as_bytes())?;
    if !material.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_written_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/k.pem");
        write_private_key(&path, "-----BEGIN KEY-----").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "-----BEGIN KEY-----\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
