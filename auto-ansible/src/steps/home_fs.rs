//! Filesystem access inside the service account's home.
//!
//! These run with the invoking privileges on paths the account controls, so symbolic links
//! are never followed. A link planted by the account is refused instead of redirecting a
//! privileged read, write, chmod or chown elsewhere on the host. Permissions and ownership
//! are always changed through an open handle, never by path.

use std::{
    fs::{self, File, FileType, Metadata, OpenOptions, Permissions},
    io,
    os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt},
    path::Path,
};

use crate::error::ProvisionError;

use super::account::Account;

fn describe(file_type: FileType) -> &'static str {
    if file_type.is_symlink() {
        "a symbolic link"
    } else if file_type.is_dir() {
        "a directory"
    } else if file_type.is_file() {
        "a regular file"
    } else {
        "a special file"
    }
}

fn unsafe_path(path: &Path, found: &'static str) -> ProvisionError {
    ProvisionError::UnsafePath {
        path: path.to_path_buf(),
        found,
    }
}

/// Whether anything, including a dangling link, exists at `path`
pub fn entry_exists(path: &Path) -> Result<bool, ProvisionError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ProvisionError::io(
            format!("failed to inspect {}", path.display()),
            e,
        )),
    }
}

/// Metadata of the entry at `path` itself, `None` when it is missing. A symbolic link is an
/// error.
pub fn entry_metadata(path: &Path) -> Result<Option<Metadata>, ProvisionError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            Err(unsafe_path(path, describe(metadata.file_type())))
        }
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProvisionError::io(
            format!("failed to inspect {}", path.display()),
            e,
        )),
    }
}

fn open_nofollow(
    path: &Path,
    options: &mut OpenOptions,
    extra_flags: i32,
) -> Result<File, ProvisionError> {
    // O_NONBLOCK keeps a planted FIFO from blocking the open, it has no effect on regular files
    options
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK | extra_flags)
        .open(path)
        .map_err(|e| match e.raw_os_error() {
            Some(libc::ELOOP) => unsafe_path(path, "a symbolic link"),
            Some(libc::ENOTDIR) => unsafe_path(path, "not a directory"),
            _ => ProvisionError::io(format!("failed to open {}", path.display()), e),
        })
}

fn handle_metadata(file: &File, path: &Path) -> Result<Metadata, ProvisionError> {
    file.metadata()
        .map_err(|e| ProvisionError::io(format!("failed to inspect {}", path.display()), e))
}

/// Open a regular file with a single link. Hard links are refused as well, since they can
/// point at files outside the account's home.
pub fn open_file(path: &Path, options: &mut OpenOptions) -> Result<File, ProvisionError> {
    let file = open_nofollow(path, options, 0)?;

    let metadata = handle_metadata(&file, path)?;
    if !metadata.is_file() {
        return Err(unsafe_path(path, describe(metadata.file_type())));
    }
    if metadata.nlink() > 1 {
        return Err(unsafe_path(path, "a hard link"));
    }

    Ok(file)
}

pub fn open_dir(path: &Path) -> Result<File, ProvisionError> {
    open_nofollow(path, OpenOptions::new().read(true), libc::O_DIRECTORY)
}

pub fn set_mode(handle: &File, path: &Path, mode: u32) -> Result<(), ProvisionError> {
    handle
        .set_permissions(Permissions::from_mode(mode))
        .map_err(|e| {
            ProvisionError::io(
                format!("failed to set permissions on {}", path.display()),
                e,
            )
        })
}

/// Create a directory owned by `account` with `mode`. An existing directory is left as it
/// is; anything else at `path` is an error.
///
/// Returns whether the directory was created.
pub fn create_account_dir(
    account: &Account,
    path: &Path,
    mode: u32,
) -> Result<bool, ProvisionError> {
    match entry_metadata(path)? {
        Some(metadata) if metadata.is_dir() => return Ok(false),
        Some(metadata) => return Err(unsafe_path(path, describe(metadata.file_type()))),
        None => {}
    }

    // mkdir never follows a link at its final component
    fs::create_dir(path)
        .map_err(|e| ProvisionError::io(format!("failed to create {}", path.display()), e))?;

    let dir = open_dir(path)?;
    set_mode(&dir, path, mode)?;
    account.take_ownership(&dir, path)?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, OpenOptions},
        os::unix::fs::{symlink, PermissionsExt},
    };

    use crate::{error::ProvisionError, testing::FakeHost};

    use super::{create_account_dir, entry_exists, open_file};

    #[test]
    fn dangling_link_counts_as_existing() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("key");
        symlink(dir.path().join("missing"), &link).unwrap();

        assert!(entry_exists(&link).unwrap());
        assert!(!entry_exists(&dir.path().join("other")).unwrap());
    }

    #[test]
    fn files_behind_links_are_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::write(&target, "secret").unwrap();
        let link = dir.path().join("link");
        symlink(&target, &link).unwrap();

        let err = open_file(&link, OpenOptions::new().read(true)).unwrap_err();

        assert!(matches!(err, ProvisionError::UnsafePath { .. }));
    }

    #[test]
    fn hard_linked_files_are_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::write(&target, "").unwrap();
        let link = dir.path().join("link");
        fs::hard_link(&target, &link).unwrap();

        let err = open_file(&link, OpenOptions::new().write(true)).unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::UnsafePath {
                found: "a hard link",
                ..
            }
        ));
    }

    #[test]
    fn directory_link_is_not_chmodded() {
        let root = tempfile::tempdir().unwrap();
        let account = FakeHost::new(root.path())
            .with_account("ansible")
            .account("ansible");
        let elsewhere = tempfile::tempdir().unwrap();
        fs::set_permissions(elsewhere.path(), fs::Permissions::from_mode(0o755)).unwrap();
        symlink(elsewhere.path(), account.ssh_dir()).unwrap();

        let err = create_account_dir(&account, &account.ssh_dir(), 0o700).unwrap_err();

        assert!(matches!(err, ProvisionError::UnsafePath { .. }));
        let mode = fs::metadata(elsewhere.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn creates_missing_directory_with_mode() {
        let root = tempfile::tempdir().unwrap();
        let account = FakeHost::new(root.path())
            .with_account("ansible")
            .account("ansible");

        assert!(create_account_dir(&account, &account.ssh_dir(), 0o700).unwrap());
        assert!(!create_account_dir(&account, &account.ssh_dir(), 0o700).unwrap());

        let mode = fs::metadata(account.ssh_dir()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }
}
