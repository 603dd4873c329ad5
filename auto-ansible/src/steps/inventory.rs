use std::{
    fs::OpenOptions,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;

use crate::{config::InventorySource, error::ProvisionError, fetch::TemplateFetcher};

use super::{
    account::Account,
    home_fs::{entry_metadata, open_file},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InventoryOutcome {
    /// The template was downloaded into place
    Fetched { path: PathBuf, bytes: usize },
    /// An empty file was left for the operator to fill in
    CreatedEmpty { path: PathBuf },
    /// The file already had content, which was left untouched and is reported back
    AlreadyPopulated { path: PathBuf, contents: String },
}

/// Put an inventory file into the account's workspace.
///
/// An inventory that already has content is never written to, only read back so the operator
/// can check it. An existing but empty file counts as unpopulated.
pub async fn stage_inventory(
    fetcher: &dyn TemplateFetcher,
    account: &Account,
    source: &InventorySource,
    timeout: Duration,
) -> Result<InventoryOutcome, ProvisionError> {
    let workspace = account.workspace_dir();
    let is_dir = entry_metadata(&workspace)?.is_some_and(|metadata| metadata.is_dir());
    if !is_dir {
        return Err(ProvisionError::io(
            format!(
                "workspace directory {} is missing, the tool must be installed first",
                workspace.display()
            ),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    let path = account.inventory_path();

    if let Some(contents) = existing_contents(&path)? {
        tracing::info!(
            "Inventory {} is already populated, leaving it untouched",
            path.display()
        );
        return Ok(InventoryOutcome::AlreadyPopulated { path, contents });
    }

    let outcome = match source {
        InventorySource::Remote(url) => {
            tracing::info!("Fetching sample inventory from {}", url);

            let body = fetcher
                .fetch(url, timeout)
                .await
                .map_err(|source| ProvisionError::Fetch {
                    url: url.clone(),
                    source,
                })?;

            write_inventory(account, &path, &body)?;

            tracing::warn!(
                "IMPORTANT: modify {} with your host names and IP addresses",
                path.display()
            );

            InventoryOutcome::Fetched {
                path: path.clone(),
                bytes: body.len(),
            }
        }
        InventorySource::Empty => {
            write_inventory(account, &path, &[])?;

            tracing::warn!(
                "Created empty inventory {}, populate it with your host names and IP addresses",
                path.display()
            );

            InventoryOutcome::CreatedEmpty { path: path.clone() }
        }
    };

    Ok(outcome)
}

/// The inventory's contents if it exists and is non-empty
fn existing_contents(path: &Path) -> Result<Option<String>, ProvisionError> {
    let Some(metadata) = entry_metadata(path)? else {
        return Ok(None);
    };

    if metadata.is_file() && metadata.len() == 0 {
        return Ok(None);
    }

    let mut file = open_file(path, OpenOptions::new().read(true))?;

    let mut bytes = vec![];
    file.read_to_end(&mut bytes).map_err(|e| {
        ProvisionError::io(format!("failed to read inventory {}", path.display()), e)
    })?;

    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn write_inventory(account: &Account, path: &Path, contents: &[u8]) -> Result<(), ProvisionError> {
    // Truncate only once the handle is known to be a plain file in the workspace
    let mut file = open_file(path, OpenOptions::new().write(true).create(true))?;

    file.set_len(0)
        .and_then(|()| file.write_all(contents))
        .map_err(|e| {
            ProvisionError::io(format!("failed to write inventory {}", path.display()), e)
        })?;

    account.take_ownership(&file, path)
}
