//! Moving files that may live on different filesystems.

use std::path::Path;
use tokio::fs;

use crate::error::StorageResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// A plain rename is tried first. On EXDEV the file is copied next to `dst`
/// under a temporary name, renamed into place, and the source is removed.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE_ERRNO)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    let tmp_dst = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source file after cross-device move: {}: {}",
            src.display(),
            e
        );
    }
    Ok(())
}
