//! Jobs that change names and attributes without moving data.

use super::{exists, set_mode, write_error};
use adminfs_core::{AdminError, ErrorCode, JobFlags, Result};
use nix::unistd::{Group, User};
use std::path::PathBuf;

pub(super) async fn mkdir(path: PathBuf, permissions: Option<u32>) -> Result<()> {
    tokio::fs::create_dir(&path).await.map_err(write_error)?;
    if let Some(mode) = permissions {
        set_mode(&path, mode).await?;
    }
    Ok(())
}

pub(super) async fn rename(src: PathBuf, dst: PathBuf, flags: JobFlags) -> Result<()> {
    if !exists(&src).await {
        return Err(AdminError::operation(
            ErrorCode::DoesNotExist,
            format!("{} does not exist", src.display()),
        ));
    }
    if exists(&dst).await && !flags.contains(JobFlags::OVERWRITE) {
        return Err(AdminError::operation(
            ErrorCode::AlreadyExists,
            format!("{} already exists", dst.display()),
        ));
    }
    tokio::fs::rename(&src, &dst).await.map_err(write_error)
}

pub(super) async fn chmod(path: PathBuf, permissions: u32) -> Result<()> {
    set_mode(&path, permissions).await
}

/// Empty names leave that part of the ownership unchanged.
pub(super) async fn chown(path: PathBuf, owner: String, group: String) -> Result<()> {
    let uid = if owner.is_empty() {
        None
    } else {
        let user = User::from_name(&owner)
            .map_err(|e| AdminError::operation(ErrorCode::Internal, e.to_string()))?
            .ok_or_else(|| {
                AdminError::operation(ErrorCode::DoesNotExist, format!("unknown user {owner}"))
            })?;
        Some(user.uid)
    };
    let gid = if group.is_empty() {
        None
    } else {
        let group_entry = Group::from_name(&group)
            .map_err(|e| AdminError::operation(ErrorCode::Internal, e.to_string()))?
            .ok_or_else(|| {
                AdminError::operation(ErrorCode::DoesNotExist, format!("unknown group {group}"))
            })?;
        Some(group_entry.gid)
    };

    tokio::task::spawn_blocking(move || nix::unistd::chown(&path, uid, gid))
        .await
        .map_err(|e| AdminError::internal(format!("chown task failed: {e}")))?
        .map_err(|errno| write_error(std::io::Error::from(errno)))
}
