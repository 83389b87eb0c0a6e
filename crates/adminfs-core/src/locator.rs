//! Resource locators.
//!
//! Callers address resources with the privileged `admin` scheme
//! (`admin:///etc/fstab`). The helper rewrites that to a plain `file` locator
//! before running anything, so jobs only ever see absolute local paths.

use crate::errors::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Scheme under which callers request elevated access.
pub const ADMIN_SCHEME: &str = "admin";

/// Scheme the helper uses internally.
pub const FILE_SCHEME: &str = "file";

/// A parsed, absolute local resource locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    path: PathBuf,
}

impl Locator {
    /// Parse `admin:///p`, `file:///p` or a bare absolute path.
    pub fn parse(input: &str) -> Result<Self> {
        if input.contains('\0') {
            return Err(AdminError::invalid("locator contains a NUL byte"));
        }

        let raw_path = match input.split_once(':') {
            Some((scheme, rest)) if is_scheme(scheme) => {
                if scheme != ADMIN_SCHEME && scheme != FILE_SCHEME {
                    return Err(AdminError::invalid(format!(
                        "unsupported scheme '{scheme}' in {input}"
                    )));
                }
                strip_authority(rest)?
            }
            _ => input.to_string(),
        };

        let decoded = percent_decode(&raw_path)?;
        if !decoded.starts_with('/') {
            return Err(AdminError::invalid(format!(
                "locator must be absolute: {input}"
            )));
        }
        if decoded.contains('\0') {
            return Err(AdminError::invalid("locator contains a NUL byte"));
        }

        Ok(Self {
            path: PathBuf::from(decoded),
        })
    }

    /// Build a locator from an absolute path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(AdminError::invalid(format!(
                "locator must be absolute: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Local path the locator resolves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, or `/` for the root.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }

    /// The `file://` form.
    pub fn to_file_url(&self) -> String {
        format!("{FILE_SCHEME}://{}", self.path.display())
    }

    /// The `admin://` form callers use.
    pub fn to_admin_url(&self) -> String {
        format!("{ADMIN_SCHEME}://{}", self.path.display())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_file_url())
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_authority(rest: &str) -> Result<String> {
    // Only empty or localhost authorities are local.
    match rest.strip_prefix("//") {
        Some(after) => {
            let (authority, path) = match after.find('/') {
                Some(index) => after.split_at(index),
                None => (after, "/"),
            };
            if !authority.is_empty() && authority != "localhost" {
                return Err(AdminError::invalid(format!(
                    "remote authority '{authority}' is not supported"
                )));
            }
            Ok(path.to_string())
        }
        None => Ok(rest.to_string()),
    }
}

fn percent_decode(input: &str) -> Result<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = bytes
                .get(index + 1..index + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| AdminError::invalid(format!("bad percent escape in {input}")))?;
            out.push(hex);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).map_err(|_| AdminError::invalid("locator is not valid UTF-8"))
}
