//! Utility functions for error handling
//!
//! Path-aware wrappers around file system access so that failures name the
//! file and the reason it was needed.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{MatchError, Result};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(MatchError::io_at(
            path,
            format!("File not found, needed for: {purpose}"),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    if !path.is_file() {
        return Err(MatchError::io_at(
            path,
            format!("Path is not a file, expected a file for: {purpose}"),
            io::Error::from(io::ErrorKind::InvalidInput),
        ));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check file permissions".to_string()
            }
            _ => format!("Failed to open file for: {purpose}"),
        };
        MatchError::io_at(path, context, e)
    })
}

/// Check if a directory exists and is readable, with rich error information
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(MatchError::io_at(
            path,
            format!("Directory not found, needed for: {purpose}"),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    if !path.is_dir() {
        return Err(MatchError::io_at(
            path,
            format!("Path is not a directory, expected a directory for: {purpose}"),
            io::Error::from(io::ErrorKind::InvalidInput),
        ));
    }

    match fs::read_dir(path) {
        Ok(_) => Ok(()),
        Err(e) => {
            let context = match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    "Permission denied - check directory permissions".to_string()
                }
                _ => format!("Failed to access directory for: {purpose}"),
            };
            Err(MatchError::io_at(path, context, e))
        }
    }
}

/// Fail if an output file is already present
pub fn ensure_absent(path: &Path, purpose: &str) -> Result<()> {
    if path.exists() {
        return Err(MatchError::configuration(format!(
            "{purpose} already exists: {}",
            path.display()
        )));
    }
    Ok(())
}
