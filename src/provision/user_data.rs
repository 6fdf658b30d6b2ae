//! User-data resolution for the creation request.
//!
//! User data can be provided inline through configuration or as a file
//! path. A configured file takes precedence and its entire byte content is
//! used verbatim; an unreadable file is a hard input error raised before
//! any creation attempt.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving user data.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum UserDataError {
    /// Raised when a configured file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when reading the file source fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves the user-data payload from inline configuration or a file.
///
/// A configured file overrides the inline value; without one the inline
/// string's bytes are used as-is (possibly empty, in which case no user
/// data is submitted).
///
/// # Errors
///
/// Returns [`UserDataError`] when the path is empty or the file cannot be
/// read.
pub fn resolve_user_data(inline: &str, file: Option<&str>) -> Result<Vec<u8>, UserDataError> {
    let Some(path) = file else {
        return Ok(inline.as_bytes().to_vec());
    };

    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    read_ambient(path).map_err(|message| UserDataError::FileRead {
        path: path.to_owned(),
        message,
    })
}

fn read_ambient(path: &str) -> Result<Vec<u8>, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn inline_bytes_used_without_file() {
        let result = resolve_user_data("#!/bin/sh\n", None);
        assert_eq!(result, Ok(b"#!/bin/sh\n".to_vec()));
    }

    #[test]
    fn file_overrides_inline() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = dir.path().join("user-data");
        let mut file =
            std::fs::File::create(&path).unwrap_or_else(|err| panic!("create file: {err}"));
        file.write_all(b"from-file")
            .unwrap_or_else(|err| panic!("write file: {err}"));

        let result = resolve_user_data("inline", Some(&path.to_string_lossy()));
        assert_eq!(result, Ok(b"from-file".to_vec()));
    }

    #[test]
    fn missing_file_is_a_hard_error() {
        let result = resolve_user_data("", Some("/definitely/not/here"));
        assert!(
            matches!(result, Err(UserDataError::FileRead { .. })),
            "unexpected outcome: {result:?}"
        );
    }

    #[test]
    fn blank_path_is_rejected() {
        let result = resolve_user_data("", Some("  "));
        assert_eq!(result, Err(UserDataError::FilePathEmpty));
    }
}
