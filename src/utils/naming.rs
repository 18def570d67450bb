use crate::error::{DfsError, Result};

/// Accepts names made only of ASCII letters, digits, `.`, `_` and `-`. Anything else is
/// refused outright rather than rewritten.
pub fn validate_file_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(DfsError::InvalidName(name.to_string()))
    }
}

/// Name offered when a single chunk is saved on its own: `report.chunk2.pdf`.
pub fn chunk_file_name(file_name: &str, part_index: u32) -> String {
    match file_name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => format!("{}.chunk{}.{}", base, part_index, ext),
        _ => format!("{}.chunk{}", file_name, part_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for name in ["report.pdf", "a-b_c.tar.gz", "README", ".env"] {
            assert!(validate_file_name(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn rejects_spaces_slashes_and_unicode() {
        for name in ["my file.txt", "dir/file.txt", "..", "", "naïve.txt", "a\\b"] {
            assert!(matches!(validate_file_name(name), Err(DfsError::InvalidName(_))), "{}", name);
        }
    }

    #[test]
    fn chunk_names_keep_extension() {
        assert_eq!(chunk_file_name("report.pdf", 2), "report.chunk2.pdf");
        assert_eq!(chunk_file_name("archive.tar.gz", 1), "archive.tar.chunk1.gz");
        assert_eq!(chunk_file_name("README", 3), "README.chunk3");
        assert_eq!(chunk_file_name(".env", 1), ".env.chunk1");
    }
}
