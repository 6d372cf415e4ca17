//! Scratch files backed by the `tempfile` crate.

use std::io;
use std::io::Write;

use super::ScratchFile;
use super::TempFileManager;

/// Creates exclusively-named temp files that disappear when the returned
/// guard drops, whichever way the caller exits.
#[derive(Debug, Default)]
pub struct TempFiles;

impl TempFileManager for TempFiles {
    fn create(&self, prefix: &str, suffix: &str, content: &str) -> Result<ScratchFile, io::Error> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let path = file.path().to_path_buf();
        Ok(ScratchFile { path, _guard: file })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn content_is_written_and_released_on_drop() {
        let manager = TempFiles;
        let path: PathBuf;
        {
            let scratch = manager.create("klack-", ".sh", "echo hi\n").unwrap();
            path = scratch.path().to_path_buf();
            let read_back = std::fs::read_to_string(&path).unwrap();
            assert_eq!(read_back, "echo hi\n");
        }
        assert!(!path.exists());
    }

    #[test]
    fn names_carry_prefix_and_suffix() {
        let manager = TempFiles;
        let scratch = manager.create("klack-", ".sh", "").unwrap();
        let name = scratch.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("klack-"));
        assert!(name.ends_with(".sh"));
    }
}
