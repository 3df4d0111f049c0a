use std::path::Path;

use crate::error::ImageError;

/// Default flash slot size padded images are stretched to.
pub const DEFAULT_TARGET_SIZE: usize = 0x10000;

/// Outcome of a padding run.
#[derive(Debug, Clone, Copy)]
pub struct PadOutcome {
    pub original_size: usize,
    pub target_size: usize,
    pub bytes_added: usize,
}

/// Appends `0xFF` bytes to `path` until it reaches `target_size`. Refuses to
/// truncate: if the file is already larger than `target_size`, this is an
/// error rather than a silent no-op.
pub fn pad_to_size(path: &Path, target_size: usize) -> Result<PadOutcome, ImageError> {
    let mut bytes = std::fs::read(path)?;
    let original_size = bytes.len();

    if original_size > target_size {
        return Err(ImageError::WouldTruncate {
            current: original_size,
            target: target_size,
        });
    }

    if original_size == target_size {
        return Ok(PadOutcome {
            original_size,
            target_size,
            bytes_added: 0,
        });
    }

    bytes.resize(target_size, 0xFF);
    std::fs::write(path, &bytes)?;

    Ok(PadOutcome {
        original_size,
        target_size,
        bytes_added: target_size - original_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn pads_with_0xff_to_target_size() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0x01, 0x02, 0x03]).unwrap();

        let outcome = pad_to_size(file.path(), 16).unwrap();
        assert_eq!(outcome.bytes_added, 13);

        let padded = std::fs::read(file.path()).unwrap();
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[0..3], &[0x01, 0x02, 0x03]);
        assert!(padded[3..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn refuses_to_truncate() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 32]).unwrap();

        let err = pad_to_size(file.path(), 16).unwrap_err();
        assert!(matches!(
            err,
            ImageError::WouldTruncate { current: 32, target: 16 }
        ));
    }

    #[test]
    fn already_at_target_size_is_a_no_op() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 16]).unwrap();

        let outcome = pad_to_size(file.path(), 16).unwrap();
        assert_eq!(outcome.bytes_added, 0);
    }
}
