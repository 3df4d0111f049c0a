use std::path::{Path, PathBuf};

use aes::Aes128;
use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use bootctl_protocol::CRC32_MPEG2;

use crate::error::ImageError;

/// Offset of the application region. Everything before this is the
/// bootloader's fixed 2 KiB header slot.
pub const APPLICATION_START_OFFSET: usize = 0x800;

/// CBC-MAC / CRC stamping uses a fixed key and a zero IV — this is a
/// provisioning-time integrity check against transmission corruption and
/// accidental flashing of the wrong image, not a confidentiality boundary.
const SIGNING_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];
const ZERO_IV: [u8; 16] = [0u8; 16];

const FW_VERSION_RANGE: std::ops::Range<usize> = 0x00..0x04;
const FW_INFO_RANGE: std::ops::Range<usize> = 0x00..0x10;
const FW_APP_SIZE_RANGE: std::ops::Range<usize> = 0x0C..0x10;
const FW_SIGNATURE_RANGE: std::ops::Range<usize> = 0x10..0x20;
const FW_CRC_RANGE: std::ops::Range<usize> = 0x20..0x24;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// Result of signing an image in place.
#[derive(Debug, Clone, Copy)]
pub struct SignOutcome {
    pub app_size: u32,
    pub signature: [u8; 16],
    pub app_crc: u32,
}

/// Signs `path` in place: stamps `app_size`, computes an AES-128-CBC-MAC
/// tag over `[header_info | application]`, stamps a CRC-32/MPEG-2 over the
/// application region, and writes the enriched image back to `path`.
///
/// When `keep_intermediates` is set, `app_to_sign.bin` and
/// `app_encrypted.bin` are written alongside `path` for parity with the
/// reference tool's on-disk artifacts — the signature itself is always
/// computed in memory, never by shelling out.
pub fn sign_in_place(path: &Path, keep_intermediates: bool) -> Result<SignOutcome, ImageError> {
    let mut image = std::fs::read(path)?;

    if image.len() < APPLICATION_START_OFFSET {
        return Err(ImageError::TooShort(image.len()));
    }

    let app_len = image.len() - APPLICATION_START_OFFSET;
    if app_len % 16 != 0 {
        return Err(ImageError::UnalignedApplication(app_len));
    }

    image[FW_APP_SIZE_RANGE].copy_from_slice(&(app_len as u32).to_le_bytes());

    let mut bytes_to_sign = Vec::with_capacity(16 + app_len);
    bytes_to_sign.extend_from_slice(&image[FW_INFO_RANGE]);
    bytes_to_sign.extend_from_slice(&image[APPLICATION_START_OFFSET..]);

    if keep_intermediates {
        std::fs::write(sibling(path, "app_to_sign.bin"), &bytes_to_sign)?;
    }

    let ciphertext = Aes128CbcEnc::new(&SIGNING_KEY.into(), &ZERO_IV.into())
        .encrypt_padded_vec_mut::<NoPadding>(&bytes_to_sign);

    if keep_intermediates {
        std::fs::write(sibling(path, "app_encrypted.bin"), &ciphertext)?;
    }

    let signature: [u8; 16] = ciphertext[ciphertext.len() - 16..]
        .try_into()
        .expect("ciphertext is at least one AES block");
    image[FW_SIGNATURE_RANGE].copy_from_slice(&signature);

    let app_crc = {
        let mut digest = CRC32_MPEG2.digest();
        digest.update(&image[APPLICATION_START_OFFSET..]);
        digest.finalize()
    };
    image[FW_CRC_RANGE].copy_from_slice(&app_crc.to_le_bytes());

    std::fs::write(path, &image)?;

    Ok(SignOutcome {
        app_size: app_len as u32,
        signature,
        app_crc,
    })
}

/// Reads the `fw_version` field (offset `0x00..0x04`) without signing.
pub fn read_fw_version(path: &Path) -> Result<[u8; 4], ImageError> {
    let image = std::fs::read(path)?;
    if image.len() < APPLICATION_START_OFFSET {
        return Err(ImageError::TooShort(image.len()));
    }
    Ok(image[FW_VERSION_RANGE].try_into().expect("slice is 4 bytes"))
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn image_with_app(app_len: usize) -> Vec<u8> {
        let mut image = vec![0u8; APPLICATION_START_OFFSET + app_len];
        // sentinel bytes so we can tell header survives untouched elsewhere
        image[0x2C..0x30].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        for (i, byte) in image[APPLICATION_START_OFFSET..].iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        image
    }

    #[test]
    fn rejects_images_shorter_than_header() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 0x100]).unwrap();

        let err = sign_in_place(file.path(), false).unwrap_err();
        assert!(matches!(err, ImageError::TooShort(0x100)));
    }

    #[test]
    fn rejects_unaligned_application_region() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), image_with_app(17)).unwrap();

        let err = sign_in_place(file.path(), false).unwrap_err();
        assert!(matches!(err, ImageError::UnalignedApplication(17)));
    }

    #[test]
    fn stamps_app_size_signature_and_crc() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), image_with_app(64)).unwrap();

        let outcome = sign_in_place(file.path(), false).unwrap();
        assert_eq!(outcome.app_size, 64);

        let signed = std::fs::read(file.path()).unwrap();
        assert_eq!(&signed[FW_APP_SIZE_RANGE], &64u32.to_le_bytes());
        assert_eq!(&signed[FW_SIGNATURE_RANGE], &outcome.signature);
        assert_eq!(&signed[FW_CRC_RANGE], &outcome.app_crc.to_le_bytes());
        // sentinel field outside the stamped ranges is untouched
        assert_eq!(&signed[0x2C..0x30], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn crc_matches_direct_computation_over_application_region() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), image_with_app(32)).unwrap();

        let outcome = sign_in_place(file.path(), false).unwrap();

        let signed = std::fs::read(file.path()).unwrap();
        let mut digest = CRC32_MPEG2.digest();
        digest.update(&signed[APPLICATION_START_OFFSET..]);
        assert_eq!(outcome.app_crc, digest.finalize());
    }

    #[test]
    fn signing_twice_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), image_with_app(48)).unwrap();

        sign_in_place(file.path(), false).unwrap();
        let once = std::fs::read(file.path()).unwrap();

        sign_in_place(file.path(), false).unwrap();
        let twice = std::fs::read(file.path()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn aes128_cbc_matches_fips_197_known_answer_test() {
        // FIPS-197 Appendix B worked example uses the same 16 bytes we use
        // as `SIGNING_KEY`. With a zero IV, encrypting a single block under
        // CBC reduces to plain ECB encryption of that block, so this is a
        // byte-for-byte conformance check of our AES-128 wiring against a
        // published known-answer vector, independent of the device/tool.
        let plaintext: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let expected_ciphertext: [u8; 16] = [
            0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4,
            0x55, 0x5A,
        ];

        let ciphertext = Aes128CbcEnc::new(&SIGNING_KEY.into(), &ZERO_IV.into())
            .encrypt_padded_vec_mut::<NoPadding>(&plaintext);

        assert_eq!(ciphertext, expected_ciphertext);
    }

    #[test]
    fn keep_intermediates_writes_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        let bin_path = dir.path().join("app.bin");
        std::fs::write(&bin_path, image_with_app(16)).unwrap();

        sign_in_place(&bin_path, true).unwrap();

        assert!(dir.path().join("app_to_sign.bin").exists());
        assert!(dir.path().join("app_encrypted.bin").exists());
    }
}
