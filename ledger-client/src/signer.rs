use hex::FromHex;
use ledger_core::Signatory;
use snafu::ResultExt;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::*;

/// Loads a hex encoded Ed25519 private key from a file.
///
/// The file may hold a raw 32 byte seed or its PKCS#8 DER encoding, with or
/// without a `0x` prefix.
pub async fn load_ed25519_key(file_path: &str) -> Result<Signatory> {
    let mut file = File::open(file_path).await.context(KeyFileReadSnafu {
        path: file_path.to_string(),
    })?;

    let mut hex_string = String::new();
    file.read_to_string(&mut hex_string)
        .await
        .context(KeyFileReadSnafu {
            path: file_path.to_string(),
        })?;

    let trimmed = hex_string.trim();
    let key_bytes = Vec::from_hex(trimmed.strip_prefix("0x").unwrap_or(trimmed)).context(KeyParseSnafu)?;

    Signatory::from_private_key(&key_bytes).context(KeySnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_key(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("ledger-client-{}-{name}", std::process::id()));
        tokio::fs::write(&path, contents).await.unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn we_can_load_raw_and_der_key_files() {
        let raw = write_key("raw", &format!("{}\n", hex::encode([9u8; 32]))).await;
        let der = write_key(
            "der",
            &format!("0x302e020100300506032b657004220420{}", hex::encode([9u8; 32])),
        )
        .await;

        let from_raw = load_ed25519_key(&raw).await.unwrap();
        let from_der = load_ed25519_key(&der).await.unwrap();

        assert_eq!(from_raw, from_der);
    }

    #[tokio::test]
    async fn we_cannot_load_a_missing_file() {
        let err = load_ed25519_key("/nonexistent/ledger.key").await.unwrap_err();
        assert!(matches!(err, Error::KeyFileRead { .. }));
    }

    #[tokio::test]
    async fn we_cannot_load_non_hex_or_short_keys() {
        let not_hex = write_key("not-hex", "not a key").await;
        let short = write_key("short", &hex::encode([1u8; 16])).await;

        assert!(matches!(
            load_ed25519_key(&not_hex).await.unwrap_err(),
            Error::KeyParse { .. }
        ));
        assert!(matches!(
            load_ed25519_key(&short).await.unwrap_err(),
            Error::Key { .. }
        ));
    }
}
