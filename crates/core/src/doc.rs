//! External document conversion.
//!
//! The e-reader document format is produced by an external converter tool
//! run over a finished page directory; the tool is treated as an opaque
//! subprocess with an exit-code contract.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::error::{Result, SatchelError};

/// Page file the converter reads.
pub const INDEX_FILE: &str = "index.html";
/// Document file the converter writes next to it.
pub const DOC_FILE: &str = "out.mobi";

/// Run the converter at `converter` over the page directory `dir`.
///
/// The tool signals warnings with exit status 1 and fatal errors with
/// anything higher; warnings still produce a usable document and are
/// tolerated.
pub async fn build_doc(converter: &Path, dir: &Path) -> Result<()> {
    let output = Command::new(converter)
        .current_dir(dir)
        .arg(INDEX_FILE)
        .arg("-o")
        .arg(DOC_FILE)
        .output()
        .await?;

    info!(
        converter = %converter.display(),
        status = ?output.status.code(),
        output = %String::from_utf8_lossy(&output.stdout),
        "converter finished"
    );

    match output.status.code() {
        Some(0) | Some(1) => Ok(()),
        status => Err(SatchelError::Converter { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_zero_and_warning_statuses_succeed() {
        let dir = tempfile::tempdir().unwrap();
        // `true` exits 0; `false` exits 1, which the converter contract
        // treats as warnings.
        assert!(build_doc(&PathBuf::from("true"), dir.path()).await.is_ok());
        assert!(build_doc(&PathBuf::from("false"), dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_converter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_doc(&PathBuf::from("/nonexistent/converter"), dir.path()).await;
        assert!(matches!(result, Err(SatchelError::Io(_))));
    }
}
