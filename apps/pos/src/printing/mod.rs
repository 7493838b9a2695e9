//! # Receipt Printing
//!
//! - [`escpos`] - ESC/POS byte builder with a text preview
//! - [`receipt`] - receipt layout at 32 or 48 columns
//!
//! Output goes to whatever path the printer is configured with: a device
//! node (`/dev/usb/lp0`), a serial port, or an ordinary file.

pub mod escpos;
pub mod receipt;

use std::path::Path;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub use receipt::{render, Receipt, ReceiptLine};

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Printer {device} unavailable: {source}")]
    Device {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// Appends `bytes` to the printer device.
pub async fn send_to_device(device: &Path, bytes: &[u8]) -> Result<(), PrinterError> {
    let err = |source| PrinterError::Device {
        device: device.display().to_string(),
        source,
    };

    let mut out = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(device)
        .await
        .map_err(err)?;
    out.write_all(bytes).await.map_err(err)?;
    out.flush().await.map_err(err)?;

    info!(device = %device.display(), bytes = bytes.len(), "Receipt sent to printer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_appends() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("lp0");
        send_to_device(&device, b"one").await.unwrap();
        send_to_device(&device, b"two").await.unwrap();
        assert_eq!(tokio::fs::read(&device).await.unwrap(), b"onetwo");
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("no-such-dir").join("lp0");
        let err = send_to_device(&device, b"x").await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }
}
