//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use postproof_core::ProofError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Data format error (proof does not match, corrupt proof).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (calendar, block explorer, Solana RPC).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let proof_error = err.chain().find_map(|e| e.downcast_ref::<ProofError>());
        let code = match proof_error {
            Some(e) if e.is_integrity_failure() => VERIFICATION_FAILED,
            Some(e) if e.is_transient() => NETWORK_ERROR,
            Some(ProofError::Rejected(_)) => NETWORK_ERROR,
            _ if err.chain().any(|e| e.downcast_ref::<std::io::Error>().is_some()) => {
                if message.contains("Failed to write") {
                    IO_ERROR
                } else {
                    INPUT_ERROR
                }
            }
            _ if message.contains("Verification failed") => VERIFICATION_FAILED,
            _ if message.contains("Failed to read") => INPUT_ERROR,
            _ => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_mismatch_is_verification_failure() {
        let err = anyhow::Error::new(ProofError::Mismatch {
            expected: "a".into(),
            found: "b".into(),
        })
        .context("Verification failed");
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);
    }

    #[test]
    fn test_network_is_unavailable() {
        let err = anyhow::Error::new(ProofError::Network("calendar down".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, NETWORK_ERROR);
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = std::fs::read("/definitely/not/here")
            .context("Failed to read snapshot")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, INPUT_ERROR);
    }

    #[test]
    fn test_write_failure_is_io_error() {
        let err = std::fs::write("/definitely/not/here/out.ots", b"x")
            .context("Failed to write proof")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, IO_ERROR);
    }

    #[test]
    fn test_unknown_error_is_general() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(ExitCode::from_anyhow(&err).code, GENERAL_ERROR);
    }
}
