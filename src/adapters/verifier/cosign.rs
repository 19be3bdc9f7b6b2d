//! Verifier backed by the `cosign` command line tool.
//!
//! Runs `cosign verify --key <pem> <image>` per image. Key material comes
//! either from inline PEM (written to a private temp file for the lifetime of
//! the verifier) or from a key file path. Both are checked when the verifier
//! is built, so a missing key fails at startup instead of on every scan.
//!
//! Verification always runs against the transparency log first. With
//! `ignore_tlog` set, a failure that reports the log itself as unreachable is
//! retried once with `--insecure-ignore-tlog=true`; a rejection from a healthy
//! log stands.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::domain::models::VerifierConfig;
use crate::domain::ports::{ImageVerifier, VerificationError};

use super::screen_reference;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";
const IGNORE_TLOG_FLAG: &str = "--insecure-ignore-tlog=true";

/// Stderr fragments cosign prints when the log cannot be reached or its keys
/// cannot be loaded.
const LOG_UNAVAILABLE_MARKERS: [&str; 9] = [
    "public key",
    "unavailable",
    "timeout",
    "timed out",
    "connection refused",
    "no such host",
    "dial tcp",
    "unreachable",
    "503",
];

#[derive(Debug)]
enum KeySource {
    /// Inline PEM materialized on disk.
    Inline(NamedTempFile),
    File(PathBuf),
}

impl KeySource {
    fn path(&self) -> &Path {
        match self {
            Self::Inline(file) => file.path(),
            Self::File(path) => path,
        }
    }
}

#[derive(Debug)]
pub struct CosignVerifier {
    binary: PathBuf,
    key: KeySource,
    ignore_tlog: bool,
}

impl CosignVerifier {
    /// Build a verifier from configuration.
    ///
    /// Inline PEM wins over the key path.
    pub fn from_config(config: &VerifierConfig) -> Result<Self, VerificationError> {
        let inline = config
            .public_key_pem
            .as_deref()
            .map(str::trim)
            .filter(|pem| !pem.is_empty());

        let key = match inline {
            Some(pem) => KeySource::Inline(materialize_pem(pem)?),
            None => {
                let path = config.public_key_path.clone();
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    VerificationError::KeyMaterial(format!(
                        "no inline public key configured and failed to read {}: {e}",
                        path.display()
                    ))
                })?;
                check_pem(&contents)?;
                KeySource::File(path)
            }
        };

        if config.ignore_tlog {
            tracing::warn!("transparency log may be skipped when it is unavailable");
        }

        Ok(Self {
            binary: PathBuf::from(&config.cosign_binary),
            key,
            ignore_tlog: config.ignore_tlog,
        })
    }

    /// Path of the public key handed to cosign.
    pub fn key_path(&self) -> &Path {
        self.key.path()
    }

    fn args(&self, reference: &str, skip_tlog: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["verify".into(), "--key".into(), self.key.path().into()];
        if skip_tlog {
            args.push(IGNORE_TLOG_FLAG.into());
        }
        args.push(reference.into());
        args
    }

    async fn run(&self, reference: &str, skip_tlog: bool) -> Result<std::process::Output, VerificationError> {
        // Dropping the future (scanner timeout) kills the child.
        Command::new(&self.binary)
            .args(self.args(reference, skip_tlog))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VerificationError::Backend(format!("failed to run {}: {e}", self.binary.display())))
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("cosign exited with a failure status")
        .to_string()
}

/// True when stderr blames the transparency log being unreachable rather than
/// the image missing from it.
fn log_unavailable(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    let mentions_log = lowered.contains("rekor") || lowered.contains("tlog") || lowered.contains("transparency log");
    mentions_log && LOG_UNAVAILABLE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn classify_failure(reference: &str, stderr: &str) -> VerificationError {
    let reason = last_line(stderr);
    if log_unavailable(stderr) {
        return VerificationError::TransparencyLog(reason);
    }
    VerificationError::SignatureInvalid {
        reference: reference.to_string(),
        reason,
    }
}

/// Checks the PEM armor and that the body decodes.
fn check_pem(pem: &str) -> Result<(), VerificationError> {
    let body = pem
        .trim()
        .strip_prefix(PEM_BEGIN)
        .and_then(|rest| rest.strip_suffix(PEM_END))
        .ok_or_else(|| VerificationError::KeyMaterial("public key is not a PEM encoded PUBLIC KEY block".to_string()))?;
    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| VerificationError::KeyMaterial(format!("public key PEM body is not base64: {e}")))?;
    if der.is_empty() {
        return Err(VerificationError::KeyMaterial("public key PEM body is empty".to_string()));
    }
    Ok(())
}

fn materialize_pem(pem: &str) -> Result<NamedTempFile, VerificationError> {
    check_pem(pem)?;
    let mut file = tempfile::Builder::new()
        .prefix("cosign-pub-")
        .suffix(".pem")
        .tempfile()
        .map_err(|e| VerificationError::KeyMaterial(format!("create temp file for public key: {e}")))?;
    writeln!(file, "{pem}")
        .and_then(|()| file.flush())
        .map_err(|e| VerificationError::KeyMaterial(format!("write public key to temp file: {e}")))?;
    Ok(file)
}

#[async_trait]
impl ImageVerifier for CosignVerifier {
    async fn verify(&self, image: &str) -> Result<(), VerificationError> {
        let reference = screen_reference(image)?;

        let output = self.run(reference, false).await?;
        if output.status.success() {
            tracing::debug!(image = %reference, "signature verified");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !(self.ignore_tlog && log_unavailable(&stderr)) {
            return Err(classify_failure(reference, &stderr));
        }

        tracing::warn!(
            image = %reference,
            reason = %last_line(&stderr),
            "transparency log unavailable; verifying without it"
        );
        let retry = self.run(reference, true).await?;
        if retry.status.success() {
            tracing::debug!(image = %reference, "signature verified without transparency log");
            return Ok(());
        }
        Err(classify_failure(reference, &String::from_utf8_lossy(&retry.stderr)))
    }

    fn name(&self) -> &'static str {
        "cosign"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PEM: &str = "-----BEGIN PUBLIC KEY-----\nMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEezOmY7XnXS5KsldMiVyxNu4L9qAEgqD28kLPRcS+PxHFOvfPp9c2hzW5H+3Ief7mQU+oM3cHHbEq3lVaA2EcGg==\n-----END PUBLIC KEY-----";

    fn config_with_pem(pem: &str) -> VerifierConfig {
        VerifierConfig {
            public_key_pem: Some(pem.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_pem_is_materialized() {
        let verifier = CosignVerifier::from_config(&config_with_pem(TEST_PEM)).unwrap();
        let written = std::fs::read_to_string(verifier.key_path()).unwrap();
        assert_eq!(written.trim(), TEST_PEM);
    }

    #[test]
    fn test_missing_key_fails_closed() {
        let config = VerifierConfig {
            public_key_pem: None,
            public_key_path: "/nonexistent/cosign.pub".into(),
            ..Default::default()
        };
        assert!(matches!(
            CosignVerifier::from_config(&config),
            Err(VerificationError::KeyMaterial(_))
        ));
    }

    #[test]
    fn test_garbage_pem_is_rejected() {
        assert!(CosignVerifier::from_config(&config_with_pem("not a key")).is_err());
        let placeholder = "-----BEGIN PUBLIC KEY-----\n use an env var, not a hardcoded key. \n-----END PUBLIC KEY-----";
        assert!(CosignVerifier::from_config(&config_with_pem(placeholder)).is_err());
    }

    #[test]
    fn test_key_file_is_accepted() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{TEST_PEM}").unwrap();
        let config = VerifierConfig {
            public_key_pem: Some("   ".to_string()),
            public_key_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let verifier = CosignVerifier::from_config(&config).unwrap();
        assert_eq!(verifier.key_path(), file.path());
    }

    #[test]
    fn test_pem_body_must_decode() {
        let bad_padding = "-----BEGIN PUBLIC KEY-----\nMFkwEwYH\nabc\n-----END PUBLIC KEY-----";
        assert!(matches!(check_pem(bad_padding), Err(VerificationError::KeyMaterial(_))));
        let empty = "-----BEGIN PUBLIC KEY-----\n\n-----END PUBLIC KEY-----";
        assert!(matches!(check_pem(empty), Err(VerificationError::KeyMaterial(_))));
        assert!(check_pem(&format!("\n  {TEST_PEM}\n")).is_ok());
    }

    #[test]
    fn test_args_carry_tlog_flag_only_on_fallback() {
        let config = VerifierConfig {
            ignore_tlog: true,
            ..config_with_pem(TEST_PEM)
        };
        let verifier = CosignVerifier::from_config(&config).unwrap();
        assert!(!verifier.args("nginx:1", false).iter().any(|a| a == IGNORE_TLOG_FLAG));

        let args = verifier.args("nginx:1", true);
        assert_eq!(args[0], "verify");
        assert_eq!(args[1], "--key");
        assert!(args.iter().any(|a| a == IGNORE_TLOG_FLAG));
        assert_eq!(args.last().unwrap(), "nginx:1");
    }

    #[test]
    fn test_classify_tlog_failures() {
        let err = classify_failure("nginx:1", "Error: getting Rekor public keys: timeout\n");
        assert!(matches!(err, VerificationError::TransparencyLog(_)));

        let err = classify_failure("nginx:1", "Error: no matching tlog entry found\n");
        assert!(matches!(err, VerificationError::SignatureInvalid { .. }));

        let err = classify_failure("nginx:1", "Error: no matching signatures\n");
        assert!(matches!(err, VerificationError::SignatureInvalid { .. }));
    }

    #[tokio::test]
    async fn test_screening_happens_before_spawn() {
        let config = VerifierConfig {
            cosign_binary: "/nonexistent/cosign".to_string(),
            ..config_with_pem(TEST_PEM)
        };
        let verifier = CosignVerifier::from_config(&config).unwrap();
        assert!(matches!(verifier.verify("").await, Err(VerificationError::EmptyReference)));
        assert!(matches!(
            verifier.verify("nginx:1").await,
            Err(VerificationError::Backend(_))
        ));
    }

    /// Writes a fake `cosign` that records its arguments, succeeds when
    /// `succeed_when` matches them and otherwise prints `error` and fails.
    #[cfg(unix)]
    fn fake_cosign(dir: &Path, succeed_when: &str, error: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("cosign");
        let body = format!(
            "#!/bin/sh\necho \"$*\" >> \"$(dirname \"$0\")/calls\"\ncase \"$*\" in\n  {succeed_when}) exit 0 ;;\nesac\necho '{error}' >&2\nexit 1\n"
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    fn verifier_for(script: &Path, ignore_tlog: bool) -> CosignVerifier {
        let config = VerifierConfig {
            cosign_binary: script.display().to_string(),
            ignore_tlog,
            ..config_with_pem(TEST_PEM)
        };
        CosignVerifier::from_config(&config).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_cosign(dir.path(), "*signed*", "Error: no matching signatures");
        let verifier = verifier_for(&script, false);

        assert!(verifier.verify("ghcr.io/acme/signed:1").await.is_ok());
        let err = verifier.verify("ghcr.io/acme/rogue:1").await.unwrap_err();
        assert!(err.to_string().contains("no matching signatures"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_healthy_log_rejection_is_not_retried_without_log() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_cosign(dir.path(), "*--insecure-ignore-tlog=true*", "Error: no matching tlog entry found");
        let verifier = verifier_for(&script, true);

        let err = verifier.verify("ghcr.io/acme/untracked:1").await.unwrap_err();

        assert!(matches!(err, VerificationError::SignatureInvalid { .. }));
        let calls = calls(dir.path());
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].contains(IGNORE_TLOG_FLAG));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unavailable_log_falls_back_only_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_cosign(
            dir.path(),
            "*--insecure-ignore-tlog=true*",
            "Error: getting Rekor public keys: dial tcp: connection refused",
        );

        let strict = verifier_for(&script, false);
        let err = strict.verify("ghcr.io/acme/web:1").await.unwrap_err();
        assert!(matches!(err, VerificationError::TransparencyLog(_)));
        assert_eq!(calls(dir.path()).len(), 1);

        let lenient = verifier_for(&script, true);
        assert!(lenient.verify("ghcr.io/acme/web:1").await.is_ok());
        let calls = calls(dir.path());
        assert_eq!(calls.len(), 3);
        assert!(!calls[1].contains(IGNORE_TLOG_FLAG));
        assert!(calls[2].contains(IGNORE_TLOG_FLAG));
    }
}
