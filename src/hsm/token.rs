//! # PKCS#11 Token Adapter
//!
//! Drives a hardware (or SoftHSM) token through `pkcs11-tool` and the
//! OpenSSL `pkcs11` engine.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────┐  initialize_token   ┌─────────────────┐
//! │  Uninitialized  │ ──────────────────► │   Initialized   │
//! └─────────────────┘   (no-op if set)    └────────┬────────┘
//!                                                  │
//!                          objects on the token:   ▼
//!                    ┌──────────┐   add_key   ┌──────────┐
//!                    │  Absent  │ ──────────► │ Present  │
//!                    │          │ ◄────────── │          │
//!                    └──────────┘ delete_obj  └──────────┘
//! ```
//!
//! ## Invocations
//!
//! | Operation | Command |
//! |-----------|---------|
//! | list slots | `pkcs11-tool --module M -L` |
//! | list objects | `pkcs11-tool --module M --token-label L --login --pin P -O` |
//! | init token | `pkcs11-tool --module M --init-token --init-pin --slot S --label L --so-pin SO --pin P` |
//! | add key | `pkcs11-tool ... --keypairgen --key-type T --label OBJ --usage-sign` |
//! | delete | `pkcs11-tool ... --delete-object --type T --label OBJ` |
//! | encrypt / decrypt | `openssl pkeyutl -engine pkcs11 -keyform engine ...` |
//! | sign / verify | `openssl dgst -engine pkcs11 -keyform engine -sha384 ...` |
//!
//! Every parameter is validated before a command line is built, so a bad
//! request never reaches the token. Failed invocations surface as
//! `ExternalTool` errors carrying the tool's output and are never retried.
//!
//! ## Concurrency
//!
//! Nothing here serializes access to the device. Callers running operations
//! concurrently must serialize them per slot themselves.

use std::path::Path;
use std::sync::Arc;

use super::parser::{parse_objects, parse_slots};
use super::runner::{ProcessCommand, ProcessOutput, ProcessRunner, SystemRunner};
use super::types::{HsmKeyType, ObjectType, Token, TokenObject};
use super::uri::{Pkcs11Uri, UriKeyType};
use crate::config::HsmConfig;
use crate::error::{Error, Result};

/// Marker printed by `openssl dgst -verify` on success
const VERIFIED_OK: &str = "Verified OK";

/// Marker printed by `openssl dgst -verify` for a bad signature
const VERIFICATION_FAILURE: &str = "Verification failure";

/// Environment variable read by the OpenSSL pkcs11 engine
const ENGINE_MODULE_ENV: &str = "PKCS11_MODULE_PATH";

/// Handle to the token adapter
#[derive(Clone)]
pub struct Pkcs11Token {
    config: HsmConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl Pkcs11Token {
    /// Create an adapter that runs the real tools
    pub fn new(config: HsmConfig) -> Self {
        let runner = Arc::new(SystemRunner::new(config.timeout));
        Self { config, runner }
    }

    /// Create an adapter with a custom process runner
    pub fn with_runner(config: HsmConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// The adapter's configuration
    pub fn config(&self) -> &HsmConfig {
        &self.config
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    /// List every slot the module exposes
    pub async fn list_token_slots(&self) -> Result<Vec<Token>> {
        let output = self.run_checked(self.tool().arg("-L")).await?;
        let tokens = parse_slots(&output.stdout);
        tracing::debug!(count = tokens.len(), "Listed token slots");
        Ok(tokens)
    }

    /// Find the slot holding the token labelled `label`
    pub async fn find_token(&self, label: &str) -> Result<Token> {
        require("label", label)?;
        self.list_token_slots()
            .await?
            .into_iter()
            .find(|t| t.label == label)
            .ok_or_else(|| Error::TokenNotFound(label.to_string()))
    }

    /// True if a token labelled `label` reports itself as initialized
    pub async fn is_token_set(&self, label: &str) -> Result<bool> {
        require("label", label)?;
        Ok(self
            .list_token_slots()
            .await?
            .iter()
            .any(|t| t.label == label && t.is_initialized()))
    }

    /// Initialize the configured slot as token `label`.
    ///
    /// Does nothing if a token with this label is already initialized.
    pub async fn initialize_token(&self, label: &str) -> Result<()> {
        require("label", label)?;
        require("slot_id", &self.config.slot_id)?;
        require("so_pin", &self.config.so_pin)?;
        require("user_pin", &self.config.user_pin)?;

        if self.is_token_set(label).await? {
            tracing::info!(label, "Token already initialized");
            return Ok(());
        }

        let command = self.tool().args([
            "--init-token",
            "--init-pin",
            "--slot",
            self.config.slot_id.as_str(),
            "--label",
            label,
            "--so-pin",
            self.config.so_pin.as_str(),
            "--pin",
            self.config.user_pin.as_str(),
        ]);
        self.run_checked(command).await?;

        tracing::info!(label, slot = %self.config.slot_id, "Token initialized");
        Ok(())
    }

    // ========================================================================
    // OBJECTS
    // ========================================================================

    /// List the objects on token `label`
    pub async fn list_objects(&self, label: &str) -> Result<Vec<TokenObject>> {
        require("label", label)?;
        let command = self.logged_in(label)?.arg("-O");
        let output = self.run_checked(command).await?;
        Ok(parse_objects(&output.stdout))
    }

    /// Generate a key pair `object_label` on token `label`.
    ///
    /// `key_type` is `RSA` (2048/3072/4096) or `EC` (256/384/521).
    pub async fn add_key(
        &self,
        label: &str,
        object_label: &str,
        key_type: &str,
        key_size: u32,
    ) -> Result<()> {
        require("label", label)?;
        require("object_label", object_label)?;
        require("key_type", key_type)?;

        let key_type: HsmKeyType = key_type.parse()?;
        let spec = key_type.keygen_spec(key_size)?;

        let mut command = self.logged_in(label)?.args([
            "--keypairgen",
            "--key-type",
            spec.as_str(),
            "--label",
            object_label,
            "--usage-sign",
        ]);
        if key_type == HsmKeyType::Rsa {
            command = command.arg("--usage-decrypt");
        }
        self.run_checked(command).await?;

        tracing::info!(label, object_label, key_type = %spec, "Key pair generated on token");
        Ok(())
    }

    /// Delete object `object_label` of `object_type` from token `label`.
    ///
    /// `object_type` must be one of `privkey`, `pubkey`, `secrkey`, `cert`,
    /// `data`.
    pub async fn delete_object(
        &self,
        label: &str,
        object_type: &str,
        object_label: &str,
    ) -> Result<()> {
        require("label", label)?;
        require("object_type", object_type)?;
        require("object_label", object_label)?;
        let object_type: ObjectType = object_type.parse()?;

        let command = self.logged_in(label)?.args([
            "--delete-object",
            "--type",
            object_type.as_str(),
            "--label",
            object_label,
        ]);
        self.run_checked(command).await?;

        tracing::info!(label, object_label, object_type = %object_type, "Token object deleted");
        Ok(())
    }

    // ========================================================================
    // CRYPTO
    // ========================================================================

    /// RSA-encrypt `input` to `output` with the public key `object_label`
    pub async fn encrypt(
        &self,
        label: &str,
        object_label: &str,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        self.pkeyutl(label, object_label, UriKeyType::Public, input, output)
            .await
    }

    /// RSA-decrypt `input` to `output` with the private key `object_label`
    pub async fn decrypt(
        &self,
        label: &str,
        object_label: &str,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        self.pkeyutl(label, object_label, UriKeyType::Private, input, output)
            .await
    }

    async fn pkeyutl(
        &self,
        label: &str,
        object_label: &str,
        key_type: UriKeyType,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        require("label", label)?;
        require("object_label", object_label)?;
        require_file(input)?;
        require_path("output", output)?;

        let uri = self.uri(label, object_label, key_type);
        let mut command = self.openssl().arg("pkeyutl").args(self.engine_args());
        command = match key_type {
            UriKeyType::Public => command.args(["-pubin", "-encrypt"]),
            UriKeyType::Private => command.arg("-decrypt"),
        };
        let command = command
            .args(["-inkey", uri.as_str()])
            .args(["-pkeyopt", "rsa_padding_mode:pkcs1"])
            .args(["-in".to_string(), path_arg(input), "-out".to_string(), path_arg(output)]);
        self.run_checked(command).await?;

        let operation = match key_type {
            UriKeyType::Public => "encrypt",
            UriKeyType::Private => "decrypt",
        };
        tracing::info!(label, object_label, operation, "Token RSA operation complete");
        Ok(())
    }

    /// Sign `input` with the private key `object_label`, writing the
    /// signature to `signature`.
    ///
    /// RSA keys use PSS padding; both RSA and EC hash with SHA-384.
    pub async fn sign(
        &self,
        label: &str,
        object_label: &str,
        key_type: &str,
        input: &Path,
        signature: &Path,
    ) -> Result<()> {
        require("label", label)?;
        require("object_label", object_label)?;
        require("key_type", key_type)?;
        let key_type: HsmKeyType = key_type.parse()?;
        require_file(input)?;
        require_path("signature", signature)?;

        let uri = self.uri(label, object_label, UriKeyType::Private);
        let command = self
            .dgst(key_type)
            .args(["-sign", uri.as_str()])
            .args(["-out".to_string(), path_arg(signature), path_arg(input)]);
        self.run_checked(command).await?;

        tracing::info!(label, object_label, "Signed with token key");
        Ok(())
    }

    /// Verify `signature` over `input` with the public key `object_label`.
    ///
    /// Returns `false` when OpenSSL reports a bad signature. Any other
    /// failure of the tool is an `ExternalTool` error.
    pub async fn verify(
        &self,
        label: &str,
        object_label: &str,
        key_type: &str,
        input: &Path,
        signature: &Path,
    ) -> Result<bool> {
        require("label", label)?;
        require("object_label", object_label)?;
        require("key_type", key_type)?;
        let key_type: HsmKeyType = key_type.parse()?;
        require_file(input)?;
        require_file(signature)?;

        let uri = self.uri(label, object_label, UriKeyType::Public);
        let command = self
            .dgst(key_type)
            .args(["-verify", uri.as_str()])
            .args(["-signature".to_string(), path_arg(signature), path_arg(input)]);

        let display = command.display();
        let output = self.runner.run(&command).await?;
        let text = output.combined();

        if text.contains(VERIFIED_OK) {
            return Ok(true);
        }
        if text.contains(VERIFICATION_FAILURE) {
            tracing::info!(label, object_label, "Token signature did not verify");
            return Ok(false);
        }
        if !output.success() {
            return Err(tool_error(display, &output));
        }
        Ok(false)
    }

    // ========================================================================
    // COMMAND BUILDING
    // ========================================================================

    fn tool(&self) -> ProcessCommand {
        ProcessCommand::new(&self.config.tool)
            .args(["--module".to_string(), path_arg(&self.config.module_path)])
    }

    fn logged_in(&self, label: &str) -> Result<ProcessCommand> {
        require("user_pin", &self.config.user_pin)?;
        Ok(self
            .tool()
            .args(["--token-label", label, "--login", "--pin", self.config.user_pin.as_str()]))
    }

    fn openssl(&self) -> ProcessCommand {
        ProcessCommand::new(&self.config.openssl)
            .env(ENGINE_MODULE_ENV, path_arg(&self.config.module_path))
    }

    fn engine_args(&self) -> [String; 4] {
        [
            "-engine".to_string(),
            self.config.engine.clone(),
            "-keyform".to_string(),
            "engine".to_string(),
        ]
    }

    fn dgst(&self, key_type: HsmKeyType) -> ProcessCommand {
        let command = self
            .openssl()
            .arg("dgst")
            .args(self.engine_args())
            .arg("-sha384");
        match key_type {
            HsmKeyType::Rsa => command.args(["-sigopt", "rsa_padding_mode:pss"]),
            HsmKeyType::Ec => command,
        }
    }

    fn uri(&self, label: &str, object_label: &str, key_type: UriKeyType) -> String {
        Pkcs11Uri::new(label, object_label, key_type)
            .with_pin(self.config.user_pin.as_str())
            .to_string()
    }

    async fn run_checked(&self, command: ProcessCommand) -> Result<ProcessOutput> {
        let output = self.runner.run(&command).await?;
        if !output.success() {
            let shown = command.display();
            tracing::error!(command = %shown, status = ?output.status, "Token tool failed");
            return Err(tool_error(shown, &output));
        }
        Ok(output)
    }
}

impl std::fmt::Debug for Pkcs11Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs11Token")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn tool_error(command: String, output: &ProcessOutput) -> Error {
    Error::ExternalTool {
        command,
        status: output.status,
        output: output.combined(),
    }
}

fn require(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::EmptyParameter(name));
    }
    Ok(())
}

fn require_path(name: &'static str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::EmptyParameter(name));
    }
    Ok(())
}

fn require_file(path: &Path) -> Result<()> {
    require_path("input", path)?;
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// TESTS
// ============================================================================
