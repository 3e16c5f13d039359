//! CryptVault command line
//!
//! Thin wrapper over the library:
//!
//! 1. **aes / rsa / ec**: software key generation, encryption and
//!    signatures on local files.
//!
//! 2. **hsm**: token management and token-backed crypto through
//!    `pkcs11-tool` and the OpenSSL PKCS#11 engine.
//!
//! 3. **store**: vault-managed keys and blobs in the filesystem stores,
//!    with rollback on partial failure. Metadata is printed as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;

use cryptvault::crypto::{aes_cbc, ec, rsa_pkcs1, signature_file, EcCurve, EcSigner, RsaCipher};
use cryptvault::hsm::Pkcs11Token;
use cryptvault::metadata::{JsonMetadataStore, MetadataStore};
use cryptvault::storage::FileStore;
use cryptvault::{
    BlobInput, Error, HsmConfig, KeyAlgorithm, Result, StorageConfig, UploadOrchestrator,
    VaultConfig,
};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vault", version, about = "CryptVault key vault")]
struct Args {
    /// Blob store directory
    #[arg(long, global = true, default_value = "vault-data/blobs", env = "VAULT_BLOB_ROOT")]
    blob_root: PathBuf,

    /// Key-vault store directory
    #[arg(long, global = true, default_value = "vault-data/keys", env = "VAULT_KEY_ROOT")]
    key_root: PathBuf,

    /// Metadata file
    #[arg(
        long,
        global = true,
        default_value = "vault-data/metadata.json",
        env = "VAULT_METADATA"
    )]
    metadata: PathBuf,

    /// PKCS#11 module
    #[arg(
        long,
        global = true,
        default_value = cryptvault::config::DEFAULT_MODULE_PATH,
        env = "VAULT_HSM_MODULE"
    )]
    hsm_module: PathBuf,

    /// Slot used when initializing a token
    #[arg(long, global = true, default_value = "0", env = "VAULT_HSM_SLOT")]
    hsm_slot: String,

    /// Token user PIN
    #[arg(long, global = true, default_value = "", env = "VAULT_HSM_PIN", hide_env_values = true)]
    hsm_pin: String,

    /// Token security officer PIN
    #[arg(long, global = true, default_value = "", env = "VAULT_HSM_SO_PIN", hide_env_values = true)]
    hsm_so_pin: String,

    /// Deadline for each pkcs11-tool / openssl invocation, in seconds
    #[arg(long, global = true, default_value_t = 30, env = "VAULT_HSM_TIMEOUT_SECS")]
    hsm_timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "VAULT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn config(&self) -> VaultConfig {
        VaultConfig {
            storage: StorageConfig {
                blob_root: self.blob_root.clone(),
                key_root: self.key_root.clone(),
                metadata_path: self.metadata.clone(),
            },
            hsm: HsmConfig {
                module_path: self.hsm_module.clone(),
                slot_id: self.hsm_slot.clone(),
                user_pin: self.hsm_pin.clone(),
                so_pin: self.hsm_so_pin.clone(),
                timeout: Duration::from_secs(self.hsm_timeout_secs),
                ..HsmConfig::default()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// AES-CBC keys and file encryption
    #[command(subcommand)]
    Aes(AesCommand),
    /// RSA keys, PKCS#1 v1.5 encryption and signatures
    #[command(subcommand)]
    Rsa(RsaCommand),
    /// ECDSA keys and signatures
    #[command(subcommand)]
    Ec(EcCommand),
    /// PKCS#11 token operations
    #[command(subcommand)]
    Hsm(HsmCommand),
    /// Vault-managed keys and blobs
    #[command(subcommand)]
    Store(StoreCommand),
}

#[derive(Subcommand, Debug)]
enum AesCommand {
    /// Generate a raw key file
    GenerateKey {
        /// Key size in bits (128, 192, 256)
        #[arg(long, default_value_t = 256)]
        bits: u32,
        /// Output key file
        #[arg(long)]
        out: PathBuf,
    },
    /// Encrypt a file (output is IV followed by ciphertext)
    Encrypt(AesFiles),
    /// Decrypt a file produced by `encrypt`
    Decrypt(AesFiles),
}

#[derive(ClapArgs, Debug)]
struct AesFiles {
    /// Raw key file
    #[arg(long)]
    key: PathBuf,
    /// Input file
    #[arg(long = "in")]
    input: PathBuf,
    /// Output file
    #[arg(long = "out")]
    output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum RsaCommand {
    /// Generate a key pair as PEM files
    GenerateKey {
        /// Modulus size in bits
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        /// Private key output (PKCS#1 PEM)
        #[arg(long)]
        private_out: PathBuf,
        /// Public key output (SPKI PEM)
        #[arg(long)]
        public_out: PathBuf,
    },
    /// Encrypt a file with a public key
    Encrypt(KeyFiles),
    /// Decrypt a file with a private key
    Decrypt(KeyFiles),
    /// Sign a file with a private key (hex signature file)
    Sign(SignatureFiles),
    /// Verify a hex signature file with a public key
    Verify(SignatureFiles),
}

#[derive(ClapArgs, Debug)]
struct KeyFiles {
    /// PEM key file
    #[arg(long)]
    key: PathBuf,
    /// Input file
    #[arg(long = "in")]
    input: PathBuf,
    /// Output file
    #[arg(long = "out")]
    output: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct SignatureFiles {
    /// PEM key file
    #[arg(long)]
    key: PathBuf,
    /// Signed data
    #[arg(long = "in")]
    input: PathBuf,
    /// Hex signature file
    #[arg(long)]
    signature: PathBuf,
}

#[derive(Subcommand, Debug)]
enum EcCommand {
    /// Generate a key pair as PEM files
    GenerateKey {
        /// Curve: 224/256/384/521 or a name such as P-256
        #[arg(long, default_value = "P-256")]
        curve: EcCurve,
        /// Private key output
        #[arg(long)]
        private_out: PathBuf,
        /// Public key output
        #[arg(long)]
        public_out: PathBuf,
    },
    /// Sign a file with a private key (hex signature file)
    Sign(SignatureFiles),
    /// Verify a hex signature file with a public key
    Verify(SignatureFiles),
}

#[derive(Subcommand, Debug)]
enum HsmCommand {
    /// List slots and their tokens
    ListSlots,
    /// List objects on a token
    ListObjects {
        /// Token label
        #[arg(long)]
        label: String,
    },
    /// Initialize a token and its user PIN
    InitToken {
        /// Token label
        #[arg(long)]
        label: String,
    },
    /// Generate a key pair on a token
    AddKey {
        /// Token label
        #[arg(long)]
        label: String,
        /// Object label
        #[arg(long)]
        object: String,
        /// RSA or EC
        #[arg(long)]
        key_type: String,
        /// Key size in bits
        #[arg(long)]
        size: u32,
    },
    /// Delete an object from a token
    DeleteObject {
        /// Token label
        #[arg(long)]
        label: String,
        /// privkey, pubkey, secrkey, cert or data
        #[arg(long)]
        object_type: String,
        /// Object label
        #[arg(long)]
        object: String,
    },
    /// RSA-encrypt a file with a token public key
    Encrypt(TokenFiles),
    /// RSA-decrypt a file with a token private key
    Decrypt(TokenFiles),
    /// Sign a file with a token private key
    Sign(TokenSignature),
    /// Verify a signature with a token public key
    Verify(TokenSignature),
}

#[derive(ClapArgs, Debug)]
struct TokenFiles {
    /// Token label
    #[arg(long)]
    label: String,
    /// Object label
    #[arg(long)]
    object: String,
    /// Input file
    #[arg(long = "in")]
    input: PathBuf,
    /// Output file
    #[arg(long = "out")]
    output: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct TokenSignature {
    /// Token label
    #[arg(long)]
    label: String,
    /// Object label
    #[arg(long)]
    object: String,
    /// RSA or EC
    #[arg(long)]
    key_type: String,
    /// Signed data
    #[arg(long = "in")]
    input: PathBuf,
    /// Binary signature file
    #[arg(long)]
    signature: PathBuf,
}

#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Generate and store a key (AES) or key pair (RSA, EC)
    CreateKey {
        /// Owning user
        #[arg(long)]
        user: String,
        /// AES, RSA or EC
        #[arg(long)]
        algorithm: KeyAlgorithm,
        /// Key size in bits
        #[arg(long)]
        size: u32,
    },
    /// Upload files as one all-or-nothing batch
    Upload {
        /// Owning user
        #[arg(long)]
        user: String,
        /// Encrypt every file with this stored AES key first
        #[arg(long)]
        encrypt_with: Option<String>,
        /// Signing key to record with each blob
        #[arg(long)]
        sign_key: Option<String>,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download a blob
    Download {
        /// Blob id
        #[arg(long)]
        id: String,
        /// Decrypt with the key recorded for the blob
        #[arg(long)]
        decrypt: bool,
        /// Output file
        #[arg(long = "out")]
        output: PathBuf,
    },
    /// List a user's blobs
    ListBlobs {
        /// Owning user
        #[arg(long)]
        user: String,
    },
    /// Delete a blob
    DeleteBlob {
        /// Blob id
        #[arg(long)]
        id: String,
    },
    /// Write a stored key artifact to a file
    ExportKey {
        /// Key id
        #[arg(long)]
        id: String,
        /// Output file
        #[arg(long = "out")]
        output: PathBuf,
    },
    /// Delete a stored key artifact
    DeleteKey {
        /// Key id
        #[arg(long)]
        id: String,
    },
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cryptvault=info,vault=info".into());
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = args.config();
    tracing::debug!(?config, "Configuration loaded");

    match run(args.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(code = e.code(), kind = ?e.kind(), "{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: VaultConfig) -> Result<ExitCode> {
    match command {
        Command::Aes(cmd) => run_aes(cmd),
        Command::Rsa(cmd) => run_rsa(cmd).await,
        Command::Ec(cmd) => run_ec(cmd),
        Command::Hsm(cmd) => run_hsm(cmd, config.hsm).await,
        Command::Store(cmd) => run_store(cmd, config.storage).await,
    }
}

// ── Software Crypto ───────────────────────────────────────────────────────────

fn run_aes(command: AesCommand) -> Result<ExitCode> {
    match command {
        AesCommand::GenerateKey { bits, out } => {
            if !cryptvault::orchestrator::AES_KEY_BITS.contains(&bits) {
                return Err(Error::UnsupportedKeySize {
                    algorithm: "AES".into(),
                    size: bits,
                });
            }
            let key = aes_cbc::generate_key(bits as usize / 8);
            aes_cbc::save_key_to_file(&out, &key)?;
            tracing::info!(bits, path = %out.display(), "AES key written");
        }
        AesCommand::Encrypt(files) => {
            let key = aes_cbc::read_key_from_file(&files.key)?;
            let ciphertext = aes_cbc::encrypt(&read_file(&files.input)?, key.as_bytes())?;
            write_file(&files.output, &ciphertext)?;
        }
        AesCommand::Decrypt(files) => {
            let key = aes_cbc::read_key_from_file(&files.key)?;
            let plaintext = aes_cbc::decrypt(&read_file(&files.input)?, key.as_bytes())?;
            write_file(&files.output, &plaintext)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_rsa(command: RsaCommand) -> Result<ExitCode> {
    match command {
        RsaCommand::GenerateKey {
            bits,
            private_out,
            public_out,
        } => {
            let (private, public) =
                tokio::task::spawn_blocking(move || rsa_pkcs1::generate_key_pair(bits))
                    .await
                    .map_err(|e| Error::Internal(format!("key generation task failed: {}", e)))??;
            rsa_pkcs1::save_private_key_to_file(&private_out, &private)?;
            rsa_pkcs1::save_public_key_to_file(&public_out, &public)?;
            tracing::info!(bits, "RSA key pair written");
        }
        RsaCommand::Encrypt(files) => {
            let cipher =
                RsaCipher::new().with_public_key(rsa_pkcs1::read_public_key_from_file(&files.key)?);
            write_file(&files.output, &cipher.encrypt(&read_file(&files.input)?)?)?;
        }
        RsaCommand::Decrypt(files) => {
            let cipher = RsaCipher::new()
                .with_private_key(rsa_pkcs1::read_private_key_from_file(&files.key)?);
            write_file(&files.output, &cipher.decrypt(&read_file(&files.input)?)?)?;
        }
        RsaCommand::Sign(files) => {
            let cipher = RsaCipher::new()
                .with_private_key(rsa_pkcs1::read_private_key_from_file(&files.key)?);
            signature_file::save(&files.signature, &cipher.sign(&read_file(&files.input)?)?)?;
        }
        RsaCommand::Verify(files) => {
            let cipher =
                RsaCipher::new().with_public_key(rsa_pkcs1::read_public_key_from_file(&files.key)?);
            let signature = signature_file::read(&files.signature)?;
            return Ok(report_verification(
                cipher.verify(&read_file(&files.input)?, &signature)?,
            ));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_ec(command: EcCommand) -> Result<ExitCode> {
    match command {
        EcCommand::GenerateKey {
            curve,
            private_out,
            public_out,
        } => {
            let (private, public) = ec::generate_key_pair(curve)?;
            ec::save_private_key_to_file(&private_out, &private)?;
            ec::save_public_key_to_file(&public_out, &public)?;
            tracing::info!(curve = %curve, "EC key pair written");
        }
        EcCommand::Sign(files) => {
            let signer = EcSigner::new().with_private_key(ec::read_private_key_from_file(&files.key)?);
            signature_file::save(&files.signature, &signer.sign(&read_file(&files.input)?)?)?;
        }
        EcCommand::Verify(files) => {
            let signer = EcSigner::new().with_public_key(ec::read_public_key_from_file(&files.key)?);
            let signature = signature_file::read(&files.signature)?;
            return Ok(report_verification(
                signer.verify(&read_file(&files.input)?, &signature)?,
            ));
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ── Token ─────────────────────────────────────────────────────────────────────

async fn run_hsm(command: HsmCommand, config: HsmConfig) -> Result<ExitCode> {
    let token = Pkcs11Token::new(config);
    match command {
        HsmCommand::ListSlots => print_json(&token.list_token_slots().await?)?,
        HsmCommand::ListObjects { label } => print_json(&token.list_objects(&label).await?)?,
        HsmCommand::InitToken { label } => token.initialize_token(&label).await?,
        HsmCommand::AddKey {
            label,
            object,
            key_type,
            size,
        } => token.add_key(&label, &object, &key_type, size).await?,
        HsmCommand::DeleteObject {
            label,
            object_type,
            object,
        } => token.delete_object(&label, &object_type, &object).await?,
        HsmCommand::Encrypt(files) => {
            token
                .encrypt(&files.label, &files.object, &files.input, &files.output)
                .await?
        }
        HsmCommand::Decrypt(files) => {
            token
                .decrypt(&files.label, &files.object, &files.input, &files.output)
                .await?
        }
        HsmCommand::Sign(files) => {
            token
                .sign(
                    &files.label,
                    &files.object,
                    &files.key_type,
                    &files.input,
                    &files.signature,
                )
                .await?
        }
        HsmCommand::Verify(files) => {
            let verified = token
                .verify(
                    &files.label,
                    &files.object,
                    &files.key_type,
                    &files.input,
                    &files.signature,
                )
                .await?;
            return Ok(report_verification(verified));
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ── Vault Storage ─────────────────────────────────────────────────────────────

async fn run_store(command: StoreCommand, config: StorageConfig) -> Result<ExitCode> {
    let metadata = Arc::new(JsonMetadataStore::open(&config.metadata_path).await?);
    let orchestrator = UploadOrchestrator::new(
        Arc::new(FileStore::new(&config.blob_root)),
        Arc::new(FileStore::new(&config.key_root)),
        metadata.clone(),
    );

    match command {
        StoreCommand::CreateKey {
            user,
            algorithm,
            size,
        } => print_json(&orchestrator.create_key(&user, algorithm, size).await?)?,
        StoreCommand::Upload {
            user,
            encrypt_with,
            sign_key,
            files,
        } => {
            let inputs: Vec<BlobInput> = files.into_iter().map(BlobInput::File).collect();
            let metas = match encrypt_with {
                Some(key_id) => {
                    orchestrator
                        .upload_encrypted_blobs(&inputs, &user, &key_id, sign_key.as_deref())
                        .await?
                }
                None => {
                    orchestrator
                        .upload_blobs(&inputs, &user, None, sign_key.as_deref())
                        .await?
                }
            };
            print_json(&metas)?;
        }
        StoreCommand::Download {
            id,
            decrypt,
            output,
        } => {
            let (_, data) = if decrypt {
                orchestrator.download_decrypted_blob(&id).await?
            } else {
                orchestrator.download_blob(&id).await?
            };
            write_file(&output, &data)?;
        }
        StoreCommand::ListBlobs { user } => print_json(&metadata.list_blobs(&user).await?)?,
        StoreCommand::DeleteBlob { id } => orchestrator.delete_blob(&id).await?,
        StoreCommand::ExportKey { id, output } => {
            let (_, bytes) = orchestrator.download_key(&id).await?;
            write_file(&output, &bytes)?;
        }
        StoreCommand::DeleteKey { id } => orchestrator.delete_key(&id).await?,
    }
    Ok(ExitCode::SUCCESS)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn report_verification(verified: bool) -> ExitCode {
    if verified {
        println!("Verified OK");
        ExitCode::SUCCESS
    } else {
        println!("Verification failure");
        ExitCode::FAILURE
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|e| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
