pub mod challenge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod primitive;
pub mod store;
pub mod verifier;

#[cfg(feature = "tpm")]
pub mod tpm;

pub use error::{Error, Result};
pub use flow::{AttestationFlow, FlowState};

use config::{Command, Config};
use primitive::KeyAttestation;
use verifier::{ChallengeClient, HttpVerifier, VerifierClient};

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    // Preflight checks
    diagnostics::check(&cfg)?;

    let data_dir = cfg.data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    // Single-instance lock: the key store is never shared across processes.
    let lock_path = data_dir.join("devattest.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!("devattest is already running (lock: {})", lock_path.display())
    })?;

    let store = store::KeyStore::open(&data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open key store: {e}"))?;
    let verifier = HttpVerifier::new(
        &cfg.verifier_url,
        std::time::Duration::from_secs(cfg.timeout_secs),
        cfg.trust_policy(),
    )?;
    tracing::info!(verifier = verifier.base_url(), app_id = %cfg.app_id, "Starting devattest");

    #[cfg(feature = "tpm")]
    let primitive = tpm::TpmKeyAttestation::probe(
        &cfg.tpm_device,
        cfg.nv_index()?,
        data_dir.join("keys"),
        &cfg.app_id,
    );
    #[cfg(not(feature = "tpm"))]
    let primitive = crate::primitive::Unavailable;

    let flow = AttestationFlow::new(primitive, verifier, store, cfg.app_id.clone(), cfg.user_id.clone());
    execute(&flow, cfg.command).await
}

async fn execute<P, V>(flow: &AttestationFlow<P, V>, command: Command) -> anyhow::Result<()>
where
    P: KeyAttestation,
    V: ChallengeClient + VerifierClient,
{
    match command {
        Command::Enroll => {
            let record = flow.enroll().await?;
            println!("Enrolled key {}", record.id);
        }
        Command::Assert => {
            let record = flow.assert().await?;
            println!("Assertion verified for key {} (count {})", record.id, record.count);
        }
        Command::Status => match flow.key_record() {
            Some(record) => println!("{}: key {} (count {})", flow.state(), record.id, record.count),
            None => println!("{}", flow.state()),
        },
        Command::Clear => {
            flow.clear()?;
            println!("Key cleared");
        }
    }
    Ok(())
}
