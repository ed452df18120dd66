use crate::config::Config;

pub fn check(cfg: &Config) -> anyhow::Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: data dir writable
    match cfg.data_dir() {
        Ok(dir) => {
            if let Err(e) = std::fs::create_dir_all(&dir)
                .and_then(|()| tempfile::NamedTempFile::new_in(&dir).map(drop))
            {
                errors.push(format!(
                    "cannot write to data dir {}: {e}\n  \
                     → pass a writable directory with --data-dir",
                    dir.display()
                ));
            }
        }
        Err(e) => errors.push(format!("{e}\n  → pass --data-dir explicitly")),
    }

    // Check 2: verifier URL
    match reqwest::Url::parse(&cfg.verifier_url) {
        Ok(url) if matches!(url.scheme(), "https" | "http") => {
            if url.scheme() == "http" {
                tracing::warn!(url = %url, "Verifier URL is not using TLS");
            }
        }
        Ok(url) => errors.push(format!(
            "unsupported verifier URL scheme '{}'\n  → use https://host[:port]",
            url.scheme()
        )),
        Err(e) => errors.push(format!(
            "invalid verifier URL '{}': {e}\n  → set --verifier-url or DEVATTEST_VERIFIER_URL",
            cfg.verifier_url
        )),
    }

    // Check 3: TPM device readable
    #[cfg(feature = "tpm")]
    if let Err(e) = std::fs::OpenOptions::new().read(true).open(&cfg.tpm_device) {
        errors.push(format!(
            "cannot open {}: {e}\n  \
             → add yourself to the 'tss' group: sudo usermod -aG tss $USER",
            cfg.tpm_device
        ));
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    anyhow::bail!("{} preflight check(s) failed", errors.len());
}
