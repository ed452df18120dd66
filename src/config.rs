use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const TEAM_ID_LEN: usize = 10;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[arg(long, env = "DEVATTEST_VERIFIER_URL", default_value = "https://localhost:8443")]
    pub verifier_url: String,
    /// `<TEAMID>.<bundle id>`, e.g. `ABCDE12345.com.example.app`.
    #[arg(long, env = "DEVATTEST_APP_ID")]
    pub app_id: AppId,
    /// Principal sent with the attestation.
    #[arg(long, env = "DEVATTEST_USER_ID", default_value = "demo-user")]
    pub user_id: String,
    /// Overrides the XDG data dir.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    #[cfg(feature = "tpm")]
    #[arg(long, default_value = "/dev/tpmrm0")]
    pub tpm_device: String,
    #[cfg(feature = "tpm")]
    #[arg(long, default_value = "0x01800110")]
    pub nv_index: String,
    /// Accept any verifier TLS certificate.
    #[cfg(feature = "insecure-trust")]
    #[arg(long)]
    pub insecure_trust_all: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Generate a device key and have the verifier validate it.
    Enroll,
    /// Prove possession of the enrolled key and update its counter.
    Assert,
    /// Show the current key state.
    Status,
    /// Forget the enrolled key. The verifier is not notified.
    Clear,
}

impl Config {
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(directories::ProjectDirs::from("", "", "devattest")
            .ok_or_else(|| anyhow::anyhow!("cannot determine XDG data dir"))?
            .data_dir()
            .to_path_buf())
    }

    pub fn trust_policy(&self) -> crate::verifier::TrustPolicy {
        #[cfg(feature = "insecure-trust")]
        if self.insecure_trust_all {
            return crate::verifier::TrustPolicy::AcceptAnyCertificate;
        }
        crate::verifier::TrustPolicy::PlatformDefault
    }

    #[cfg(feature = "tpm")]
    pub fn nv_index(&self) -> anyhow::Result<u32> {
        u32::from_str_radix(self.nv_index.trim_start_matches("0x"), 16)
            .map_err(|e| anyhow::anyhow!("invalid --nv-index: {e}"))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AppIdError {
    #[error("app id must look like TEAMID.bundle.id")]
    MissingSeparator,
    #[error("team id must be {TEAM_ID_LEN} ASCII alphanumerics, got {0:?}")]
    TeamId(String),
    #[error("invalid bundle id {0:?}")]
    BundleId(String),
}

/// Application identifier: a 10-character team id and a reverse-DNS bundle id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppId {
    team_id: String,
    bundle_id: String,
}

impl AppId {
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }
}

impl FromStr for AppId {
    type Err = AppIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (team, bundle) = s.split_once('.').ok_or(AppIdError::MissingSeparator)?;
        if team.len() != TEAM_ID_LEN || !team.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(AppIdError::TeamId(team.to_string()));
        }
        let label_ok = |l: &str| {
            !l.is_empty()
                && l.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        };
        if !bundle.split('.').all(label_ok) {
            return Err(AppIdError::BundleId(bundle.to_string()));
        }
        Ok(Self {
            team_id: team.to_string(),
            bundle_id: bundle.to_string(),
        })
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.team_id, self.bundle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_app_id_parse_and_display() {
        let id: AppId = "ABCDE12345.com.example.attest".parse().unwrap();
        assert_eq!(id.team_id(), "ABCDE12345");
        assert_eq!(id.bundle_id(), "com.example.attest");
        assert_eq!(id.to_string(), "ABCDE12345.com.example.attest");
    }

    #[test]
    fn test_app_id_rejects_bad_team_id() {
        assert_eq!(
            "ABC.com.example".parse::<AppId>(),
            Err(AppIdError::TeamId("ABC".into()))
        );
        assert!(matches!(
            "ABCDE1234!.com.example".parse::<AppId>(),
            Err(AppIdError::TeamId(_))
        ));
        assert_eq!(
            "ABCDE12345".parse::<AppId>(),
            Err(AppIdError::MissingSeparator)
        );
    }

    #[test]
    fn test_app_id_rejects_bad_bundle_id() {
        assert!(matches!(
            "ABCDE12345.".parse::<AppId>(),
            Err(AppIdError::BundleId(_))
        ));
        assert!(matches!(
            "ABCDE12345.com..example".parse::<AppId>(),
            Err(AppIdError::BundleId(_))
        ));
    }

    #[test]
    fn test_config_parses_subcommand_and_defaults() {
        let cfg = Config::try_parse_from([
            "devattest",
            "--app-id",
            "ABCDE12345.com.example.attest",
            "-vv",
            "assert",
        ])
        .unwrap();
        assert_eq!(cfg.command, Command::Assert);
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.user_id, "demo-user");
        assert_eq!(cfg.trust_policy(), crate::verifier::TrustPolicy::PlatformDefault);
    }

    #[test]
    fn test_config_rejects_malformed_app_id() {
        let res = Config::try_parse_from(["devattest", "--app-id", "nope", "status"]);
        assert!(res.is_err());
    }
}
