//! Command-line surface, in the style of `rebalancer-adm`'s `Cli`: a flat
//! `clap::Parser` struct with `default_value`/`env` pairs on every field.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "keyholderd")]
#[command(about = "Multi-user SSH agent daemon gated by group-based key authorization")]
#[command(version)]
pub struct Cli {
    /// Path of the UNIX socket to listen on.
    #[arg(long, default_value = "/run/keyholder/agent.sock", env = "KEYHOLDER_BIND")]
    pub bind: PathBuf,

    /// Directory of `*.pub` files naming the keys eligible for authorization.
    #[arg(long, default_value = "/etc/keyholder.d", env = "KEYHOLDER_KEY_DIR")]
    pub key_dir: PathBuf,

    /// Directory of `*.yml`/`*.yaml` files mapping groups to key names.
    #[arg(long, default_value = "/etc/keyholder-auth.d", env = "KEYHOLDER_AUTH_DIR")]
    pub auth_dir: PathBuf,

    /// Log verbosely to standard error instead of the system log.
    #[arg(long, env = "KEYHOLDER_DEBUG")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_paths() {
        let cli = Cli::parse_from(["keyholderd"]);
        assert_eq!(cli.bind, PathBuf::from("/run/keyholder/agent.sock"));
        assert_eq!(cli.key_dir, PathBuf::from("/etc/keyholder.d"));
        assert_eq!(cli.auth_dir, PathBuf::from("/etc/keyholder-auth.d"));
        assert!(!cli.debug);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "keyholderd",
            "--bind",
            "/tmp/agent.sock",
            "--debug",
        ]);
        assert_eq!(cli.bind, PathBuf::from("/tmp/agent.sock"));
        assert!(cli.debug);
    }
}
