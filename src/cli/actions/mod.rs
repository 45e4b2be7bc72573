pub mod server;

use secrecy::SecretString;

/// What the process was asked to do, resolved from the CLI.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        secret: SecretString,
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
        anon_ttl_seconds: u64,
        code_ttl_seconds: u64,
        max_attempts: i32,
        resend_cooldown_seconds: u64,
    },
}
