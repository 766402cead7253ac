use git2::{Cred, CredentialType, RemoteCallbacks};
use std::path::PathBuf;

/// Username/password pair handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Resolves credentials each time a remote operation asks for them
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Credential;
}

/// Parse `USERNAME=` and `PASSWORD=` lines; anything else is ignored.
pub fn parse_credentials(content: &str) -> Credential {
    let mut credential = Credential::default();

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("USERNAME=") {
            credential.username = value.to_string();
        } else if let Some(value) = line.strip_prefix("PASSWORD=") {
            credential.password = value.to_string();
        }
    }

    credential
}

/// Credentials read from a key=value file on every request, so edits to the
/// file take effect without a restart.
#[derive(Debug, Clone, Default)]
pub struct EnvFileCredentials {
    path: Option<PathBuf>,
}

impl EnvFileCredentials {
    pub fn new(path: Option<PathBuf>) -> Self {
        EnvFileCredentials { path }
    }
}

impl CredentialSource for EnvFileCredentials {
    fn credentials(&self) -> Credential {
        let Some(path) = &self.path else {
            log::debug!("No env file configured, using empty credentials");
            return Credential::default();
        };

        if !path.exists() {
            log::warn!(
                "Env file {} not found. Using empty credentials.",
                path.display()
            );
            return Credential::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => parse_credentials(&content),
            Err(e) => {
                log::error!("Error reading env file {}: {}", path.display(), e);
                Credential::default()
            }
        }
    }
}

/// Fixed credentials
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Credential);

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Credential {
        self.0.clone()
    }
}

const MAX_AUTH_ATTEMPTS: usize = 3;

/// Counts credential requests for one remote operation.
///
/// libgit2 keeps asking while the server rejects what it was given, so the
/// budget runs out after a few attempts.
#[derive(Debug, Default)]
struct AuthAttempts {
    made: usize,
}

impl AuthAttempts {
    fn record(&mut self) -> Result<(), git2::Error> {
        self.made += 1;
        if self.made > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str(
                "Authentication failed: credentials were rejected by the remote",
            ));
        }
        Ok(())
    }
}

/// Remote callbacks that answer libgit2 credential requests from `source`.
pub(super) fn remote_callbacks(source: &dyn CredentialSource) -> RemoteCallbacks<'_> {
    let mut attempts = AuthAttempts::default();
    let mut callbacks = RemoteCallbacks::new();

    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        attempts.record()?;

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            let credential = source.credentials();
            Cred::userpass_plaintext(&credential.username, &credential.password)
        } else if allowed_types.contains(CredentialType::SSH_KEY) {
            Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
        } else {
            Cred::default()
        }
    });

    callbacks
}
