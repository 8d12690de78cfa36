use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{PortalError, PortalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordIssue {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min, actual } => {
                format!("Password must be at least {min} characters (currently {actual})")
            }
            Self::TooLong { max, actual } => {
                format!("Password must be at most {max} characters (currently {actual})")
            }
        }
    }
}

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
}

impl CredentialHasher {
    pub fn new(argon_config: Argon2Config, policy: PasswordPolicy) -> PortalResult<Self> {
        let params = Params::new(
            argon_config.memory_cost_kib,
            argon_config.time_cost,
            argon_config.parallelism,
            Some(argon_config.output_length),
        )
        .map_err(|e| PortalError::Internal(format!("Invalid Argon2 params: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            policy,
        })
    }

    pub fn with_defaults() -> PortalResult<Self> {
        Self::new(Argon2Config::default(), PasswordPolicy::default())
    }

    pub fn hash(&self, password: &str) -> PortalResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PortalError::Internal(format!("Failed to hash password: {e}")))?;

        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(e) => {
                warn!("Stored password hash is malformed: {e}");
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    pub fn check_policy(&self, password: &str) -> Vec<PasswordIssue> {
        let mut issues = Vec::new();
        let length = password.chars().count();

        if length < self.policy.min_length {
            issues.push(PasswordIssue::TooShort {
                min: self.policy.min_length,
                actual: length,
            });
        }
        if length > self.policy.max_length {
            issues.push(PasswordIssue::TooLong {
                max: self.policy.max_length,
                actual: length,
            });
        }

        issues
    }

    pub fn enforce_policy(&self, password: &str) -> PortalResult<()> {
        match self.check_policy(password).first() {
            Some(issue) => Err(PortalError::Validation(issue.message())),
            None => Ok(()),
        }
    }
}
