use crate::error::{AuthError, SetupError};
use crate::model::Credentials;
use crate::store::{CredentialStore, SECURITY_KEY};
use tracing::{debug, info, warn};

pub const SECURITY_QUESTION: &str = "What is your favorite color?";
const SECURITY_ANSWER: &str = "blue";
pub const MAX_RECOVERY_ATTEMPTS: u32 = 2;
const PIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSession {
    pub attempt_count: u32,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryStage {
    #[default]
    AwaitingAnswer,
    AwaitingMasterOverride,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    Granted,
    Denied,
}

impl VerifyResult {
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied => Err(AuthError::Denied),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryResult {
    Correct(String),
    Incorrect { attempts_remaining: u32 },
    Lockout,
    NotConfigured,
}

pub struct AccessGate<S: CredentialStore> {
    store: S,
    session: AuthSession,
    recovery: RecoveryStage,
}

impl<S: CredentialStore> AccessGate<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: AuthSession::default(),
            recovery: RecoveryStage::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.exists(SECURITY_KEY) && self.credentials().is_some()
    }

    pub fn setup(&mut self, user_pin: &str, master_pin: &str) -> Result<(), SetupError> {
        if !is_valid_pin(user_pin) || !is_valid_pin(master_pin) {
            debug!("rejected setup with malformed PIN");
            return Err(SetupError::InvalidFormat);
        }

        let record = Credentials {
            user_pin: user_pin.to_string(),
            master_pin: master_pin.to_string(),
        };
        self.store
            .put(SECURITY_KEY, &record)
            .map_err(SetupError::Store)?;
        info!("security credentials saved");
        Ok(())
    }

    pub fn verify(&mut self, entered_pin: &str) -> VerifyResult {
        let Some(credentials) = self.credentials() else {
            return VerifyResult::Denied;
        };

        if entered_pin == credentials.user_pin {
            self.unlock();
            info!("access granted");
            VerifyResult::Granted
        } else {
            debug!("invalid security PIN");
            VerifyResult::Denied
        }
    }

    pub fn begin_recovery(&mut self, answer: &str) -> RecoveryResult {
        if self.recovery == RecoveryStage::AwaitingMasterOverride {
            return RecoveryResult::Lockout;
        }
        if self.recovery == RecoveryStage::Resolved {
            self.recovery = RecoveryStage::AwaitingAnswer;
        }

        let Some(credentials) = self.credentials() else {
            return RecoveryResult::NotConfigured;
        };

        if answer.to_lowercase() == SECURITY_ANSWER {
            self.session.attempt_count = 0;
            self.recovery = RecoveryStage::Resolved;
            info!("recovery answer verified");
            return RecoveryResult::Correct(credentials.user_pin);
        }

        // Only recovery answers count toward lockout, never direct PIN entry.
        self.session.attempt_count += 1;
        warn!(
            attempt = self.session.attempt_count,
            max = MAX_RECOVERY_ATTEMPTS,
            "incorrect recovery answer"
        );
        if self.session.attempt_count >= MAX_RECOVERY_ATTEMPTS {
            self.recovery = RecoveryStage::AwaitingMasterOverride;
            return RecoveryResult::Lockout;
        }

        RecoveryResult::Incorrect {
            attempts_remaining: MAX_RECOVERY_ATTEMPTS - self.session.attempt_count,
        }
    }

    pub fn master_override(&mut self, entered_master_pin: &str) -> VerifyResult {
        let Some(credentials) = self.credentials() else {
            return VerifyResult::Denied;
        };

        if entered_master_pin == credentials.master_pin {
            self.unlock();
            self.recovery = RecoveryStage::Resolved;
            info!("master override accepted");
            VerifyResult::Granted
        } else {
            warn!("master override rejected");
            VerifyResult::Denied
        }
    }

    pub fn lock(&mut self) {
        self.session.state = SessionState::Locked;
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.state == SessionState::Unlocked
    }

    pub fn session(&self) -> AuthSession {
        self.session
    }

    pub fn attempt_count(&self) -> u32 {
        self.session.attempt_count
    }

    pub fn recovery_stage(&self) -> RecoveryStage {
        self.recovery
    }

    pub fn security_question(&self) -> &'static str {
        SECURITY_QUESTION
    }

    fn unlock(&mut self) {
        self.session.state = SessionState::Unlocked;
        self.session.attempt_count = 0;
    }

    // Store failures read as "not configured".
    fn credentials(&self) -> Option<Credentials> {
        match self.store.get(SECURITY_KEY) {
            Ok(record) => record,
            Err(err) => {
                warn!("credential store unavailable: {err:#}");
                None
            }
        }
    }
}

fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit())
}
