use crate::api::Operation;

/// Where an outbound call stands in its retry budget.
///
/// `Fresh -> Retried -> Terminal`. A call is dispatched once while `Fresh`
/// and at most once more while `Retried`; `Terminal` is never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Fresh,
    Retried,
    Terminal,
}

/// What to do after a dispatch came back AuthExpired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthExpiredAction {
    /// Obtain a renewed credential and dispatch once more.
    Renew,
    /// The retry budget is spent; report the caller as unauthenticated.
    GiveUp,
}

/// One request issued through the `SessionController`.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    operation: Operation,
    attach_credential: bool,
    phase: CallPhase,
}

impl OutboundCall {
    pub fn new(operation: Operation, attach_credential: bool) -> Self {
        Self {
            operation,
            attach_credential,
            phase: CallPhase::Fresh,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn attach_credential(&self) -> bool {
        self.attach_credential
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn retry_count(&self) -> u8 {
        match self.phase {
            CallPhase::Fresh => 0,
            CallPhase::Retried | CallPhase::Terminal => 1,
        }
    }

    pub fn can_dispatch(&self) -> bool {
        self.phase != CallPhase::Terminal
    }

    /// Advance the state machine after an AuthExpired response.
    pub fn on_auth_expired(&mut self) -> AuthExpiredAction {
        match self.phase {
            CallPhase::Fresh => {
                self.phase = CallPhase::Retried;
                AuthExpiredAction::Renew
            }
            CallPhase::Retried | CallPhase::Terminal => {
                self.phase = CallPhase::Terminal;
                AuthExpiredAction::GiveUp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget_is_one() {
        let mut call = OutboundCall::new(Operation::get("/threads"), true);
        assert_eq!(call.phase(), CallPhase::Fresh);
        assert_eq!(call.retry_count(), 0);
        assert!(call.can_dispatch());

        assert_eq!(call.on_auth_expired(), AuthExpiredAction::Renew);
        assert_eq!(call.phase(), CallPhase::Retried);
        assert_eq!(call.retry_count(), 1);
        assert!(call.can_dispatch());

        assert_eq!(call.on_auth_expired(), AuthExpiredAction::GiveUp);
        assert_eq!(call.phase(), CallPhase::Terminal);
        assert_eq!(call.retry_count(), 1);
        assert!(!call.can_dispatch());

        // Terminal is absorbing
        assert_eq!(call.on_auth_expired(), AuthExpiredAction::GiveUp);
        assert_eq!(call.retry_count(), 1);
    }
}
