// src/runtime/classifier.rs
// Error Classifier: maps provider-surfaced faults onto the fixed taxonomy
// and the execute loop's retry/advance decision.

use crate::error::PrometheusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthOrBilling,
    ProviderUnavailable,
    ContextTooLong,
    UserAbort,
    Recoverable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RotateCredential,
    NextModel,
    AbortChain,
    RethrowFatal,
}

pub fn classify(err: &PrometheusError) -> ErrorKind {
    match err {
        PrometheusError::ProviderAuth(_) => ErrorKind::AuthOrBilling,
        PrometheusError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
        PrometheusError::ContextTooLong(_) => ErrorKind::ContextTooLong,
        PrometheusError::UserAbort => ErrorKind::UserAbort,
        PrometheusError::Fatal(_) | PrometheusError::Db(_) => ErrorKind::Fatal,
        _ => ErrorKind::Recoverable,
    }
}

/// Decides the execute loop's next move for a classified error.
pub fn decide(kind: ErrorKind) -> Action {
    match kind {
        ErrorKind::AuthOrBilling => Action::RotateCredential,
        ErrorKind::ProviderUnavailable | ErrorKind::ContextTooLong | ErrorKind::Recoverable => {
            Action::NextModel
        }
        ErrorKind::UserAbort => Action::AbortChain,
        ErrorKind::Fatal => Action::RethrowFatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_rotates_credential() {
        let kind = classify(&PrometheusError::ProviderAuth("bad key".into()));
        assert_eq!(kind, ErrorKind::AuthOrBilling);
        assert_eq!(decide(kind), Action::RotateCredential);
    }

    #[test]
    fn unavailable_advances_to_next_model() {
        let kind = classify(&PrometheusError::ProviderUnavailable("timeout".into()));
        assert_eq!(decide(kind), Action::NextModel);
    }

    #[test]
    fn user_abort_aborts_chain() {
        let kind = classify(&PrometheusError::UserAbort);
        assert_eq!(decide(kind), Action::AbortChain);
    }

    #[test]
    fn fatal_rethrows() {
        let kind = classify(&PrometheusError::Fatal("corruption".into()));
        assert_eq!(decide(kind), Action::RethrowFatal);
    }
}
