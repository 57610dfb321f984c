//! Scan intake state machine
//!
//! A scanner delivers one token per read into a self-clearing field. Tokens
//! are classified purely by normalized length:
//! - 9 characters: serial
//! - 11 characters: production order
//! - anything else: ignored, no state change, no advisory
//!
//! A serial followed by an order writes one traceability record.

use crate::codes::{normalize_code, Code};
use crate::config::DuplicatePolicy;
use crate::model::{ProductType, TraceabilityRecord};
use crate::store::{InsertError, TraceabilityStore};
use crate::time::Clock;
use serde::Serialize;
use tracing::{debug, warn};

/// Length of a serial number token
pub const SERIAL_LEN: usize = 9;

/// Length of a production order token
pub const ORDER_LEN: usize = 11;

/// Operator message when an order arrives before a serial
pub const SCAN_SERIAL_FIRST: &str = "Leia primeiro o número de série";

/// Operator message after a successful record
pub const RECORDED: &str = "Apontamento realizado";

/// Classified scanner token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanToken {
    Serial(Code),
    Order(Code),
    Ignored,
}

/// Classify one raw scanner read
pub fn classify(raw: &str) -> ScanToken {
    let code = normalize_code(Some(raw));
    match code.char_len() {
        SERIAL_LEN => ScanToken::Serial(code),
        ORDER_LEN => ScanToken::Order(code),
        _ => ScanToken::Ignored,
    }
}

/// Severity of an operator advisory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryKind {
    Success,
    Warning,
    Error,
}

/// Transient operator message, shown once then cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

impl Advisory {
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: AdvisoryKind::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { kind: AdvisoryKind::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: AdvisoryKind::Error, message: message.into() }
    }
}

/// Intake state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntakeState {
    Idle,
    AwaitingOrder { serial: Code },
}

/// What one scan did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Token was not a serial or an order
    Ignored,
    /// Serial stored as pending
    SerialPending(Code),
    /// Order arrived without a pending serial
    SerialRequired,
    /// Traceability record written
    Recorded(TraceabilityRecord),
    /// A record already exists for this unit
    Duplicate(String),
    /// Backend call failed
    StoreFailed(String),
}

/// Per-operator intake context
///
/// Owned by exactly one operator session; handlers receive it by mutable
/// reference so no state is shared between sessions.
#[derive(Debug, Clone)]
pub struct ScanSession {
    operator: String,
    product_type: ProductType,
    state: IntakeState,
    last_order: Option<Code>,
    input: String,
    advisory: Option<Advisory>,
}

impl ScanSession {
    pub fn new(operator: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            operator: operator.into(),
            product_type,
            state: IntakeState::Idle,
            last_order: None,
            input: String::new(),
            advisory: None,
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    /// Change the product selector; applies to the next recorded unit
    pub fn set_product_type(&mut self, product_type: ProductType) {
        self.product_type = product_type;
    }

    pub fn state(&self) -> &IntakeState {
        &self.state
    }

    pub fn pending_serial(&self) -> Option<&Code> {
        match &self.state {
            IntakeState::Idle => None,
            IntakeState::AwaitingOrder { serial } => Some(serial),
        }
    }

    /// Order of the last attempted record, kept while its serial is pending
    pub fn pending_order(&self) -> Option<&Code> {
        self.last_order.as_ref()
    }

    /// Raw input field; always empty between events
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Current advisory without clearing it
    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    /// Return the advisory and clear it (one display cycle)
    pub fn take_advisory(&mut self) -> Option<Advisory> {
        self.advisory.take()
    }
}

/// Drives [`ScanSession`]s against the traceability store
#[derive(Clone)]
pub struct ScanIntake {
    store: TraceabilityStore,
    on_duplicate: DuplicatePolicy,
}

impl ScanIntake {
    pub fn new(store: TraceabilityStore, on_duplicate: DuplicatePolicy) -> Self {
        Self { store, on_duplicate }
    }

    /// Process one scanner read for a session
    pub async fn handle_scan(&self, session: &mut ScanSession, raw: &str, clock: &dyn Clock) -> ScanOutcome {
        session.input.clear();
        session.input.push_str(raw);

        let outcome = self.dispatch(session, classify(raw), clock).await;

        // The device field is single-shot: every read starts empty
        session.input.clear();
        outcome
    }

    async fn dispatch(&self, session: &mut ScanSession, token: ScanToken, clock: &dyn Clock) -> ScanOutcome {
        match token {
            ScanToken::Ignored => ScanOutcome::Ignored,

            ScanToken::Serial(serial) => {
                debug!("Serial {} pending for {}", serial, session.operator);
                session.state = IntakeState::AwaitingOrder { serial: serial.clone() };
                session.last_order = None;
                if matches!(
                    session.advisory,
                    Some(Advisory { kind: AdvisoryKind::Error | AdvisoryKind::Warning, .. })
                ) {
                    session.advisory = None;
                }
                ScanOutcome::SerialPending(serial)
            }

            ScanToken::Order(order) => {
                let Some(serial) = session.pending_serial().cloned() else {
                    session.advisory = Some(Advisory::warning(SCAN_SERIAL_FIRST));
                    return ScanOutcome::SerialRequired;
                };

                session.last_order = Some(order.clone());
                let record = TraceabilityRecord {
                    serial,
                    order,
                    product_type: session.product_type,
                    operator: session.operator.clone(),
                    timestamp: clock.now(),
                };

                match self.store.try_insert(&record).await {
                    Ok(()) => {
                        session.state = IntakeState::Idle;
                        session.last_order = None;
                        session.advisory = Some(Advisory::success(RECORDED));
                        ScanOutcome::Recorded(record)
                    }
                    Err(InsertError::Duplicate(message)) => {
                        if self.on_duplicate == DuplicatePolicy::AbandonSerial {
                            session.state = IntakeState::Idle;
                            session.last_order = None;
                        }
                        session.advisory = Some(Advisory::error(message.clone()));
                        ScanOutcome::Duplicate(message)
                    }
                    Err(InsertError::Store(e)) => {
                        warn!("Failed to record serial {}: {}", record.serial, e);
                        let message = e.to_string();
                        session.advisory = Some(Advisory::error(message.clone()));
                        ScanOutcome::StoreFailed(message)
                    }
                }
            }
        }
    }
}
