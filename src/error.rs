use std::{error::Error, fmt, io};

use crate::message::{Clock, Flag, ModelId, WorkerId};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Failures surfaced by the progress tracker, the consistency models and the model host.
#[derive(Debug)]
pub enum EngineErr {
    UnknownWorker {
        model_id: ModelId,
        worker: WorkerId,
    },
    UnknownModel(ModelId),
    DuplicateModel(ModelId),
    /// A model was registered under an id other than its own.
    ModelIdMismatch {
        key: ModelId,
        model_id: ModelId,
    },
    /// The addressed model was stopped after a consistency violation.
    Halted(ModelId),
    Consistency(ConsistencyViolation),
    /// The message carried a reply or control tag where an operation was expected.
    UnexpectedFlag {
        model_id: ModelId,
        flag: Flag,
    },
    Decode {
        model_id: ModelId,
        source: DecodeErr,
    },
    Config(String),
    Io(io::Error),
}

impl EngineErr {
    /// Whether this error must stop the model instance that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorker { model_id, worker } => {
                write!(f, "unknown worker {worker} in model {model_id}")
            }
            Self::UnknownModel(model_id) => write!(f, "unknown model {model_id}"),
            Self::DuplicateModel(model_id) => write!(f, "model {model_id} is already registered"),
            Self::ModelIdMismatch { key, model_id } => {
                write!(f, "model {model_id} can't be registered as model {key}")
            }
            Self::Halted(model_id) => write!(f, "model {model_id} was halted"),
            Self::Consistency(v) => write!(f, "consistency violation: {v}"),
            Self::UnexpectedFlag { model_id, flag } => {
                write!(f, "model {model_id} can't handle {flag:?} messages")
            }
            Self::Decode { model_id, source } => {
                write!(f, "malformed message for model {model_id}: {source}")
            }
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConsistencyViolation> for EngineErr {
    fn from(value: ConsistencyViolation) -> Self {
        Self::Consistency(value)
    }
}

/// Boundary conversion for the binary.
impl From<EngineErr> for io::Error {
    fn from(value: EngineErr) -> Self {
        match value {
            EngineErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// A worker's operation didn't match its progress relative to the model's min clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyViolation {
    pub model_id: ModelId,
    pub worker: WorkerId,
    pub flag: Flag,
    pub progress: Clock,
    pub min_clock: Clock,
    pub kind: Violation,
}

/// What exactly was violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The operation must be issued at the given progress.
    Progress { expected: Clock },
    /// Advancing would leave the worker more than `bound` rounds ahead of the min clock.
    LeadBound { bound: Clock },
    /// The target round falls outside `[min_clock, min_clock + bound]`.
    Window { round: Clock, bound: Clock },
    /// The admission controller refused an ahead-of-min operation.
    Rejected { round: Clock },
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            model_id,
            worker,
            flag,
            progress,
            min_clock,
            ..
        } = self;

        write!(
            f,
            "{flag:?} from worker {worker} in model {model_id} at progress {progress}, min clock {min_clock}: "
        )?;

        match self.kind {
            Violation::Progress { expected } => write!(f, "expected progress {expected}"),
            Violation::LeadBound { bound } => {
                write!(f, "advance would exceed the lead bound of {bound}")
            }
            Violation::Window { round, bound } => {
                write!(f, "round {round} is outside the staleness window of {bound}")
            }
            Violation::Rejected { round } => write!(f, "admission rejected for round {round}"),
        }
    }
}

impl Error for ConsistencyViolation {}

/// A message payload didn't have the shape its flag requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErr {
    BlockCount {
        flag: Flag,
        expected: usize,
        got: usize,
    },
    Ragged {
        what: &'static str,
        len: usize,
        elem: usize,
    },
    LengthMismatch {
        keys: usize,
        vals: usize,
    },
    NotUtf8,
}

impl fmt::Display for DecodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockCount {
                flag,
                expected,
                got,
            } => write!(f, "{flag:?} expects {expected} data blocks, got {got}"),
            Self::Ragged { what, len, elem } => write!(
                f,
                "{what} block of {len} bytes isn't a multiple of the {elem} byte element size"
            ),
            Self::LengthMismatch { keys, vals } => {
                write!(f, "{keys} keys but {vals} values")
            }
            Self::NotUtf8 => f.write_str("text block isn't valid utf-8"),
        }
    }
}

impl Error for DecodeErr {}
