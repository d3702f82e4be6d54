use crate::listener::ListenerTable;

/// Errors returned synchronously by engine operations.
///
/// None of these leave partial state behind: a rejected send transmits
/// nothing and a rejected registration occupies no slot.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Another frame is being composed on this transmit path.
    #[error("transmit path busy")]
    TxBusy,

    /// The listener table has no free slot.
    #[error("{table} listener table full ({capacity} slots)")]
    ListenerTableFull {
        table: ListenerTable,
        capacity: usize,
    },

    /// No matching listener is registered.
    #[error("no matching {table} listener registered")]
    ListenerNotFound { table: ListenerTable },

    /// An id listener is already waiting on this id.
    #[error("an id listener is already registered for id {0:#x}")]
    DuplicateIdListener(u32),

    /// Every id in the id field is held by an id listener.
    #[error("no free frame id: every id has a listener waiting on it")]
    IdsExhausted,

    /// Payload or close called with no multipart frame open.
    #[error("no multipart frame is open")]
    NoOpenMultipart,

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] bytewire_frame::FrameError),

    /// JSON configuration could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use bytewire_frame::FrameError;

    use super::*;

    #[test]
    fn display_names_the_table() {
        let err = EngineError::ListenerTableFull {
            table: ListenerTable::Type,
            capacity: 4,
        };
        assert_eq!(err.to_string(), "type listener table full (4 slots)");

        let err = EngineError::ListenerNotFound {
            table: ListenerTable::Generic,
        };
        assert_eq!(err.to_string(), "no matching generic listener registered");
    }

    #[test]
    fn frame_errors_convert() {
        let err: EngineError = FrameError::NotComposing.into();
        assert!(matches!(err, EngineError::Frame(FrameError::NotComposing)));
    }
}
