use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error("light weights must be finite, non-negative and not all zero")]
    InvalidWeights,

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("invalid bindings: {0}")]
    InvalidBindings(String),

    #[error("out of device memory while allocating `{label}` ({size} bytes)")]
    OutOfMemory { label: String, size: usize },

    #[error("device lost")]
    DeviceLost,
}

impl Error {
    /// Returns whether the renderer can continue after this error, possibly
    /// after dropping a frame or re-acquiring its resources.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::DeviceLost)
    }

    /// Returns whether this error invalidates every device resource.
    pub fn needs_reacquire(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(!Error::InvalidWeights.is_recoverable());
        assert!(!Error::InvalidParams("".into()).is_recoverable());
        assert!(!Error::InvalidBindings("".into()).is_recoverable());

        let oom = Error::OutOfMemory {
            label: "ember_reservoirs".into(),
            size: 1024,
        };

        assert!(oom.is_recoverable());
        assert!(!oom.needs_reacquire());

        assert!(Error::DeviceLost.needs_reacquire());
    }
}
