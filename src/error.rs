#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Text(&'static str),

    #[error("fetch aborted")]
    Aborted,

    #[error("exceeded retransmission limit on segment {segment}")]
    ExceededRetxLimit { segment: u64 },

    #[error("fetch incomplete")]
    Incomplete,

    #[error("cannot verify segment {segment}: {reason}")]
    Verify { segment: u64, reason: String },

    #[error("invalid segment range: first={first} last_exclusive={last_exclusive}")]
    InvalidRange { first: u64, last_exclusive: u64 },

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("{0} leftover segments after fetch ended")]
    LeftoverSegments(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-friendly name, used for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Text(_) => "bug",
            Error::Aborted => "aborted",
            Error::ExceededRetxLimit { .. } => "exceed_retx_limit",
            Error::Incomplete => "incomplete",
            Error::Verify { .. } => "verify",
            Error::InvalidRange { .. } => "invalid_range",
            Error::InvalidOptions(_) => "invalid_options",
            Error::LeftoverSegments(_) => "leftover_segments",
            Error::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) trait OptionContext<T>: Sized {
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionContext<T> for Option<T> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.ok_or(Error::Text(msg))
    }
}
