use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("payment receipt carries no bolt11 tag")]
    Missing,

    #[error("invoice has no human-readable part separator")]
    MissingSeparator,

    #[error("not a lightning invoice: {0}")]
    NotLightning(String),

    #[error("invoice does not encode an amount")]
    MissingAmount,

    #[error("malformed invoice: {0}")]
    Malformed(String),

    #[error("unknown amount multiplier '{0}'")]
    UnknownMultiplier(char),

    #[error("pico-bitcoin amount is not a whole millisatoshi")]
    SubMillisatoshi,

    #[error("invoice amount overflows")]
    Overflow,
}
