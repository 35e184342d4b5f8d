#[macro_use]
pub(crate) mod log;

pub(crate) mod tlv;
