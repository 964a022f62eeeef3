use thiserror::Error;

use crate::apply::ApplyError;
use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::decode::DecodeError;
use crate::gpt::GptError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Gpt(#[from] GptError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
