use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("storage unavailable: {0}")]
  Unavailable(String),

  #[error(
    "storage quota exceeded: {needed} \
     bytes requested, {limit} allowed"
  )]
  QuotaExceeded {
    needed: usize,
    limit:  usize
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serde(#[from] serde_json::Error)
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("persistence failed: {0}")]
  Persistence(#[from] PersistenceError)
}

impl StoreError {
  pub fn validation(
    msg: impl Into<String>
  ) -> Self {
    Self::Validation(msg.into())
  }

  pub fn not_found(
    msg: impl Into<String>
  ) -> Self {
    Self::NotFound(msg.into())
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Validation(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound(_))
  }

  pub fn is_persistence(&self) -> bool {
    matches!(self, Self::Persistence(_))
  }
}

pub type StoreResult<T> =
  Result<T, StoreError>;
