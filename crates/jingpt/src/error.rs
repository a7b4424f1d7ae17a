use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The model could not be reached or rejected the request.
    #[error("LLM request failed: {0}")]
    Client(#[source] anyhow::Error),
}

impl CoreError {
    /// Returns `true` if the provider rejected our credentials.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        match self {
            Self::Client(e) => e
                .downcast_ref::<jingpt_client::ClientError>()
                .is_some_and(jingpt_client::ClientError::is_authentication_error),
        }
    }
}
