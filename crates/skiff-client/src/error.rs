//! Client error types.

use arrow_flight::error::FlightError;
use arrow_schema::ArrowError;
use thiserror::Error;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level connection failure.
    #[error("failed to connect to document store: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// gRPC status returned by the service.
    #[error("flight service error: {0}")]
    Service(#[from] Box<tonic::Status>),

    /// Arrow Flight protocol failure.
    #[error("flight protocol error: {0}")]
    Flight(#[from] Box<FlightError>),

    /// Arrow-level failure while encoding or decoding payloads.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// A query result failed to decode into the target shape.
    #[error(transparent)]
    Decode(#[from] skiff_core::DecodeError),

    /// The store rejected one or more uploaded documents.
    #[error("upload rejected: {0}")]
    Upload(String),

    /// A malformed upload acknowledgement payload.
    #[error("invalid upload acknowledgement: {0}")]
    Ack(#[from] serde_json::Error),

    /// A schema could not be derived for the target shape.
    #[error(transparent)]
    Schema(#[from] crate::schema::SchemaError),

    /// The result stream ended before the first record batch.
    #[error("query returned no record batches")]
    NoData,
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        ClientError::Service(Box::new(status))
    }
}

impl From<FlightError> for ClientError {
    fn from(err: FlightError) -> Self {
        ClientError::Flight(Box::new(err))
    }
}
