//! Media-engine capability interface.
//!
//! The relay that owns producers, consumers and transports is an external
//! collaborator; the recorder only consumes this narrow surface. Traits use
//! boxed futures so implementations (and test fakes) stay object-safe.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use crate::Result;

/// Boxed future alias used by the capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Entry point into the external media engine.
pub trait MediaEngine: Send + Sync {
    /// Create a plain (non-encrypted, non-comedia) RTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Media`](crate::AppError::Media) if the engine
    /// rejects the request.
    fn create_plain_transport(&self) -> BoxFuture<'_, Result<Box<dyn PlainTransport>>>;
}

/// A plain RTP network transport owned exclusively by one recording session.
pub trait PlainTransport: Send + Sync {
    /// Point the transport at the pipeline's RTP and RTCP listen ports.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Media`](crate::AppError::Media) if the connect fails.
    fn connect(&self, ip: IpAddr, port: u16, rtcp_port: u16) -> BoxFuture<'_, Result<()>>;

    /// Start consuming the given producer over this transport.
    ///
    /// Consumers are created paused so no media is dropped before the sink
    /// is ready.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Media`](crate::AppError::Media) if the consume fails.
    fn consume(&self, producer_id: &str, paused: bool)
        -> BoxFuture<'_, Result<Box<dyn MediaConsumer>>>;

    /// Close the transport and free its engine-side resources.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// An engine-side consumer feeding one media branch of the recording.
pub trait MediaConsumer: Send + Sync {
    /// Resume a paused consumer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Media`](crate::AppError::Media) if the resume fails.
    fn resume(&self) -> BoxFuture<'_, Result<()>>;

    /// Close the consumer and free its engine-side resources.
    fn close(&self) -> BoxFuture<'_, ()>;
}
