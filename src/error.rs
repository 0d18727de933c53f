//! Error taxonomy shared by every fallible operation.
//!
//! The set is closed: backends map host-specific failures onto these
//! variants and never surface anything else. Success is `Result::Ok`, so
//! there is no `Ok` variant here.

/// Errors returned by backend, engine and flux operations.
///
/// [`Error::Negotiate`] is not a failure in the usual sense: it signals
/// that the backend rewrote the passed [`FluxConfig`](crate::FluxConfig)
/// to its closest supported neighbor. Inspect the config and retry.
///
/// The `Display` strings below are stable and may be shown to users or
/// matched in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Unspecified failure in the backend or host API.
    #[error("generic error")]
    Generic,

    /// A required object does not exist (unknown backend, missing device).
    #[error("object does not exist")]
    Null,

    /// Operation invalid in the current state (e.g. start while started,
    /// deinit without init).
    #[error("invalid state for operation")]
    Init,

    /// The object is in use and cannot be torn down (e.g. engine stop with
    /// running fluxes).
    #[error("object is busy")]
    Busy,

    /// The backend's runtime library could not be loaded.
    #[error("backend library unavailable")]
    Library,

    /// A required symbol is missing from the backend's runtime library.
    #[error("backend symbol missing")]
    Symbol,

    /// The host audio server is unreachable.
    #[error("unable to connect to host audio server")]
    Connect,

    /// The host denied access (device or session policy).
    #[error("permission denied by host")]
    Permission,

    /// The passed configuration was rewritten to a supported neighbor;
    /// inspect it and retry.
    #[error("configuration rewritten during negotiation")]
    Negotiate,
}
