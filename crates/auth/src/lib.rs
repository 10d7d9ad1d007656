//! Authentication session layer for Scalar-Web devices.
//!
//! Devices hand out a session cookie named `auth` from the `accessControl`
//! service's `actRegister` call. This crate keeps the latest cookie per host
//! in a shared [`CredentialCache`], renews it through a [`Registrar`] when it
//! is missing or expired, and attaches it to every outgoing call via an
//! [`AuthInterceptor`]. Renewal failures never fail the caller's request; the
//! device's own response is the visible signal of an auth problem.

pub mod cache;
pub mod client;
pub mod cookie;
pub mod error;
pub mod interceptor;
pub mod registration;
pub mod service;
pub mod token;

pub use {
    cache::CredentialCache,
    client::{AuthClient, AuthClientFactory},
    error::{Error, RegistrationError, Result},
    interceptor::{AuthInterceptor, SessionState},
    registration::{ActRegisterClient, Registrar, act_register_payload},
    service::{AutoAuthPolicy, ScalarWebService, service_url},
    token::{AuthToken, HostKey},
};
