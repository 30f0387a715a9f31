//! Type-state markers for the builder pattern
//!
//! These types are used to track which fields have been set
//! in the builder at compile-time, preventing invalid configurations.

use std::marker::PhantomData;

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Marker trait for credentials state
pub trait CredentialsState {}

/// Credentials have not been set
pub struct NoCredentials;
impl CredentialsState for NoCredentials {}

/// Credentials have been set
pub struct HasCredentials;
impl CredentialsState for HasCredentials {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<U, C> {
    _url: PhantomData<U>,
    _credentials: PhantomData<C>,
}

impl<U, C> TypeState<U, C> {
    pub(crate) fn new() -> Self {
        Self {
            _url: PhantomData,
            _credentials: PhantomData,
        }
    }
}

impl<U, C> Default for TypeState<U, C> {
    fn default() -> Self {
        Self::new()
    }
}
