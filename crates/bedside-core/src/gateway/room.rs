//! Media room reservations.
//!
//! One room is provisioned per session at creation and released exactly once
//! at completion, cancellation, fatal error, or eviction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bedside_types::gateway::{GatewayError, RoomRequest, RoomReservation};

pub trait RoomService: Send + Sync {
    fn name(&self) -> &str;

    fn provision(
        &self,
        request: &RoomRequest,
    ) -> impl Future<Output = Result<RoomReservation, GatewayError>> + Send;

    fn release(&self, room_name: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

pub trait RoomServiceDyn: Send + Sync {
    fn name(&self) -> &str;

    fn provision_boxed<'a>(
        &'a self,
        request: &'a RoomRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RoomReservation, GatewayError>> + Send + 'a>>;

    fn release_boxed<'a>(
        &'a self,
        room_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>>;
}

impl<T: RoomService> RoomServiceDyn for T {
    fn name(&self) -> &str {
        RoomService::name(self)
    }

    fn provision_boxed<'a>(
        &'a self,
        request: &'a RoomRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RoomReservation, GatewayError>> + Send + 'a>> {
        Box::pin(self.provision(request))
    }

    fn release_boxed<'a>(
        &'a self,
        room_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>> {
        Box::pin(self.release(room_name))
    }
}

#[derive(Clone)]
pub struct BoxRoomService {
    inner: Arc<dyn RoomServiceDyn>,
}

impl BoxRoomService {
    pub fn new<T: RoomService + 'static>(service: T) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn provision(&self, request: &RoomRequest) -> Result<RoomReservation, GatewayError> {
        self.inner.provision_boxed(request).await
    }

    pub async fn release(&self, room_name: &str) -> Result<(), GatewayError> {
        self.inner.release_boxed(room_name).await
    }
}

impl std::fmt::Debug for BoxRoomService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRoomService")
            .field("name", &self.name())
            .finish()
    }
}
